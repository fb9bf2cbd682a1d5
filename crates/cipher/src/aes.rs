use aes::{
	cipher::{
		generic_array::GenericArray, AsyncStreamCipher, BlockDecryptMut, BlockEncryptMut,
		KeyIvInit,
	},
	Aes256,
};
use hmac::{Hmac, Mac};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha1::Sha1;
use vfs_file_io::Interface;

use crate::{Cipher, CipherKey, Error, Result};

pub const AES_BLOCK_LEN: usize = 16;

const FLIP_CHUNK: usize = 64;

type HmacSha1 = Hmac<Sha1>;

/// AES-256, CBC for whole blocks and a two-pass CFB construction for streams.
///
/// The stream construction diffuses every input byte over the rest of the buffer with a
/// running XOR, then reverses the buffer in 64 byte chunks between the two passes, so a
/// change anywhere in a short tail block affects the whole ciphertext.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesCipher;

impl AesCipher {
	#[must_use]
	pub const fn new() -> Self {
		Self
	}

	fn iv(seed: u64, key: &CipherKey) -> Result<[u8; AES_BLOCK_LEN]> {
		let mut mac =
			<HmacSha1 as Mac>::new_from_slice(key.iv_key()).map_err(|_| Error::InvalidKey)?;
		mac.update(&seed.to_le_bytes());
		let digest = mac.finalize().into_bytes();

		let mut iv = [0u8; AES_BLOCK_LEN];
		iv.copy_from_slice(&digest[..AES_BLOCK_LEN]);
		Ok(iv)
	}

	fn cfb_encrypt(buf: &mut [u8], seed: u64, key: &CipherKey) -> Result<()> {
		let iv = Self::iv(seed, key)?;
		cfb_mode::Encryptor::<Aes256>::new_from_slices(key.encryption_key(), &iv)
			.map_err(|_| Error::InvalidKey)?
			.encrypt(buf);
		Ok(())
	}

	fn cfb_decrypt(buf: &mut [u8], seed: u64, key: &CipherKey) -> Result<()> {
		let iv = Self::iv(seed, key)?;
		cfb_mode::Decryptor::<Aes256>::new_from_slices(key.encryption_key(), &iv)
			.map_err(|_| Error::InvalidKey)?
			.decrypt(buf);
		Ok(())
	}
}

fn shuffle(buf: &mut [u8]) {
	for i in 1..buf.len() {
		buf[i] ^= buf[i - 1];
	}
}

fn unshuffle(buf: &mut [u8]) {
	for i in (1..buf.len()).rev() {
		buf[i] ^= buf[i - 1];
	}
}

fn flip(buf: &mut [u8]) {
	for chunk in buf.chunks_mut(FLIP_CHUNK) {
		chunk.reverse();
	}
}

fn check_len(buf: &[u8]) -> Result<()> {
	if buf.len() % AES_BLOCK_LEN == 0 {
		Ok(())
	} else {
		Err(Error::LengthMismatch)
	}
}

impl Cipher for AesCipher {
	fn interface(&self) -> Interface {
		Interface::new("ssl/aes", 3, 1, 2)
	}

	fn cipher_block_size(&self) -> usize {
		AES_BLOCK_LEN
	}

	fn block_encode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> Result<()> {
		check_len(buf)?;
		let iv = Self::iv(iv, key)?;
		let mut encryptor = cbc::Encryptor::<Aes256>::new_from_slices(key.encryption_key(), &iv)
			.map_err(|_| Error::InvalidKey)?;

		for block in buf.chunks_exact_mut(AES_BLOCK_LEN) {
			encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
		}
		Ok(())
	}

	fn block_decode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> Result<()> {
		check_len(buf)?;
		let iv = Self::iv(iv, key)?;
		let mut decryptor = cbc::Decryptor::<Aes256>::new_from_slices(key.encryption_key(), &iv)
			.map_err(|_| Error::InvalidKey)?;

		for block in buf.chunks_exact_mut(AES_BLOCK_LEN) {
			decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
		}
		Ok(())
	}

	fn stream_encode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> Result<()> {
		shuffle(buf);
		Self::cfb_encrypt(buf, iv, key)?;
		flip(buf);
		shuffle(buf);
		Self::cfb_encrypt(buf, iv.wrapping_add(1), key)
	}

	fn stream_decode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> Result<()> {
		Self::cfb_decrypt(buf, iv.wrapping_add(1), key)?;
		unshuffle(buf);
		flip(buf);
		Self::cfb_decrypt(buf, iv, key)?;
		unshuffle(buf);
		Ok(())
	}

	fn randomize(&self, buf: &mut [u8], strong: bool) -> Result<()> {
		if strong {
			ChaCha20Rng::from_entropy()
				.try_fill_bytes(buf)
				.map_err(|_| Error::Random)
		} else {
			rand::thread_rng()
				.try_fill_bytes(buf)
				.map_err(|_| Error::Random)
		}
	}
}
