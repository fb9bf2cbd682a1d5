//! The one-and-zeroes block padding.
//!
//! A block of `d` plaintext bytes is followed by a `0x80` marker and zeros up to `d` plus one
//! cipher block. The leading whole cipher blocks of that are encrypted; the zeros beyond them
//! are stored as they are and only matter at the end of a file, where they let the plaintext
//! size be computed from the ciphertext size alone.

use tracing::trace;
use vfs_file_io::{Error, Result};

pub const MARKER: u8 = 0x80;

/// Pads the first `data_len` bytes of `buf` in place and returns how many leading bytes
/// must be encrypted.
///
/// `buf` must be exactly `data_len + cipher_block_size` bytes long.
pub fn pad(buf: &mut [u8], data_len: usize, cipher_block_size: usize) -> Result<usize> {
	if cipher_block_size == 0 || buf.len() != data_len + cipher_block_size {
		return Err(Error::Invariant("padding buffer has the wrong length"));
	}

	buf[data_len] = MARKER;
	buf[data_len + 1..].fill(0);

	Ok(buf.len() - buf.len() % cipher_block_size)
}

/// Returns the plaintext length of a decrypted, padded block.
///
/// An all-zero buffer one byte longer than `block_size` is a hole and stands for
/// `block_size` zeros when holes are allowed. Anything else must hold at least one data
/// byte followed by the marker and zeros.
pub fn unpad(buf: &[u8], block_size: usize, allow_holes: bool) -> Result<usize> {
	let zeros = buf.iter().rev().take_while(|b| **b == 0).count();

	if allow_holes && zeros == buf.len() && buf.len() == block_size + 1 {
		return Ok(block_size);
	}

	let end = buf.len() - zeros;
	if end > 1 && buf[end - 1] == MARKER {
		Ok(end - 1)
	} else {
		trace!(
			"Invalid padding <len={}, trailing_zeros={zeros}>",
			buf.len()
		);
		Err(Error::BadMessage)
	}
}
