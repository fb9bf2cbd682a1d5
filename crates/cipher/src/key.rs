use std::fmt::{self, Debug};

use rand::{RngCore, SeedableRng};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The length of the volume master key, and of each key derived from it.
pub const KEY_LEN: usize = 32;

const ENCRYPTION_CONTEXT: &str = "vfs-cipher 2024-05-01 data encryption key";
const IV_CONTEXT: &str = "vfs-cipher 2024-05-01 IV derivation key";

/// Opaque key material for one mounted volume.
///
/// Holds a data-encryption key and a separate key used to turn 64-bit IV seeds into
/// full cipher IVs, both derived from the master key with BLAKE3-KDF. The bytes are
/// erased on drop and hidden from `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
	encryption: [u8; KEY_LEN],
	iv: [u8; KEY_LEN],
}

impl CipherKey {
	#[must_use]
	pub fn new(master_key: &[u8; KEY_LEN]) -> Self {
		Self {
			encryption: blake3::derive_key(ENCRYPTION_CONTEXT, master_key),
			iv: blake3::derive_key(IV_CONTEXT, master_key),
		}
	}

	/// This function uses `ChaCha20Rng` for cryptographically-securely generating the master key
	#[must_use]
	pub fn generate() -> Self {
		let mut master_key = [0u8; KEY_LEN];
		rand_chacha::ChaCha20Rng::from_entropy().fill_bytes(&mut master_key);
		let key = Self::new(&master_key);
		master_key.zeroize();
		key
	}

	pub(crate) const fn encryption_key(&self) -> &[u8; KEY_LEN] {
		&self.encryption
	}

	pub(crate) const fn iv_key(&self) -> &[u8; KEY_LEN] {
		&self.iv
	}
}

impl Debug for CipherKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}
