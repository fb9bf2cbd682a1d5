//! Keyed cipher primitives for per-block file encryption.
//!
//! A [`Cipher`] transforms buffers in place. Block operations need a buffer that is a
//! multiple of [`Cipher::cipher_block_size`]; stream operations accept any length. Every
//! operation is seeded with a 64-bit IV which the cipher expands into a full IV with the
//! key, so callers only ever deal in `u64`s.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	clippy::expect_used,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::dbg_macro
)]
#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

use std::fmt::Debug;

use vfs_file_io::Interface;

mod aes;
pub mod error;
mod key;

pub use self::aes::{AesCipher, AES_BLOCK_LEN};
pub use self::error::{Error, Result};
pub use self::key::{CipherKey, KEY_LEN};

/// A keyed cipher, shared by every open file of a volume.
pub trait Cipher: Debug + Send + Sync {
	fn interface(&self) -> Interface;

	/// The block size of the underlying block cipher, in bytes.
	fn cipher_block_size(&self) -> usize;

	fn block_encode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> Result<()>;

	fn block_decode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> Result<()>;

	fn stream_encode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> Result<()>;

	fn stream_decode(&self, buf: &mut [u8], iv: u64, key: &CipherKey) -> Result<()>;

	/// Fills `buf` with random bytes. `strong` asks for a cryptographically secure source.
	fn randomize(&self, buf: &mut [u8], strong: bool) -> Result<()>;
}
