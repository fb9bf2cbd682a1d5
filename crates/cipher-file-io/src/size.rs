//! Mapping between the size of a backing file and the size of the file presented above it.

use vfs_file_io::{Error, Result};

use crate::{header::HEADER_SIZE, FsConfig, Padding};

/// The overheads a volume adds on top of plaintext: an optional per-file header and, with
/// padding, one marker byte per block plus up to one cipher block at the end.
///
/// `block_size` is the on-disk block size; with padding a block holds one byte less of
/// plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeMapping {
	pub header: bool,
	pub padding: bool,
	pub reverse: bool,
	pub block_size: u64,
	pub cipher_block_size: u64,
}

impl SizeMapping {
	#[must_use]
	pub fn new(config: &FsConfig) -> Self {
		Self {
			header: config.unique_iv(),
			padding: config.padding() != Padding::None,
			reverse: config.reverse_encryption(),
			block_size: config.block_size() as u64,
			cipher_block_size: config.cipher_block_size() as u64,
		}
	}

	/// Size of the presented file given the size of the backing file.
	pub fn presented_size(&self, backing: u64) -> Result<u64> {
		if self.reverse {
			Ok(self.to_ciphertext(backing))
		} else {
			self.to_plaintext(backing)
		}
	}

	/// Plaintext size of a ciphertext of `size` bytes.
	///
	/// Fails when `size` is too short to hold the header or the final padding.
	pub fn to_plaintext(&self, mut size: u64) -> Result<u64> {
		if self.header && size > 0 {
			if size < HEADER_SIZE {
				return Err(Error::Invariant("ciphertext shorter than the file header"));
			}
			size -= HEADER_SIZE;
		}

		if self.padding && size > 0 {
			if size < self.cipher_block_size {
				return Err(Error::Invariant("ciphertext shorter than its padding"));
			}
			size -= self.cipher_block_size;
			size -= size / self.block_size;
		}

		Ok(size)
	}

	/// Ciphertext size of a plaintext of `size` bytes. An empty file stays empty.
	#[must_use]
	pub const fn to_ciphertext(&self, size: u64) -> u64 {
		if size == 0 {
			return 0;
		}

		let size = self.padded_len(size);
		if self.header {
			size + HEADER_SIZE
		} else {
			size
		}
	}

	/// Length of the block stream holding `size` plaintext bytes, without the header.
	#[must_use]
	pub const fn padded_len(&self, size: u64) -> u64 {
		if self.padding && size > 0 {
			size + (size - 1) / (self.block_size - 1) + self.cipher_block_size
		} else {
			size
		}
	}
}
