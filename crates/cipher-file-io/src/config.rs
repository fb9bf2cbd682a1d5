use std::sync::Arc;

use tracing::debug;
use vfs_cipher::{Cipher, CipherKey};
use vfs_file_io::{Error, Interface, Result};

pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// How the final block of a file is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
	/// Tail blocks are stream-encoded at their exact length.
	None,
	/// Every block carries a `0x80` marker and is CBC-encoded; the file ends with up to one
	/// cipher block of zeros.
	Normal,
	/// Padding on a reverse mount. Sizes are reported, block I/O is not supported.
	Reverse,
}

impl Padding {
	/// Padding is only understood from revision 1 of version 3 of the cipher interface onwards.
	#[must_use]
	pub const fn for_interface(iface: &Interface, reverse: bool) -> Self {
		let padded = (iface.current == 3 && iface.revision >= 1) || iface.current > 3;
		match (padded, reverse) {
			(false, _) => Self::None,
			(true, false) => Self::Normal,
			(true, true) => Self::Reverse,
		}
	}

	#[must_use]
	pub const fn is_active(self) -> bool {
		!matches!(self, Self::None)
	}
}

/// The plain, serializable part of a volume configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FsOptions {
	/// Bytes per encrypted block on disk.
	pub block_size: usize,
	/// Store a random per-file IV in an 8 byte header.
	pub unique_iv: bool,
	/// The backing files hold plaintext and the presented view is ciphertext.
	pub reverse_encryption: bool,
	/// Leave all-zero blocks untransformed so sparse files stay sparse.
	pub allow_holes: bool,
	/// The cipher interface the volume was written with. `None` means the cipher's own.
	pub cipher_iface: Option<Interface>,
}

impl Default for FsOptions {
	fn default() -> Self {
		Self {
			block_size: DEFAULT_BLOCK_SIZE,
			unique_iv: true,
			reverse_encryption: false,
			allow_holes: true,
			cipher_iface: None,
		}
	}
}

/// Volume-wide configuration shared by every open file. Immutable once built.
#[derive(Debug)]
pub struct FsConfig {
	options: FsOptions,
	cipher_iface: Interface,
	padding: Padding,
	cipher: Arc<dyn Cipher>,
	key: Arc<CipherKey>,
}

impl FsConfig {
	pub fn new(
		options: FsOptions,
		cipher: Arc<dyn Cipher>,
		key: Arc<CipherKey>,
	) -> Result<Arc<Self>> {
		let cipher_block_size = cipher.cipher_block_size();
		if cipher_block_size == 0
			|| options.block_size <= cipher_block_size
			|| options.block_size % cipher_block_size != 0
		{
			debug!(
				"Rejecting block size <block_size={}, cipher_block_size={cipher_block_size}>",
				options.block_size
			);
			return Err(Error::Invariant(
				"block size must be a larger multiple of the cipher block size",
			));
		}

		let cipher_iface = match &options.cipher_iface {
			Some(iface) if !cipher.interface().implements(iface) => {
				debug!(
					"Cipher does not implement the volume interface <volume={iface}, cipher={}>",
					cipher.interface()
				);
				return Err(Error::Unsupported("cipher interface"));
			}
			Some(iface) => iface.clone(),
			None => cipher.interface(),
		};

		let padding = Padding::for_interface(&cipher_iface, options.reverse_encryption);

		Ok(Arc::new(Self {
			options,
			cipher_iface,
			padding,
			cipher,
			key,
		}))
	}

	#[must_use]
	pub const fn options(&self) -> &FsOptions {
		&self.options
	}

	#[must_use]
	pub const fn block_size(&self) -> usize {
		self.options.block_size
	}

	#[must_use]
	pub const fn unique_iv(&self) -> bool {
		self.options.unique_iv
	}

	#[must_use]
	pub const fn reverse_encryption(&self) -> bool {
		self.options.reverse_encryption
	}

	#[must_use]
	pub const fn allow_holes(&self) -> bool {
		self.options.allow_holes
	}

	#[must_use]
	pub const fn cipher_iface(&self) -> &Interface {
		&self.cipher_iface
	}

	#[must_use]
	pub const fn padding(&self) -> Padding {
		self.padding
	}

	#[must_use]
	pub fn cipher(&self) -> &dyn Cipher {
		self.cipher.as_ref()
	}

	#[must_use]
	pub fn cipher_block_size(&self) -> usize {
		self.cipher.cipher_block_size()
	}

	#[must_use]
	pub fn key(&self) -> &CipherKey {
		&self.key
	}
}
