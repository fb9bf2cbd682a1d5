use std::{fs::Metadata, os::unix::fs::MetadataExt, path::Path};

use crate::{Interface, Result};

/// One unit of transfer: a byte offset and the buffer to fill (read) or drain (write).
///
/// The length of the request is the length of `data`. Writers may transform `data`
/// in place, so its contents are unspecified once a write returns.
#[derive(Debug)]
pub struct IoRequest<'a> {
	pub offset: u64,
	pub data: &'a mut [u8],
}

impl<'a> IoRequest<'a> {
	pub fn new(offset: u64, data: &'a mut [u8]) -> Self {
		Self { offset, data }
	}

	#[must_use]
	pub const fn len(&self) -> usize {
		self.data.len()
	}

	#[must_use]
	pub const fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

/// `open(2)` flags, as handed down by the file surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(i32);

impl OpenFlags {
	pub const READ_ONLY: Self = Self(libc::O_RDONLY);
	pub const READ_WRITE: Self = Self(libc::O_RDWR);
	pub const CREATE: Self = Self(libc::O_RDWR | libc::O_CREAT);

	#[must_use]
	pub const fn from_bits(bits: i32) -> Self {
		Self(bits)
	}

	#[must_use]
	pub const fn bits(self) -> i32 {
		self.0
	}

	/// The same flags with the access mode widened to read-write.
	#[must_use]
	pub const fn with_read_write(self) -> Self {
		Self((self.0 & !libc::O_ACCMODE) | libc::O_RDWR)
	}

	#[must_use]
	pub const fn is_writable(self) -> bool {
		let mode = self.0 & libc::O_ACCMODE;
		mode == libc::O_WRONLY || mode == libc::O_RDWR
	}

	#[must_use]
	pub const fn creates(self) -> bool {
		self.0 & libc::O_CREAT != 0
	}
}

impl Default for OpenFlags {
	fn default() -> Self {
		Self::READ_ONLY
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
	Regular,
	Directory,
	Symlink,
	Other,
}

/// The subset of `stat(2)` the file layers care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
	pub kind: FileKind,
	pub size: u64,
	pub ino: u64,
	pub mode: u32,
}

impl From<&Metadata> for FileAttr {
	fn from(metadata: &Metadata) -> Self {
		let file_type = metadata.file_type();
		let kind = if file_type.is_file() {
			FileKind::Regular
		} else if file_type.is_dir() {
			FileKind::Directory
		} else if file_type.is_symlink() {
			FileKind::Symlink
		} else {
			FileKind::Other
		};

		Self {
			kind,
			size: metadata.len(),
			ino: metadata.ino(),
			mode: metadata.mode(),
		}
	}
}

/// A single open file, at any layer of the stack.
///
/// Implementations are stacked: an upper layer owns the layer below and forwards
/// to it after transforming offsets, sizes and data.
pub trait FileIo {
	/// Identifies the on-disk format this layer produces.
	fn interface(&self) -> Interface;

	fn open(&mut self, flags: OpenFlags) -> Result<()>;

	fn set_file_name(&mut self, name: &Path);

	fn file_name(&self) -> &Path;

	/// Hands down the IV a higher layer derived for this file (e.g. from its path).
	fn set_iv(&mut self, iv: u64) -> Result<()>;

	fn get_attr(&self) -> Result<FileAttr>;

	/// Size of the file as seen by the layer above.
	///
	/// Unlike [`FileIo::get_attr`] this does not check the file kind; only call it on
	/// regular files.
	fn size(&self) -> Result<u64>;

	/// Reads up to `req.len()` bytes at `req.offset`, returning how many were read.
	/// A short count means end of file.
	fn read(&mut self, req: IoRequest<'_>) -> Result<usize>;

	fn write(&mut self, req: IoRequest<'_>) -> Result<usize>;

	fn truncate(&mut self, size: u64) -> Result<()>;

	fn is_writable(&self) -> bool;
}
