use std::io;

use thiserror::Error;

/// Every failure a file layer can report to the one above it.
///
/// All of them are returned to the immediate caller; no layer retries internally.
#[derive(Error, Debug)]
pub enum Error {
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
	/// The data failed to decode, or its padding did not have the expected shape.
	#[error("bad message: data could not be decoded")]
	BadMessage,
	#[error("operation not permitted: {0}")]
	Permission(&'static str),
	#[error("operation not supported: {0}")]
	Unsupported(&'static str),
	#[error("internal invariant violated: {0}")]
	Invariant(&'static str),
	#[error("the backing file is not open")]
	NotOpen,
}

impl Error {
	/// The negative `errno` value a FUSE-style surface should answer with.
	#[must_use]
	pub fn errno(&self) -> i32 {
		match self {
			Self::Io(e) => -e.raw_os_error().unwrap_or(libc::EIO),
			Self::BadMessage => -libc::EBADMSG,
			Self::Permission(_) => -libc::EPERM,
			Self::Unsupported(_) => -libc::ENOTSUP,
			Self::Invariant(_) => -libc::EINVAL,
			Self::NotOpen => -libc::EBADF,
		}
	}

	#[must_use]
	pub fn is_directory(&self) -> bool {
		matches!(self, Self::Io(e) if e.raw_os_error() == Some(libc::EISDIR))
	}
}

pub type Result<T> = std::result::Result<T, Error>;
