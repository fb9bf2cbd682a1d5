#![allow(dead_code, clippy::unwrap_used)]

use std::{
	io,
	path::Path,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use rand::RngCore;
use vfs_cipher::{AesCipher, CipherKey, KEY_LEN};
use vfs_cipher_file_io::{CipherFileIo, FsConfig, FsOptions};
use vfs_file_io::{
	Error, FileAttr, FileIo, Interface, IoRequest, OpenFlags, RawFileIo, Result,
};

pub const MASTER_KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];

/// The cipher interface of volumes written before padding existed.
pub fn unpadded_iface() -> Interface {
	Interface::new("ssl/aes", 3, 0, 2)
}

pub fn config(options: FsOptions) -> Arc<FsConfig> {
	FsConfig::new(
		options,
		Arc::new(AesCipher::new()),
		Arc::new(CipherKey::new(&MASTER_KEY)),
	)
	.unwrap()
}

/// Padded volume with small blocks, so that a few hundred bytes span several of them.
pub fn small_blocks() -> FsOptions {
	FsOptions {
		block_size: 64,
		..Default::default()
	}
}

pub fn open(
	path: &Path,
	config: &Arc<FsConfig>,
	flags: OpenFlags,
	iv: u64,
) -> CipherFileIo<RawFileIo> {
	let mut io = CipherFileIo::new(RawFileIo::new(path), Arc::clone(config));
	io.open(flags).unwrap();
	io.set_iv(iv).unwrap();
	io
}

pub fn write_all(io: &mut impl FileIo, offset: u64, data: &[u8]) {
	let mut buf = data.to_vec();
	assert_eq!(io.write(IoRequest::new(offset, &mut buf)).unwrap(), data.len());
}

pub fn read_at(io: &mut impl FileIo, offset: u64, len: usize) -> Vec<u8> {
	let mut buf = vec![0u8; len];
	let read = io.read(IoRequest::new(offset, &mut buf)).unwrap();
	buf.truncate(read);
	buf
}

pub fn read_to_end(io: &mut impl FileIo) -> Vec<u8> {
	let size = usize::try_from(io.size().unwrap()).unwrap();
	// ask for more than there is, to check the read stops at the end
	read_at(io, 0, size + 100)
}

pub fn random_bytes(len: usize) -> Vec<u8> {
	let mut buf = vec![0u8; len];
	rand::thread_rng().fill_bytes(&mut buf);
	buf
}

/// Raw storage whose writes start failing once `fail_writes` is set.
#[derive(Debug)]
pub struct FailingWrites {
	inner: RawFileIo,
	fail_writes: Arc<AtomicBool>,
}

impl FailingWrites {
	pub fn new(path: &Path) -> (Self, Arc<AtomicBool>) {
		let fail_writes = Arc::new(AtomicBool::new(false));
		let io = Self {
			inner: RawFileIo::new(path),
			fail_writes: Arc::clone(&fail_writes),
		};
		(io, fail_writes)
	}
}

impl FileIo for FailingWrites {
	fn interface(&self) -> Interface {
		self.inner.interface()
	}

	fn open(&mut self, flags: OpenFlags) -> Result<()> {
		self.inner.open(flags)
	}

	fn set_file_name(&mut self, name: &Path) {
		self.inner.set_file_name(name);
	}

	fn file_name(&self) -> &Path {
		self.inner.file_name()
	}

	fn set_iv(&mut self, iv: u64) -> Result<()> {
		self.inner.set_iv(iv)
	}

	fn get_attr(&self) -> Result<FileAttr> {
		self.inner.get_attr()
	}

	fn size(&self) -> Result<u64> {
		self.inner.size()
	}

	fn read(&mut self, req: IoRequest<'_>) -> Result<usize> {
		self.inner.read(req)
	}

	fn write(&mut self, req: IoRequest<'_>) -> Result<usize> {
		if self.fail_writes.load(Ordering::SeqCst) {
			return Err(Error::Io(io::Error::other("no space left")));
		}
		self.inner.write(req)
	}

	fn truncate(&mut self, size: u64) -> Result<()> {
		self.inner.truncate(size)
	}

	fn is_writable(&self) -> bool {
		self.inner.is_writable()
	}
}
