use std::{num::NonZeroU64, path::Path, sync::Arc};

use tracing::{debug, error, trace, warn};
use vfs_file_io::{
	block, BlockIo, Error, FileAttr, FileIo, FileKind, Interface, IoRequest, OpenFlags, Result,
};

use crate::{
	header::{self, HEADER_LEN, HEADER_SIZE},
	padding, FsConfig, Padding, SizeMapping,
};

/// Encrypts the blocks of one open file on their way to the layer below.
///
/// In normal mode the backing file holds ciphertext and this layer presents plaintext; in
/// reverse mode it is the other way around. Each block is encrypted with the IV
/// `block_number ^ file_iv`, where `file_iv` is a random per-file value kept in an 8 byte
/// header (when unique IVs are enabled), itself encrypted with the IV handed down by the
/// layer above through [`FileIo::set_iv`].
#[derive(Debug)]
pub struct CipherFileIo<F> {
	base: F,
	config: Arc<FsConfig>,
	mapping: SizeMapping,
	have_header: bool,
	padding: Padding,
	block_size: usize,
	external_iv: Option<NonZeroU64>,
	file_iv: Option<NonZeroU64>,
	last_flags: OpenFlags,
}

impl<F: FileIo> CipherFileIo<F> {
	pub fn new(base: F, config: Arc<FsConfig>) -> Self {
		let padding = config.padding();
		let block_size = if padding == Padding::Normal {
			config.block_size() - 1
		} else {
			config.block_size()
		};

		Self {
			base,
			mapping: SizeMapping::new(&config),
			have_header: config.unique_iv(),
			padding,
			block_size,
			external_iv: None,
			file_iv: None,
			last_flags: OpenFlags::default(),
			config,
		}
	}

	/// The per-file IV, once it has been read, generated or derived.
	#[must_use]
	pub fn file_iv(&self) -> Option<u64> {
		self.file_iv.map(NonZeroU64::get)
	}

	#[must_use]
	pub fn external_iv(&self) -> Option<u64> {
		self.external_iv.map(NonZeroU64::get)
	}

	#[must_use]
	pub const fn base(&self) -> &F {
		&self.base
	}

	pub fn into_inner(self) -> F {
		self.base
	}

	fn external_seed(&self) -> u64 {
		self.external_iv.map_or(0, NonZeroU64::get)
	}

	fn header_len(&self) -> u64 {
		if self.have_header && !self.config.reverse_encryption() {
			HEADER_SIZE
		} else {
			0
		}
	}

	fn block_iv(&self, block_num: u64) -> u64 {
		block_num ^ self.file_iv.map_or(0, NonZeroU64::get)
	}

	/// Loads the file IV from the header, or creates a new one if the file has no header yet.
	///
	/// A new IV is only persisted when the backing file is writable.
	fn init_header(&mut self) -> Result<()> {
		let cipher = self.config.cipher();
		let key = self.config.key();
		let raw_size = self.base.size()?;
		let mut buf = [0u8; HEADER_LEN];

		let file_iv = if raw_size >= HEADER_SIZE {
			debug!("Reading existing header <raw_size={raw_size}>");

			let read = self.base.read(IoRequest::new(0, &mut buf))?;
			if read != HEADER_LEN {
				debug_assert!(false, "short header read");
				return Err(Error::Invariant("short file header"));
			}

			cipher
				.stream_decode(&mut buf, self.external_seed(), key)
				.map_err(|e| {
					debug!("Failed to decode file header: {e}");
					Error::BadMessage
				})?;

			let Some(file_iv) = NonZeroU64::new(u64::from_be_bytes(buf)) else {
				debug_assert!(false, "file IV decoded to zero");
				return Err(Error::Invariant("file IV decoded to zero"));
			};
			file_iv
		} else {
			debug!("Creating new file IV header");

			let file_iv = loop {
				cipher.randomize(&mut buf, false).map_err(|e| {
					error!("Unable to generate a random file IV: {e}");
					Error::BadMessage
				})?;

				if let Some(file_iv) = NonZeroU64::new(u64::from_be_bytes(buf)) {
					break file_iv;
				}
				warn!("Random source returned 8 zero bytes");
			};

			if self.base.is_writable() {
				cipher
					.stream_encode(&mut buf, self.external_seed(), key)
					.map_err(|e| {
						debug!("Failed to encode file header: {e}");
						Error::BadMessage
					})?;
				self.base.write(IoRequest::new(0, &mut buf))?;
			} else {
				debug!("Backing file is not writable, file IV not persisted");
			}

			file_iv
		};

		trace!("File header ready <file_iv={file_iv}>");
		self.file_iv = Some(file_iv);

		Ok(())
	}

	/// Persists the current file IV under the current external IV.
	fn write_header(&mut self) -> Result<()> {
		let Some(file_iv) = self.file_iv else {
			error!("No file IV to write to the header");
			return Err(Error::Invariant("file IV missing when writing the header"));
		};

		debug!("Writing file header <file_iv={file_iv}>");

		let mut buf = file_iv.get().to_be_bytes();
		self.config
			.cipher()
			.stream_encode(&mut buf, self.external_seed(), self.config.key())
			.map_err(|e| {
				debug!("Failed to encode file header: {e}");
				Error::BadMessage
			})?;

		self.base.write(IoRequest::new(0, &mut buf))?;
		Ok(())
	}

	/// Derives the file IV of a reverse mount from the inode number of the backing file, and
	/// returns the encrypted header to present for it.
	fn generate_reverse_header(&mut self) -> Result<[u8; HEADER_LEN]> {
		let ino = self.base.get_attr()?.ino;
		if ino == 0 {
			return Err(Error::Invariant("backing file has no inode number"));
		}

		trace!("Generating reverse file header <ino={ino}>");

		let mut header = header::reverse_file_iv(ino);
		self.file_iv = Some(
			NonZeroU64::new(u64::from_be_bytes(header))
				.ok_or(Error::Invariant("reverse file IV is zero"))?,
		);

		self.config
			.cipher()
			.stream_encode(&mut header, self.external_seed(), self.config.key())
			.map_err(|e| {
				debug!("Failed to encode reverse header: {e}");
				Error::BadMessage
			})?;

		Ok(header)
	}

	/// The first read that returns data materializes the header.
	fn ensure_header_after_read(&mut self, read: usize) -> Result<()> {
		if self.have_header && self.file_iv.is_none() && read > 0 {
			self.init_header()?;
		}
		Ok(())
	}

	fn block_read(&self, buf: &mut [u8], iv: u64) -> Result<()> {
		let cipher = self.config.cipher();
		let key = self.config.key();

		let res = if self.config.reverse_encryption() {
			cipher.block_encode(buf, iv, key)
		} else if self.config.allow_holes() && is_hole(buf) {
			return Ok(());
		} else {
			cipher.block_decode(buf, iv, key)
		};

		res.map_err(|e| {
			debug!("Block decode failed <iv={iv}, len={}>: {e}", buf.len());
			Error::BadMessage
		})
	}

	fn stream_read(&self, buf: &mut [u8], iv: u64) -> Result<()> {
		let cipher = self.config.cipher();
		let key = self.config.key();

		let res = if self.config.reverse_encryption() {
			cipher.stream_encode(buf, iv, key)
		} else {
			cipher.stream_decode(buf, iv, key)
		};

		res.map_err(|e| {
			debug!("Stream decode failed <iv={iv}, len={}>: {e}", buf.len());
			Error::BadMessage
		})
	}

	fn block_write(&self, buf: &mut [u8], iv: u64) -> Result<()> {
		let cipher = self.config.cipher();
		let key = self.config.key();

		let res = if self.config.reverse_encryption() {
			cipher.block_decode(buf, iv, key)
		} else if self.config.allow_holes() && is_hole(buf) {
			return Ok(());
		} else {
			cipher.block_encode(buf, iv, key)
		};

		res.map_err(|e| {
			debug!("Block encode failed <iv={iv}, len={}>: {e}", buf.len());
			Error::BadMessage
		})
	}

	fn stream_write(&self, buf: &mut [u8], iv: u64) -> Result<()> {
		let cipher = self.config.cipher();
		let key = self.config.key();

		let res = if self.config.reverse_encryption() {
			cipher.stream_decode(buf, iv, key)
		} else {
			cipher.stream_encode(buf, iv, key)
		};

		res.map_err(|e| {
			debug!("Stream encode failed <iv={iv}, len={}>: {e}", buf.len());
			Error::BadMessage
		})
	}

	fn read_plain_block(&mut self, req: IoRequest<'_>, block_num: u64) -> Result<usize> {
		let IoRequest { offset, data } = req;
		let raw_offset = offset + self.header_len();

		let read = self.base.read(IoRequest::new(raw_offset, &mut *data))?;
		self.ensure_header_after_read(read)?;

		if read == 0 {
			trace!("Nothing to read <offset={offset}>");
			return Ok(0);
		}

		let iv = self.block_iv(block_num);
		if read == self.block_size {
			self.block_read(&mut data[..read], iv)?;
		} else {
			self.stream_read(&mut data[..read], iv)?;
		}

		Ok(read)
	}

	/// Each stored block is one byte longer than its plaintext, so block `n` starts `n`
	/// bytes further into the backing file. One extra byte is read to cover the marker.
	fn read_padded_block(&mut self, req: IoRequest<'_>, block_num: u64) -> Result<usize> {
		let cbs = self.config.cipher_block_size();
		let IoRequest { offset, data } = req;

		let mut raw = vec![0u8; data.len() + 1];
		let raw_offset = offset + block_num + self.header_len();

		let read = self.base.read(IoRequest::new(raw_offset, &mut raw))?;
		self.ensure_header_after_read(read)?;

		// zeros stored after the last whole cipher block
		let read = read - read % cbs;
		if read == 0 {
			trace!("Nothing to read <offset={offset}>");
			return Ok(0);
		}

		self.block_read(&mut raw[..read], self.block_iv(block_num))?;

		let len = padding::unpad(&raw[..read], self.block_size, self.config.allow_holes())
			.map_err(|e| {
				debug!("Wrong padding <block_num={block_num}, read={read}>");
				e
			})?;

		let len = len.min(data.len());
		data[..len].copy_from_slice(&raw[..len]);
		Ok(len)
	}

	fn write_plain_block(&mut self, req: IoRequest<'_>, block_num: u64) -> Result<usize> {
		let IoRequest { offset, data } = req;
		let iv = self.block_iv(block_num);

		if data.len() == self.block_size {
			self.block_write(data, iv)?;
		} else {
			self.stream_write(data, iv)?;
		}

		let raw_offset = offset + self.header_len();
		self.base.write(IoRequest::new(raw_offset, data))
	}

	/// Writes a padded block. The zeros after the last whole cipher block are only written
	/// when the block ends the file, so rewriting a block never touches the next one.
	fn write_padded_block(&mut self, req: IoRequest<'_>, block_num: u64) -> Result<usize> {
		let IoRequest { offset, data } = req;
		if data.is_empty() {
			return Ok(0);
		}

		let cbs = self.config.cipher_block_size();
		let len = data.len();

		let mut buf = vec![0u8; len + cbs];
		buf[..len].copy_from_slice(data);
		let encoded = padding::pad(&mut buf, len, cbs)?;

		self.block_write(&mut buf[..encoded], self.block_iv(block_num))?;

		let raw_offset = offset + block_num + self.header_len();
		let ends_file = len < self.block_size || offset + len as u64 >= self.size()?;
		let end = if ends_file { buf.len() } else { encoded };

		self.base.write(IoRequest::new(raw_offset, &mut buf[..end]))?;
		Ok(len)
	}

	/// Reads a reverse mount with unique IVs, where every file starts with a synthetic header.
	fn read_with_reverse_header(&mut self, req: IoRequest<'_>) -> Result<usize> {
		let header = self.generate_reverse_header()?;
		let IoRequest { offset, data } = req;

		trace!("Reverse header read <offset={offset}, len={}>", data.len());

		let mut header_bytes = 0;
		if offset < HEADER_SIZE {
			let start = usize::try_from(offset)
				.map_err(|_| Error::Invariant("header offset exceeds usize"))?;
			header_bytes = (HEADER_LEN - start).min(data.len());
			data[..header_bytes].copy_from_slice(&header[start..start + header_bytes]);

			if header_bytes == data.len() {
				return Ok(header_bytes);
			}
		}

		let payload_offset = offset.saturating_sub(HEADER_SIZE);
		let read = block::read(
			self,
			IoRequest::new(payload_offset, &mut data[header_bytes..]),
		)?;

		Ok(header_bytes + read)
	}

	fn truncate_blocks(&mut self, size: u64) -> Result<()> {
		if self.have_header && self.file_iv.is_none() {
			self.init_header()?;
		}

		block::truncate(self, size)?;

		// a block-aligned size leaves no block to rewrite, so the zeros after the new final
		// block are produced by cutting back to its end first
		let block_size = self.block_size as u64;
		if self.padding == Padding::Normal && size % block_size == 0 {
			let encrypted_end = size + size / block_size + self.header_len();
			trace!("Clearing padding tail <size={size}, encrypted_end={encrypted_end}>");
			self.base.truncate(encrypted_end)?;
		}

		let backing = self.mapping.padded_len(size) + self.header_len();
		trace!("Truncating backing file <size={size}, backing={backing}>");
		self.base.truncate(backing)
	}

	fn reject_reverse_writes(&self) -> Result<()> {
		if self.have_header && self.config.reverse_encryption() {
			debug!("Writing to a reverse mount with per-file IVs is not supported");
			return Err(Error::Permission(
				"writing to a reverse mount with per-file IVs",
			));
		}
		if self.padding == Padding::Reverse {
			return Err(Error::Unsupported("padded blocks on a reverse mount"));
		}
		Ok(())
	}
}

fn is_hole(buf: &[u8]) -> bool {
	buf.iter().all(|b| *b == 0)
}

impl<F: FileIo> FileIo for CipherFileIo<F> {
	fn interface(&self) -> Interface {
		Interface::new("FileIO/Cipher", 2, 0, 1)
	}

	fn open(&mut self, flags: OpenFlags) -> Result<()> {
		self.base.open(flags)?;
		self.last_flags = flags;
		Ok(())
	}

	fn set_file_name(&mut self, name: &Path) {
		self.base.set_file_name(name);
	}

	fn file_name(&self) -> &Path {
		self.base.file_name()
	}

	/// Records the IV derived by the layer above. If the header was already written under
	/// a different IV, it is rewritten under the new one.
	fn set_iv(&mut self, iv: u64) -> Result<()> {
		debug!(
			"Setting external IV <current={:?}, new={iv}, file_iv={:?}>",
			self.external_iv(),
			self.file_iv()
		);

		let new_iv = NonZeroU64::new(iv);

		if self.external_iv.is_none() {
			self.external_iv = new_iv;
			if let Some(file_iv) = self.file_iv {
				warn!(
					"File IV initialized before external IV <file_iv={file_iv}, external_iv={iv}>"
				);
			}
		} else if self.have_header && !self.config.reverse_encryption() {
			if let Err(e) = self.base.open(self.last_flags.with_read_write()) {
				if e.is_directory() {
					// directories carry no header
					self.external_iv = new_iv;
					return self.base.set_iv(iv);
				}
				debug!("Failed to reopen for write while setting the IV: {e}");
				return Err(e);
			}

			if self.file_iv.is_none() {
				self.init_header()?;
			}

			let old_iv = std::mem::replace(&mut self.external_iv, new_iv);
			if let Err(e) = self.write_header() {
				self.external_iv = old_iv;
				return Err(e);
			}
		} else {
			self.external_iv = new_iv;
		}

		self.base.set_iv(iv)
	}

	fn get_attr(&self) -> Result<FileAttr> {
		let mut attr = self.base.get_attr()?;
		if attr.kind == FileKind::Regular {
			attr.size = self.mapping.presented_size(attr.size)?;
		}
		Ok(attr)
	}

	fn size(&self) -> Result<u64> {
		self.mapping.presented_size(self.base.size()?)
	}

	fn read(&mut self, req: IoRequest<'_>) -> Result<usize> {
		if self.have_header && self.config.reverse_encryption() {
			return self.read_with_reverse_header(req);
		}

		block::read(self, req)
	}

	fn write(&mut self, req: IoRequest<'_>) -> Result<usize> {
		self.reject_reverse_writes()?;

		let IoRequest { offset, data } = req;
		block::write(self, offset, data)
	}

	fn truncate(&mut self, size: u64) -> Result<()> {
		self.reject_reverse_writes()?;

		let reopened = if self.base.is_writable() {
			false
		} else {
			if let Err(e) = self.base.open(self.last_flags.with_read_write()) {
				debug!("Failed to reopen for write while truncating: {e}");
				return Err(e);
			}
			true
		};

		let res = self.truncate_blocks(size);

		if reopened {
			let restored = self.base.open(self.last_flags);
			return res.and(restored);
		}

		res
	}

	fn is_writable(&self) -> bool {
		self.base.is_writable()
	}
}

impl<F: FileIo> BlockIo for CipherFileIo<F> {
	fn block_size(&self) -> usize {
		self.block_size
	}

	fn allow_holes(&self) -> bool {
		self.config.allow_holes()
	}

	fn logical_size(&self) -> Result<u64> {
		self.size()
	}

	fn read_one_block(&mut self, req: IoRequest<'_>) -> Result<usize> {
		let block_num = req.offset / self.block_size as u64;

		match self.padding {
			Padding::None => self.read_plain_block(req, block_num),
			Padding::Normal => self.read_padded_block(req, block_num),
			Padding::Reverse => Err(Error::Unsupported("padded blocks on a reverse mount")),
		}
	}

	fn write_one_block(&mut self, req: IoRequest<'_>) -> Result<usize> {
		self.reject_reverse_writes()?;

		let block_num = req.offset / self.block_size as u64;

		if self.have_header && self.file_iv.is_none() {
			self.init_header()?;
		}

		if self.padding == Padding::Normal {
			self.write_padded_block(req, block_num)
		} else {
			self.write_plain_block(req, block_num)
		}
	}
}
