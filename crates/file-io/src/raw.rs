use std::{
	fs::{self, File, OpenOptions},
	io,
	os::unix::fs::FileExt,
	path::{Path, PathBuf},
};

use tracing::{debug, trace};

use crate::{Error, FileAttr, FileIo, Interface, IoRequest, OpenFlags, Result};

/// Direct access to a file on the underlying filesystem.
///
/// The handle is opened lazily by [`FileIo::open`]. Once a writable handle exists,
/// later read-only opens keep using it; a read-write open on a read-only handle
/// replaces it.
#[derive(Debug)]
pub struct RawFileIo {
	name: PathBuf,
	file: Option<File>,
	can_write: bool,
}

impl RawFileIo {
	pub fn new(name: impl Into<PathBuf>) -> Self {
		Self {
			name: name.into(),
			file: None,
			can_write: false,
		}
	}

	fn file(&self) -> Result<&File> {
		self.file.as_ref().ok_or(Error::NotOpen)
	}
}

impl FileIo for RawFileIo {
	fn interface(&self) -> Interface {
		Interface::new("FileIO/Raw", 1, 0, 0)
	}

	fn open(&mut self, flags: OpenFlags) -> Result<()> {
		let write = flags.is_writable();
		if self.file.is_some() && (self.can_write || !write) {
			return Ok(());
		}

		// Block read-modify-write cycles need read access even on write-only opens.
		let file = OpenOptions::new()
			.read(true)
			.write(write)
			.create(write && flags.creates())
			.open(&self.name)
			.map_err(|e| {
				debug!(
					"Failed to open <path='{}', write={write}>: {e}",
					self.name.display()
				);
				e
			})?;

		trace!("Opened <path='{}', write={write}>", self.name.display());

		self.file = Some(file);
		self.can_write = write;

		Ok(())
	}

	fn set_file_name(&mut self, name: &Path) {
		self.name = name.to_path_buf();
	}

	fn file_name(&self) -> &Path {
		&self.name
	}

	fn set_iv(&mut self, _iv: u64) -> Result<()> {
		Ok(())
	}

	fn get_attr(&self) -> Result<FileAttr> {
		let metadata = fs::symlink_metadata(&self.name)?;
		Ok(FileAttr::from(&metadata))
	}

	fn size(&self) -> Result<u64> {
		let metadata = match &self.file {
			Some(file) => file.metadata()?,
			None => fs::symlink_metadata(&self.name)?,
		};

		Ok(metadata.len())
	}

	fn read(&mut self, req: IoRequest<'_>) -> Result<usize> {
		let file = self.file()?;
		let IoRequest { offset, data } = req;

		let mut done = 0;
		while done < data.len() {
			match file.read_at(&mut data[done..], offset + done as u64) {
				Ok(0) => break,
				Ok(n) => done += n,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e.into()),
			}
		}

		Ok(done)
	}

	fn write(&mut self, req: IoRequest<'_>) -> Result<usize> {
		self.file()?.write_all_at(req.data, req.offset)?;
		Ok(req.data.len())
	}

	fn truncate(&mut self, size: u64) -> Result<()> {
		match &self.file {
			Some(file) if self.can_write => file.set_len(size)?,
			_ => OpenOptions::new()
				.write(true)
				.open(&self.name)?
				.set_len(size)?,
		}

		Ok(())
	}

	fn is_writable(&self) -> bool {
		self.can_write
	}
}
