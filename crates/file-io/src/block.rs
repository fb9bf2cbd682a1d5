//! The block chunking engine.
//!
//! Layers that can only transform whole blocks implement [`BlockIo`]; the functions in
//! this module turn arbitrary byte-range reads, writes and truncations into calls on it.
//! Partial blocks are handled by reading the block, patching it and writing it back.
//! Blocks are addressed by their logical offset, which is always a multiple of
//! [`BlockIo::block_size`].

use std::cmp::Ordering;

use tracing::trace;

use crate::{Error, IoRequest, Result};

/// The per-block capability the engine drives.
pub trait BlockIo {
	/// Logical bytes per block.
	fn block_size(&self) -> usize;

	/// Whether gaps created by extending a file may be left as unwritten holes.
	fn allow_holes(&self) -> bool;

	/// Logical size of the file.
	fn logical_size(&self) -> Result<u64>;

	/// Reads the block starting at `req.offset` into `req.data` (one block long).
	/// Returns the number of valid bytes, which is short only for the final block.
	fn read_one_block(&mut self, req: IoRequest<'_>) -> Result<usize>;

	/// Writes `req.data` as the block starting at `req.offset`. A short block is only
	/// ever written as the final block of the file.
	fn write_one_block(&mut self, req: IoRequest<'_>) -> Result<usize>;
}

fn offset_in_block(pos: u64, block_size: u64) -> Result<usize> {
	usize::try_from(pos % block_size).map_err(|_| Error::Invariant("block size exceeds usize"))
}

/// Reads `req.len()` bytes at `req.offset`, stopping early at end of file.
pub fn read<B: BlockIo + ?Sized>(io: &mut B, req: IoRequest<'_>) -> Result<usize> {
	let bs = io.block_size();
	let bs64 = bs as u64;
	let IoRequest { offset, data } = req;

	let mut block = Vec::new();
	let mut done = 0;

	while done < data.len() {
		let pos = offset + done as u64;
		let block_start = pos - pos % bs64;
		let in_block = offset_in_block(pos, bs64)?;
		let wanted = (bs - in_block).min(data.len() - done);

		let read = if in_block == 0 && wanted == bs {
			io.read_one_block(IoRequest::new(block_start, &mut data[done..done + bs]))?
		} else {
			block.resize(bs, 0);
			let read = io.read_one_block(IoRequest::new(block_start, &mut block))?;
			if read > in_block {
				let n = (read - in_block).min(wanted);
				data[done..done + n].copy_from_slice(&block[in_block..in_block + n]);
			}
			read
		};

		done += read.saturating_sub(in_block).min(wanted);

		if read < bs {
			break;
		}
	}

	Ok(done)
}

/// Writes `data` at `offset`, extending the file first if `offset` lies past its end.
/// An empty write never extends the file.
pub fn write<B: BlockIo + ?Sized>(io: &mut B, offset: u64, data: &[u8]) -> Result<usize> {
	if data.is_empty() {
		return Ok(0);
	}

	let bs = io.block_size();
	let bs64 = bs as u64;

	let file_size = io.logical_size()?;
	if offset > file_size {
		pad_file(io, file_size, offset, false)?;
	}

	let mut block = vec![0u8; bs];
	let mut done = 0;

	while done < data.len() {
		let pos = offset + done as u64;
		let block_start = pos - pos % bs64;
		let in_block = offset_in_block(pos, bs64)?;
		let n = (bs - in_block).min(data.len() - done);
		let chunk = &data[done..done + n];

		if n == bs {
			block.copy_from_slice(chunk);
			io.write_one_block(IoRequest::new(block_start, &mut block))?;
		} else {
			let read = io.read_one_block(IoRequest::new(block_start, &mut block))?;
			block[read..].fill(0);
			block[in_block..in_block + n].copy_from_slice(chunk);

			let len = read.max(in_block + n);
			io.write_one_block(IoRequest::new(block_start, &mut block[..len]))?;
		}

		done += n;
	}

	Ok(done)
}

/// Grows the file from `old_size` to `new_size`.
///
/// The old final block is completed to a full block and the blocks in between are
/// written as zeros, unless holes are allowed. The new final block is only written
/// when `force_write` is set; a regular write takes care of it itself.
fn pad_file<B: BlockIo + ?Sized>(
	io: &mut B,
	old_size: u64,
	new_size: u64,
	force_write: bool,
) -> Result<()> {
	let bs = io.block_size();
	let bs64 = bs as u64;

	let old_last = old_size / bs64;
	let new_last = new_size / bs64;
	let new_tail = offset_in_block(new_size, bs64)?;

	trace!("Padding file <old_size={old_size}, new_size={new_size}, force_write={force_write}>");

	let mut block = vec![0u8; bs];

	if old_last == new_last {
		if force_write && new_tail > 0 {
			let read = io.read_one_block(IoRequest::new(new_last * bs64, &mut block))?;
			block[read..].fill(0);
			io.write_one_block(IoRequest::new(new_last * bs64, &mut block[..new_tail]))?;
		}
		return Ok(());
	}

	let mut block_num = old_last;

	if old_size % bs64 != 0 {
		let read = io.read_one_block(IoRequest::new(block_num * bs64, &mut block))?;
		block[read..].fill(0);
		io.write_one_block(IoRequest::new(block_num * bs64, &mut block))?;
		block_num += 1;
	}

	if !io.allow_holes() {
		while block_num < new_last {
			block.fill(0);
			io.write_one_block(IoRequest::new(block_num * bs64, &mut block))?;
			block_num += 1;
		}
	}

	if force_write && new_tail > 0 {
		block.fill(0);
		io.write_one_block(IoRequest::new(new_last * bs64, &mut block[..new_tail]))?;
	}

	Ok(())
}

/// Brings the block contents in line with a logical size of `size`.
///
/// Growing fills the gap as [`write`] does, and also materializes the new final block.
/// Shrinking to a non block-aligned size rewrites the new final block at its shorter
/// length. The backing file itself is never resized here: its size depends on how the
/// implementor lays blocks out, so the caller sets it afterwards.
pub fn truncate<B: BlockIo + ?Sized>(io: &mut B, size: u64) -> Result<()> {
	let bs = io.block_size();
	let bs64 = bs as u64;
	let old_size = io.logical_size()?;

	match size.cmp(&old_size) {
		Ordering::Greater => pad_file(io, old_size, size, true),
		Ordering::Equal => Ok(()),
		Ordering::Less => {
			let partial = offset_in_block(size, bs64)?;
			if partial != 0 {
				let block_start = size - size % bs64;
				let mut block = vec![0u8; bs];

				let read = io.read_one_block(IoRequest::new(block_start, &mut block))?;
				if read >= partial {
					io.write_one_block(IoRequest::new(block_start, &mut block[..partial]))?;
				}
			}
			Ok(())
		}
	}
}
