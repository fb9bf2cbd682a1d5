//!
//! # File I/O
//!
//! The contracts every layer of the encrypting filesystem speaks, from the raw backing file up to
//! the file surface presented to the user:
//! - [`FileIo`], the per-open-file interface (open, stat, positional read/write, truncate);
//! - [`RawFileIo`], the implementation that talks to the real filesystem;
//! - the [`block`] chunking engine, which splits arbitrary-offset requests into per-block
//!   operations against any [`BlockIo`] capability;
//! - [`Interface`] identifiers used for on-disk format compatibility checks.
//!
//! Every operation is blocking and works on one open file; callers serialize access per file.

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
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future, unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod block;
pub mod error;
mod file;
mod interface;
mod raw;

pub use block::BlockIo;
pub use error::{Error, Result};
pub use file::{FileAttr, FileIo, FileKind, IoRequest, OpenFlags};
pub use interface::Interface;
pub use raw::RawFileIo;
