//! # Cipher File I/O
//!
//! The layer of the encrypting filesystem that turns plaintext blocks into ciphertext blocks.
//! [`CipherFileIo`] wraps the [`FileIo`](vfs_file_io::FileIo) of a backing file and:
//! - maps offsets and sizes between the two views, accounting for the per-file IV header and
//!   block padding ([`SizeMapping`]);
//! - creates, reads and rewrites the per-file IV header;
//! - encrypts and decrypts blocks through the [`block`](vfs_file_io::block) engine, keeping
//!   sparse files sparse.
//!
//! Volume-wide settings live in a shared [`FsConfig`].

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

mod cipher_file_io;
mod config;
pub mod header;
pub mod padding;
mod size;

pub use cipher_file_io::CipherFileIo;
pub use config::{FsConfig, FsOptions, Padding, DEFAULT_BLOCK_SIZE};
pub use size::SizeMapping;
