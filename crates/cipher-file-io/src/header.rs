use sha1::{Digest, Sha1};

/// Length of the per-file IV header at the start of every backing file.
pub const HEADER_LEN: usize = 8;
pub const HEADER_SIZE: u64 = HEADER_LEN as u64;

/// The plaintext header a reverse mount presents for the file with inode `ino`.
///
/// Inode numbers are small and sequential, so they are hashed before use; XOR-ing them with
/// block numbers directly would repeat IVs across files.
#[must_use]
pub fn reverse_file_iv(ino: u64) -> [u8; HEADER_LEN] {
	let digest = Sha1::digest(ino.to_le_bytes());

	let mut header = [0u8; HEADER_LEN];
	header.copy_from_slice(&digest[..HEADER_LEN]);
	header
}
