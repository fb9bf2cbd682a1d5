use std::{
	fs,
	sync::{atomic::Ordering, Arc},
};

use tempfile::tempdir;
use tracing_test::traced_test;
use vfs_cipher_file_io::{CipherFileIo, FsOptions, SizeMapping};
use vfs_file_io::{Error, FileIo, FileKind, IoRequest, OpenFlags};

mod common;

use common::{
	config, open, random_bytes, read_at, read_to_end, small_blocks, unpadded_iface, write_all,
	FailingWrites,
};

#[test]
#[traced_test]
fn two_padded_blocks_with_header() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(FsOptions::default());
	let payload = random_bytes(2000);

	let mut io = open(&path, &config, OpenFlags::CREATE, 1234);
	write_all(&mut io, 0, &payload);

	// header + 1023 and 977 byte blocks, each with a marker, + the final padding
	assert_eq!(fs::metadata(&path).unwrap().len(), 2025);
	assert_eq!(io.size().unwrap(), 2000);
	assert_eq!(read_to_end(&mut io), payload);
	drop(io);

	let mut io = open(&path, &config, OpenFlags::READ_ONLY, 1234);
	assert_eq!(read_to_end(&mut io), payload);
	assert_eq!(io.get_attr().unwrap().size, 2000);
}

#[test]
fn every_length_of_a_padded_block() {
	let dir = tempdir().unwrap();
	let config = config(small_blocks());
	let mapping = SizeMapping::new(&config);

	for len in 0..64 {
		let path = dir.path().join(format!("file-{len}"));
		let payload = random_bytes(len);

		let mut io = open(&path, &config, OpenFlags::CREATE, 7);
		write_all(&mut io, 0, &payload);

		let physical = fs::metadata(&path).unwrap().len();
		assert_eq!(physical, mapping.to_ciphertext(len as u64), "len={len}");
		assert_eq!(io.size().unwrap(), len as u64);
		assert_eq!(read_to_end(&mut io), payload, "len={len}");
	}
}

#[test]
fn unaligned_rewrites_span_blocks() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(small_blocks());

	let mut expected = random_bytes(500);
	let mut io = open(&path, &config, OpenFlags::CREATE, 99);
	write_all(&mut io, 0, &expected);

	let patch = random_bytes(150);
	write_all(&mut io, 100, &patch);
	expected[100..250].copy_from_slice(&patch);

	let tail = random_bytes(40);
	write_all(&mut io, 480, &tail);
	expected.truncate(480);
	expected.extend_from_slice(&tail);

	assert_eq!(io.size().unwrap(), 520);
	assert_eq!(read_to_end(&mut io), expected);
	assert_eq!(read_at(&mut io, 61, 70), expected[61..131]);
}

#[test]
fn unpadded_volume_stores_exact_lengths() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(FsOptions {
		block_size: 64,
		cipher_iface: Some(unpadded_iface()),
		..Default::default()
	});
	let payload = random_bytes(150);

	let mut io = open(&path, &config, OpenFlags::CREATE, 3);
	write_all(&mut io, 0, &payload);

	assert_eq!(fs::metadata(&path).unwrap().len(), 158);
	assert_eq!(read_to_end(&mut io), payload);

	let raw = fs::read(&path).unwrap();
	assert_ne!(&raw[8..], payload.as_slice());
}

#[test]
fn holes_stay_sparse() {
	let dir = tempdir().unwrap();
	let config = config(small_blocks());

	let path = dir.path().join("sparse");
	let mut io = open(&path, &config, OpenFlags::CREATE, 11);
	write_all(&mut io, 0, b"head");
	write_all(&mut io, 1000, b"tail");

	let contents = read_to_end(&mut io);
	assert_eq!(contents.len(), 1004);
	assert_eq!(&contents[..4], b"head");
	assert!(contents[4..1000].iter().all(|b| *b == 0));
	assert_eq!(&contents[1000..], b"tail");

	// block 5 is stored at 8 + 5 * 64 and was never written
	let raw = fs::read(&path).unwrap();
	assert!(raw[328..392].iter().all(|b| *b == 0));
}

#[test]
fn empty_write_past_the_end_keeps_the_size() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(small_blocks());

	let mut io = open(&path, &config, OpenFlags::CREATE, 12);
	write_all(&mut io, 0, b"abc");
	let backing = fs::metadata(&path).unwrap().len();

	assert_eq!(io.write(IoRequest::new(500, &mut [])).unwrap(), 0);
	assert_eq!(io.size().unwrap(), 3);
	assert_eq!(fs::metadata(&path).unwrap().len(), backing);
	assert_eq!(read_to_end(&mut io), b"abc");
}

#[test]
fn gaps_are_encrypted_without_holes() {
	let dir = tempdir().unwrap();
	let config = config(FsOptions {
		allow_holes: false,
		..small_blocks()
	});

	let path = dir.path().join("dense");
	let mut io = open(&path, &config, OpenFlags::CREATE, 11);
	write_all(&mut io, 0, b"head");
	write_all(&mut io, 1000, b"tail");

	let contents = read_to_end(&mut io);
	assert_eq!(contents.len(), 1004);
	assert!(contents[4..1000].iter().all(|b| *b == 0));

	let raw = fs::read(&path).unwrap();
	assert!(raw[328..392].iter().any(|b| *b != 0));
}

#[test]
fn zero_blocks_are_not_encrypted_with_holes() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(FsOptions {
		block_size: 64,
		cipher_iface: Some(unpadded_iface()),
		..Default::default()
	});

	let mut io = open(&path, &config, OpenFlags::CREATE, 5);
	let mut payload = vec![0u8; 128];
	payload[64..].copy_from_slice(&random_bytes(64));
	write_all(&mut io, 0, &payload);

	let raw = fs::read(&path).unwrap();
	assert!(raw[8..72].iter().all(|b| *b == 0));
	assert_ne!(&raw[72..], &payload[64..]);
	assert_eq!(read_to_end(&mut io), payload);
}

#[test]
fn tampering_with_the_padding_is_detected() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(small_blocks());
	let payload = random_bytes(100);

	let mut io = open(&path, &config, OpenFlags::CREATE, 21);
	write_all(&mut io, 0, &payload);
	drop(io);

	// the 37 byte final block is stored at 72 as 48 encrypted bytes and 5 zeros; its last
	// cipher block holds 5 data bytes, the marker and 10 zeros
	let original = fs::read(&path).unwrap();
	assert_eq!(original.len(), 125);

	// a flipped bit in a cipher block flips the same bit of the next plaintext block, so
	// flips at 88 + 5.. land on the marker or the zeros after it
	for pos in 93..104 {
		let mut tampered = original.clone();
		tampered[pos] ^= 0x01;
		fs::write(&path, &tampered).unwrap();

		let mut io = open(&path, &config, OpenFlags::READ_ONLY, 21);
		let mut buf = vec![0u8; 200];
		let res = io.read(IoRequest::new(0, &mut buf));
		assert!(
			matches!(res, Err(Error::BadMessage)),
			"tampering at {pos} went unnoticed: {res:?}"
		);
	}

	fs::write(&path, &original).unwrap();
	let mut io = open(&path, &config, OpenFlags::READ_ONLY, 21);
	assert_eq!(read_to_end(&mut io), payload);
}

#[test]
#[traced_test]
fn header_survives_reopen() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(small_blocks());

	let mut io = open(&path, &config, OpenFlags::CREATE, 77);
	assert_eq!(io.file_iv(), None);
	write_all(&mut io, 0, b"some data");
	let file_iv = io.file_iv().unwrap();
	drop(io);

	let mut io = open(&path, &config, OpenFlags::READ_ONLY, 77);
	assert_eq!(read_at(&mut io, 0, 4), b"some");
	assert_eq!(io.file_iv(), Some(file_iv));
}

#[test]
fn distinct_files_get_distinct_ivs() {
	let dir = tempdir().unwrap();
	let config = config(small_blocks());
	let payload = random_bytes(64);

	let mut a = open(&dir.path().join("a"), &config, OpenFlags::CREATE, 1);
	let mut b = open(&dir.path().join("b"), &config, OpenFlags::CREATE, 1);
	write_all(&mut a, 0, &payload);
	write_all(&mut b, 0, &payload);

	assert_ne!(a.file_iv(), b.file_iv());
	assert_ne!(
		fs::read(dir.path().join("a")).unwrap()[8..],
		fs::read(dir.path().join("b")).unwrap()[8..]
	);
}

#[test]
#[traced_test]
fn changing_the_external_iv_rewrites_the_header() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(small_blocks());
	let payload = random_bytes(300);

	let mut io = open(&path, &config, OpenFlags::CREATE, 1);
	write_all(&mut io, 0, &payload);
	let file_iv = io.file_iv();
	let old_header = fs::read(&path).unwrap()[..8].to_vec();

	io.set_iv(2).unwrap();
	assert_eq!(io.external_iv(), Some(2));
	assert_eq!(io.file_iv(), file_iv);
	assert_ne!(fs::read(&path).unwrap()[..8], old_header[..]);
	drop(io);

	let mut io = open(&path, &config, OpenFlags::READ_ONLY, 2);
	assert_eq!(read_to_end(&mut io), payload);
	assert_eq!(io.file_iv(), file_iv);
	drop(io);

	// under the old IV the header decodes to a different file IV
	let mut io = open(&path, &config, OpenFlags::READ_ONLY, 1);
	let mut buf = vec![0u8; 300];
	match io.read(IoRequest::new(0, &mut buf)) {
		Ok(read) => assert_ne!(buf[..read], payload[..]),
		Err(e) => assert!(matches!(e, Error::BadMessage | Error::Invariant(_))),
	}
}

#[test]
fn failed_header_rewrite_keeps_the_old_iv() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(small_blocks());
	let payload = random_bytes(150);

	let (base, fail_writes) = FailingWrites::new(&path);
	let mut io = CipherFileIo::new(base, Arc::clone(&config));
	io.open(OpenFlags::CREATE).unwrap();
	io.set_iv(1).unwrap();
	write_all(&mut io, 0, &payload);
	let file_iv = io.file_iv();
	let header = fs::read(&path).unwrap()[..8].to_vec();

	fail_writes.store(true, Ordering::SeqCst);
	assert!(matches!(io.set_iv(2), Err(Error::Io(_))));
	assert_eq!(io.external_iv(), Some(1));
	assert_eq!(io.file_iv(), file_iv);
	assert_eq!(fs::read(&path).unwrap()[..8], header[..]);
	drop(io);

	let mut io = open(&path, &config, OpenFlags::READ_ONLY, 1);
	assert_eq!(read_to_end(&mut io), payload);
	assert_eq!(io.file_iv(), file_iv);
}

#[test]
fn setting_the_iv_of_an_unopened_file_loads_its_header() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(small_blocks());

	let mut io = open(&path, &config, OpenFlags::CREATE, 1);
	write_all(&mut io, 0, b"abc");
	let file_iv = io.file_iv();
	drop(io);

	// the header is read under the old IV before it is rewritten under the new one
	let mut io = open(&path, &config, OpenFlags::READ_ONLY, 1);
	io.set_iv(9).unwrap();
	assert_eq!(io.file_iv(), file_iv);
	drop(io);

	let mut io = open(&path, &config, OpenFlags::READ_ONLY, 9);
	assert_eq!(read_to_end(&mut io), b"abc");
}

#[test]
fn directories_pass_through() {
	let dir = tempdir().unwrap();
	let sub = dir.path().join("sub");
	fs::create_dir(&sub).unwrap();
	let config = config(FsOptions::default());

	let mut io = open(&sub, &config, OpenFlags::READ_ONLY, 1);
	io.set_iv(2).unwrap();
	assert_eq!(io.external_iv(), Some(2));
	assert_eq!(io.file_iv(), None);

	let attr = io.get_attr().unwrap();
	assert_eq!(attr.kind, FileKind::Directory);
	assert_eq!(attr.size, fs::metadata(&sub).unwrap().len());
}

#[test]
fn truncate_shrinks_and_grows() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(small_blocks());
	let mapping = SizeMapping::new(&config);
	let payload = random_bytes(200);

	let mut io = open(&path, &config, OpenFlags::CREATE, 4);
	write_all(&mut io, 0, &payload);

	io.truncate(70).unwrap();
	assert_eq!(io.size().unwrap(), 70);
	assert_eq!(fs::metadata(&path).unwrap().len(), mapping.to_ciphertext(70));
	assert_eq!(read_to_end(&mut io), payload[..70]);

	io.truncate(300).unwrap();
	assert_eq!(io.size().unwrap(), 300);
	let contents = read_to_end(&mut io);
	assert_eq!(contents[..70], payload[..70]);
	assert!(contents[70..].iter().all(|b| *b == 0));

	io.truncate(0).unwrap();
	assert_eq!(io.size().unwrap(), 0);
	assert_eq!(fs::metadata(&path).unwrap().len(), 8);
	assert!(read_to_end(&mut io).is_empty());
}

#[test]
fn aligned_truncate_leaves_a_clean_tail_for_holes() {
	for unique_iv in [true, false] {
		let dir = tempdir().unwrap();
		let path = dir.path().join("file");
		let config = config(FsOptions {
			unique_iv,
			..small_blocks()
		});
		let mapping = SizeMapping::new(&config);
		let header = if unique_iv { 8 } else { 0 };
		let payload = random_bytes(200);

		let mut io = open(&path, &config, OpenFlags::CREATE, 3);
		write_all(&mut io, 0, &payload);

		// two whole blocks of 63 bytes, stored as 128 bytes and 15 zeros
		io.truncate(126).unwrap();
		let raw = fs::read(&path).unwrap();
		assert_eq!(raw.len() as u64, mapping.to_ciphertext(126));
		assert!(raw[header + 128..].iter().all(|b| *b == 0));

		// blocks 2 and 3 become holes that start in that tail
		write_all(&mut io, 300, b"x");
		let contents = read_to_end(&mut io);
		assert_eq!(contents.len(), 301);
		assert_eq!(contents[..126], payload[..126]);
		assert!(contents[126..300].iter().all(|b| *b == 0));
		assert_eq!(contents[300], b'x');
	}
}

#[test]
fn truncating_an_empty_file_writes_its_header() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(FsOptions::default());

	let mut io = open(&path, &config, OpenFlags::CREATE, 8);
	io.truncate(0).unwrap();

	assert!(io.file_iv().is_some());
	assert_eq!(fs::metadata(&path).unwrap().len(), 8);
	assert_eq!(io.size().unwrap(), 0);
}

#[test]
fn truncate_reopens_a_read_only_file() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(small_blocks());
	let payload = random_bytes(150);

	let mut io = open(&path, &config, OpenFlags::CREATE, 6);
	write_all(&mut io, 0, &payload);
	drop(io);

	let mut io = open(&path, &config, OpenFlags::READ_ONLY, 6);
	assert!(!io.is_writable());

	io.truncate(10).unwrap();
	assert_eq!(io.size().unwrap(), 10);
	assert_eq!(read_to_end(&mut io), payload[..10]);
}

#[test]
fn writes_to_a_read_only_file_fail() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	let config = config(small_blocks());

	let mut io = open(&path, &config, OpenFlags::CREATE, 6);
	write_all(&mut io, 0, b"read only");
	drop(io);

	let mut io = open(&path, &config, OpenFlags::READ_ONLY, 6);
	assert_eq!(read_to_end(&mut io), b"read only");

	let mut buf = *b"nope";
	assert!(matches!(
		io.write(IoRequest::new(0, &mut buf)),
		Err(Error::Io(_))
	));
	assert_eq!(read_to_end(&mut io), b"read only");
}

#[test]
fn short_ciphertext_is_reported() {
	let dir = tempdir().unwrap();
	let path = dir.path().join("file");
	fs::write(&path, b"abc").unwrap();
	let config = config(FsOptions::default());

	let io = open(&path, &config, OpenFlags::READ_ONLY, 1);
	assert!(matches!(io.size(), Err(Error::Invariant(_))));
}
