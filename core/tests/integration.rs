//! End-to-end scenarios and property tests for the WFS core, driven against
//! real temporary files via `tempfile`.

use std::collections::{HashMap, HashSet};
use std::fs::File;

use wfs_core::device::Device;
use wfs_core::error::Error;
use wfs_core::format::{WFS_MAGIC, SB_SIZE, SIZEOF_INODE};
use wfs_core::log_store::LogStore;
use wfs_core::ops::Filesystem;
use wfs_core::resolver::Resolver;

const IMAGE_SIZE: u64 = 4 * 1024 * 1024;

fn new_image(len: u64) -> File {
	let file = tempfile::tempfile().expect("tempfile");
	file.set_len(len).expect("set_len");
	file
}

fn format_and_open(file: &File) -> LogStore {
	let for_format = file.try_clone().unwrap();
	LogStore::format(Device::new(for_format)).unwrap();
	let for_open = file.try_clone().unwrap();
	LogStore::open(Device::new(for_open)).unwrap()
}

fn fresh_fs(len: u64) -> (Filesystem, File) {
	let file = new_image(len);
	let store = format_and_open(&file);
	(Filesystem::new(store), file)
}

fn reopen_fs(file: &File) -> Filesystem {
	let for_open = file.try_clone().unwrap();
	Filesystem::new(LogStore::open(Device::new(for_open)).unwrap())
}

fn collect_names(fs: &mut Filesystem, path: &str) -> Vec<String> {
	let mut names = Vec::new();
	fs.readdir(path, |n| {
		names.push(n.to_owned());
		true
	})
	.unwrap();
	names.sort();
	names
}

// --- Concrete end-to-end scenarios ------------------------------------------

#[test]
fn scenario_1_format_and_list_root() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	assert!(collect_names(&mut fs, "/").is_empty());
	let st = fs.getattr("/").unwrap();
	assert_eq!(st.mode & 0xF000, 0x4000); // S_IFDIR
	assert!(st.nlink >= 1);
}

#[test]
fn scenario_2_create_and_read() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	fs.mkdir("/d", 0o755).unwrap();
	fs.mknod("/d/f", 0o644).unwrap();
	fs.write("/d/f", 0, b"hello").unwrap();
	assert_eq!(fs.read("/d/f", 0, 5).unwrap(), b"hello");
	assert_eq!(fs.getattr("/d/f").unwrap().size, 5);
}

#[test]
fn scenario_3_overwrite() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	fs.mkdir("/d", 0o755).unwrap();
	fs.mknod("/d/f", 0o644).unwrap();
	fs.write("/d/f", 0, b"hello").unwrap();
	fs.write("/d/f", 1, b"ELLO").unwrap();
	assert_eq!(fs.read("/d/f", 0, 5).unwrap(), b"hELLO");
}

#[test]
fn scenario_4_unlink() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	fs.mkdir("/d", 0o755).unwrap();
	fs.mknod("/d/f", 0o644).unwrap();
	fs.write("/d/f", 0, b"hello").unwrap();
	fs.unlink("/d/f").unwrap();

	assert!(matches!(fs.getattr("/d/f"), Err(Error::NotFound)));
	assert!(collect_names(&mut fs, "/d").is_empty());
}

#[test]
fn scenario_5_duplicate_create_rejected() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	fs.mknod("/a", 0o644).unwrap();
	assert!(matches!(fs.mknod("/a", 0o644), Err(Error::Exists)));
}

#[test]
fn scenario_6_compaction_reclaims_after_mass_unlink() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	for i in 0..100 {
		fs.mknod(&format!("/f{i}"), 0o644).unwrap();
	}
	for i in 0..100 {
		fs.unlink(&format!("/f{i}")).unwrap();
	}

	let mut store = fs.into_store();
	let report = wfs_core::compactor::compact(&mut store).unwrap();
	assert_eq!(report.entries_kept, 1); // only root remains
	assert_eq!(store.head(), SB_SIZE + SIZEOF_INODE);
}

// --- Property tests (P1-P8) --------------------------------------------------

#[test]
fn p1_magic_preserved_across_operations() {
	let (mut fs, file) = fresh_fs(IMAGE_SIZE);
	fs.mkdir("/d", 0o755).unwrap();
	fs.mknod("/d/f", 0o644).unwrap();
	fs.write("/d/f", 0, b"abc").unwrap();
	fs.unlink("/d/f").unwrap();
	drop(fs);

	let fs = reopen_fs(&file);
	assert_eq!(fs.into_store().magic(), WFS_MAGIC);
}

#[test]
fn p2_head_monotone_and_bounded() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	for i in 0..20 {
		fs.mknod(&format!("/n{i}"), 0o644).unwrap();
		fs.write(&format!("/n{i}"), 0, b"payload").unwrap();
	}
	let mut store = fs.into_store();
	assert!(store.head() <= IMAGE_SIZE);

	// Offsets only ever grow across the log.
	let mut last_off = 0u64;
	let mut first = true;
	for item in store.iter_from_start() {
		let (off, _entry) = item.unwrap();
		if !first {
			assert!(off > last_off);
		}
		last_off = off;
		first = false;
	}
}

#[test]
fn p3_last_write_wins_under_a_pseudo_random_stream() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	fs.mknod("/x", 0o644).unwrap();

	let mut rng = Xorshift64::new(0xC0FFEE);
	let mut expected_payload: Option<Vec<u8>> = Some(Vec::new());
	let mut expected_deleted = false;

	for step in 0..200 {
		let choice = rng.next() % 3;
		if expected_deleted {
			// Recreate so later writes have somewhere to land.
			fs.mknod("/x", 0o644).unwrap();
			expected_deleted = false;
			expected_payload = Some(Vec::new());
		}
		match choice {
			0 => {
				let len = (rng.next() % 16) as usize;
				let byte = (step % 251) as u8;
				let bytes = vec![byte; len];
				fs.write("/x", 0, &bytes).unwrap();
				let mut payload = expected_payload.take().unwrap();
				if payload.len() < bytes.len() {
					payload.resize(bytes.len(), 0);
				}
				payload[..bytes.len()].copy_from_slice(&bytes);
				expected_payload = Some(payload);
			}
			1 => {
				fs.unlink("/x").unwrap();
				expected_deleted = true;
			}
			_ => {
				// No-op step: just re-read and confirm agreement.
			}
		}

		if !expected_deleted {
			let st = fs.getattr("/x").unwrap();
			assert_eq!(st.size as usize, expected_payload.as_ref().unwrap().len());
		} else {
			assert!(matches!(fs.getattr("/x"), Err(Error::NotFound)));
		}
	}
}

#[test]
fn p4_delete_opacity() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	fs.mknod("/f", 0o644).unwrap();
	fs.unlink("/f").unwrap();

	let mut store = fs.into_store();
	let mut resolver = Resolver::new(&mut store);
	// "/f" is the only entity ever created, so it got inode number 1.
	assert!(matches!(resolver.latest_entry_for(1), Err(Error::NotFound)));
	assert!(matches!(resolver.resolve_path("/f"), Err(Error::NotFound)));
}

#[test]
fn p5_round_trip_arbitrary_bytes() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	fs.mknod("/f", 0o644).unwrap();
	let data: Vec<u8> = (0..500).map(|i| (i * 7 % 256) as u8).collect();
	fs.write("/f", 0, &data).unwrap();
	assert_eq!(fs.read("/f", 0, data.len() as u32).unwrap(), data);
}

#[test]
fn p6_directory_listing_matches_live_children() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	fs.mkdir("/d", 0o755).unwrap();
	for name in ["a", "b", "c"] {
		fs.mknod(&format!("/d/{name}"), 0o644).unwrap();
	}
	fs.unlink("/d/b").unwrap();

	let names: HashSet<_> = collect_names(&mut fs, "/d").into_iter().collect();
	let expected: HashSet<_> = ["a", "c"].iter().map(|s| s.to_string()).collect();
	assert_eq!(names, expected);
}

#[test]
fn p7_compaction_preserves_semantics_and_shrinks() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	fs.mkdir("/d", 0o755).unwrap();
	for i in 0..30 {
		fs.mknod(&format!("/d/f{i}"), 0o644).unwrap();
		fs.write(&format!("/d/f{i}"), 0, format!("payload-{i}").as_bytes())
			.unwrap();
	}
	for i in 0..15 {
		fs.unlink(&format!("/d/f{i}")).unwrap();
	}

	let mut before = HashMap::new();
	for i in 15..30 {
		let path = format!("/d/f{i}");
		before.insert(path.clone(), fs.read(&path, 0, 64).unwrap());
	}
	let before_names = collect_names(&mut fs, "/d");

	let mut store = fs.into_store();
	let head_before = store.head();
	wfs_core::compactor::compact(&mut store).unwrap();
	assert!(store.head() <= head_before);

	let mut fs = Filesystem::new(store);
	for (path, data) in &before {
		assert_eq!(&fs.read(path, 0, 64).unwrap(), data);
	}
	assert_eq!(collect_names(&mut fs, "/d"), before_names);
}

#[test]
fn p8_allocated_inodes_are_positive_and_never_collide_with_live_ones() {
	let (mut fs, _file) = fresh_fs(IMAGE_SIZE);
	let mut seen = HashSet::new();
	for i in 0..50 {
		let name = format!("/f{i}");
		fs.mknod(&name, 0o644).unwrap();
		let n = fs.getattr(&name).unwrap().inode_number;
		assert!(n >= 1);
		assert!(seen.insert(n), "inode number {n} reused without a prior unlink");
	}
}

#[test]
fn remount_sees_prior_state() {
	let (mut fs, file) = fresh_fs(IMAGE_SIZE);
	fs.mkdir("/d", 0o755).unwrap();
	fs.mknod("/d/f", 0o644).unwrap();
	fs.write("/d/f", 0, b"persisted").unwrap();
	drop(fs);

	let mut fs = reopen_fs(&file);
	assert_eq!(fs.read("/d/f", 0, 9).unwrap(), b"persisted");
}

/// A tiny xorshift64 generator, used only to drive a deterministic
/// pseudo-random operation stream in `p3_last_write_wins_under_a_pseudo_random_stream`.
struct Xorshift64 {
	state: u64,
}

impl Xorshift64 {
	fn new(seed: u64) -> Self {
		Self {
			state: if seed == 0 { 0xdead_beef } else { seed },
		}
	}

	fn next(&mut self) -> u64 {
		let mut x = self.state;
		x ^= x << 13;
		x ^= x >> 7;
		x ^= x << 17;
		self.state = x;
		x
	}
}
