//! Resolves inode numbers and paths to their current log entry by a forward
//! scan of the log (transparently accelerated by the log store's index; see
//! DESIGN.md for why correctness never depends on the index being present).

use crate::error::{Error, Result};
use crate::format::{DirEntry, LogEntry, ROOT_INODE};
use crate::log_store::LogStore;

/// Answers "what is the current log entry for inode N?" and "what inode
/// number does this path name?".
pub struct Resolver<'a> {
	store: &'a mut LogStore,
}

impl<'a> Resolver<'a> {
	pub fn new(store: &'a mut LogStore) -> Self {
		Self { store }
	}

	/// Returns the latest live entry for `inode_number`, or `NotFound` if
	/// none exists or the latest one is deleted.
	///
	/// Uses the log store's index as a shortcut to the entry's offset, then
	/// reads that single entry; this gives the same answer as
	/// [`Resolver::scan_latest_entry_for`] because the index is always kept
	/// in sync with the last append for its inode number.
	pub fn latest_entry_for(&mut self, inode_number: u64) -> Result<LogEntry> {
		log::trace!("resolver: latest_entry_for({inode_number})");
		let Some(off) = self.store.indexed_offset(inode_number) else {
			return Err(Error::NotFound);
		};
		let entry = self.store.read_entry_at(off)?;
		if entry.inode.deleted {
			return Err(Error::NotFound);
		}
		Ok(entry)
	}

	/// The canonical algorithm: a full forward scan of the log, used by
	/// tests to confirm the indexed shortcut never disagrees with it.
	pub fn scan_latest_entry_for(&mut self, inode_number: u64) -> Result<LogEntry> {
		let mut found: Option<LogEntry> = None;
		for item in self.store.iter_from_start() {
			let (_, entry) = item?;
			if entry.inode.inode_number == inode_number {
				found = Some(entry);
			}
		}
		match found {
			Some(entry) if !entry.inode.deleted => Ok(entry),
			_ => Err(Error::NotFound),
		}
	}

	/// Resolves an absolute path to its current inode number.
	pub fn resolve_path(&mut self, path: &str) -> Result<u64> {
		log::trace!("resolver: resolve_path({path})");
		if path == "/" {
			return Ok(ROOT_INODE);
		}

		let mut cur = ROOT_INODE;
		for name in split_components(path) {
			let entry = self.latest_entry_for(cur)?;
			if !entry.inode.is_dir() {
				return Err(Error::NotADirectory);
			}
			let dentries = DirEntry::parse_payload(&entry.payload);
			let matched = dentries.iter().find(|d| d.name == name);
			match matched {
				Some(d) => cur = d.inode_number,
				None => return Err(Error::NotFound),
			}
		}
		Ok(cur)
	}
}

/// Splits `path` into its non-empty components, without mutating or taking
/// ownership of the input.
pub fn split_components(path: &str) -> impl Iterator<Item = &str> {
	path.split('/').filter(|c| !c.is_empty())
}

/// Splits `path` into its parent path and basename.
///
/// `/d/f` -> `("/d", "f")`; `/f` -> `("/", "f")`.
pub fn split_parent(path: &str) -> Option<(String, &str)> {
	let trimmed = path.strip_prefix('/')?;
	let idx = trimmed.rfind('/');
	match idx {
		Some(i) => {
			let parent = &trimmed[..i];
			let base = &trimmed[i + 1..];
			Some((format!("/{parent}"), base))
		}
		None => Some(("/".to_owned(), trimmed)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::Device;
	use crate::format::{Inode, S_IFDIR, S_IFREG};
	use tempfile::tempfile;

	fn fresh_store(len: u64) -> LogStore {
		let file = tempfile().unwrap();
		file.set_len(len).unwrap();
		let for_format = file.try_clone().unwrap();
		LogStore::format(Device::new(for_format)).unwrap();
		LogStore::open(Device::new(file)).unwrap()
	}

	#[test]
	fn split_components_ignores_empty_segments() {
		let got: Vec<_> = split_components("/a/b/c").collect();
		assert_eq!(got, vec!["a", "b", "c"]);
		let got: Vec<_> = split_components("/").collect();
		assert!(got.is_empty());
	}

	#[test]
	fn split_parent_handles_top_level_and_nested() {
		assert_eq!(split_parent("/f"), Some(("/".to_owned(), "f")));
		assert_eq!(split_parent("/d/f"), Some(("/d".to_owned(), "f")));
		assert_eq!(split_parent("/a/b/c"), Some(("/a/b".to_owned(), "c")));
	}

	#[test]
	fn resolve_root_is_inode_zero() {
		let mut store = fresh_store(64 * 1024);
		let mut r = Resolver::new(&mut store);
		assert_eq!(r.resolve_path("/").unwrap(), ROOT_INODE);
	}

	#[test]
	fn resolve_missing_path_is_not_found() {
		let mut store = fresh_store(64 * 1024);
		let mut r = Resolver::new(&mut store);
		assert!(matches!(r.resolve_path("/missing"), Err(Error::NotFound)));
	}

	#[test]
	fn resolve_through_non_directory_fails() {
		let mut store = fresh_store(64 * 1024);
		let file_inode = Inode::new(1, S_IFREG | 0o644, 0, 0, 1);
		store
			.append_entry(&LogEntry {
				inode: file_inode,
				payload: Vec::new(),
			})
			.unwrap();
		let root_entry = LogEntry {
			inode: Inode::new(ROOT_INODE, S_IFDIR | 0o755, 0, 0, 1),
			payload: DirEntry::encode_payload(&[DirEntry::new("f", 1).unwrap()]),
		};
		store.append_entry(&root_entry).unwrap();

		let mut r = Resolver::new(&mut store);
		assert!(matches!(
			r.resolve_path("/f/x"),
			Err(Error::NotADirectory)
		));
	}

	#[test]
	fn indexed_and_scanned_latest_entry_agree() {
		let mut store = fresh_store(64 * 1024);
		for i in 1..=5u64 {
			let inode = Inode::new(i, S_IFREG | 0o644, 0, 0, 1);
			store
				.append_entry(&LogEntry {
					inode,
					payload: vec![i as u8],
				})
				.unwrap();
		}
		// Supersede inode 3 with a new entry.
		let inode = Inode::new(3, S_IFREG | 0o644, 0, 0, 1);
		store
			.append_entry(&LogEntry {
				inode,
				payload: vec![99],
			})
			.unwrap();

		let mut r = Resolver::new(&mut store);
		for i in 1..=5u64 {
			let indexed = r.latest_entry_for(i).unwrap();
			let scanned = r.scan_latest_entry_for(i).unwrap();
			assert_eq!(indexed.payload, scanned.payload);
		}
	}
}
