//! Filesystem operations: getattr, readdir, read, write, mknod, mkdir,
//! unlink. Each is a small sequence of [`Resolver`]/[`LogStore`] calls, as
//! described by the core's component design.

use crate::error::{Error, Result};
use crate::format::{DirEntry, Inode, LogEntry, S_IFDIR, S_IFMT, S_IFREG};
use crate::log_store::LogStore;
use crate::resolver::{split_components, split_parent, Resolver};
use std::cmp::{max, min};

/// Attributes returned by [`Filesystem::getattr`].
#[derive(Debug, Clone, Copy)]
pub struct Stat {
	pub inode_number: u64,
	pub mode: u32,
	pub nlink: u32,
	pub uid: u32,
	pub gid: u32,
	pub size: u64,
	pub atime: u32,
	pub mtime: u32,
	pub ctime: u32,
}

impl Stat {
	fn from_entry(entry: &LogEntry) -> Self {
		Self {
			inode_number: entry.inode.inode_number,
			mode: entry.inode.mode,
			nlink: entry.inode.links,
			uid: entry.inode.uid,
			gid: entry.inode.gid,
			size: entry.inode.size as u64,
			atime: entry.inode.atime,
			mtime: entry.inode.mtime,
			ctime: entry.inode.ctime,
		}
	}
}

/// The filesystem operations exposed to a host gateway, all addressed by
/// absolute path.
pub struct Filesystem {
	store: LogStore,
}

impl Filesystem {
	pub fn new(store: LogStore) -> Self {
		Self { store }
	}

	/// Gives back the underlying log store, e.g. to hand it to the
	/// compactor once unmounted.
	pub fn into_store(self) -> LogStore {
		self.store
	}

	fn resolver(&mut self) -> Resolver<'_> {
		Resolver::new(&mut self.store)
	}

	pub fn getattr(&mut self, path: &str) -> Result<Stat> {
		let inode_number = self.resolver().resolve_path(path)?;
		let entry = self.resolver().latest_entry_for(inode_number)?;
		log::debug!("getattr({path}) -> inode {inode_number}");
		Ok(Stat::from_entry(&entry))
	}

	/// Streams the basenames of `path`'s live children to `sink`, stopping
	/// early if `sink` returns `false`.
	pub fn readdir<F: FnMut(&str) -> bool>(&mut self, path: &str, mut sink: F) -> Result<()> {
		let inode_number = self.resolver().resolve_path(path)?;
		let entry = self.resolver().latest_entry_for(inode_number)?;
		if !entry.inode.is_dir() {
			return Err(Error::NotADirectory);
		}
		for d in DirEntry::parse_payload(&entry.payload) {
			if !sink(&d.name) {
				break;
			}
		}
		log::debug!("readdir({path})");
		Ok(())
	}

	pub fn read(&mut self, path: &str, offset: u64, size: u32) -> Result<Vec<u8>> {
		let inode_number = self.resolver().resolve_path(path)?;
		let entry = self.resolver().latest_entry_for(inode_number)?;
		if !entry.inode.is_reg() {
			return Err(Error::IsADirectory);
		}
		let len = entry.payload.len() as u64;
		if offset >= len {
			return Ok(Vec::new());
		}
		let end = min(offset + size as u64, len);
		log::debug!("read({path}, {offset}, {size}) -> {} bytes", end - offset);
		Ok(entry.payload[offset as usize..end as usize].to_vec())
	}

	pub fn write(&mut self, path: &str, offset: u64, bytes: &[u8]) -> Result<u32> {
		let inode_number = self.resolver().resolve_path(path)?;
		let entry = self.resolver().latest_entry_for(inode_number)?;
		if !entry.inode.is_reg() {
			return Err(Error::IsADirectory);
		}

		let old_len = entry.payload.len() as u64;
		let new_len = max(old_len, offset + bytes.len() as u64);
		let mut payload = entry.payload;
		payload.resize(new_len as usize, 0);
		payload[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);

		let mut inode = entry.inode;
		inode.size = payload.len() as u32;
		inode.mtime = crate::util::now();
		inode.deleted = false;

		self.store.append_entry(&LogEntry { inode, payload })?;
		log::debug!("write({path}, {offset}, {} bytes)", bytes.len());
		Ok(bytes.len() as u32)
	}

	/// Creates a regular file.
	pub fn mknod(&mut self, path: &str, mode: u32) -> Result<()> {
		self.create(path, (mode & !S_IFMT) | S_IFREG)
	}

	/// Creates a directory.
	pub fn mkdir(&mut self, path: &str, mode: u32) -> Result<()> {
		self.create(path, (mode & !S_IFMT) | S_IFDIR)
	}

	fn create(&mut self, path: &str, mode: u32) -> Result<()> {
		if self.resolver().resolve_path(path).is_ok() {
			return Err(Error::Exists);
		}
		let (parent_path, basename) = split_parent(path).ok_or(Error::NotFound)?;
		if basename.is_empty() {
			return Err(Error::NotFound);
		}

		let parent_inode_number = self.resolver().resolve_path(&parent_path)?;
		let parent_entry = self.resolver().latest_entry_for(parent_inode_number)?;
		if !parent_entry.inode.is_dir() {
			return Err(Error::NotADirectory);
		}

		let new_inode_number = self.allocate_inode()?;
		let new_dentry = DirEntry::new(basename, new_inode_number)?;

		let uid = parent_entry.inode.uid;
		let gid = parent_entry.inode.gid;
		let child = Inode::new(new_inode_number, mode, uid, gid, 1);
		self.store.append_entry(&LogEntry {
			inode: child,
			payload: Vec::new(),
		})?;

		let mut dentries = DirEntry::parse_payload(&parent_entry.payload);
		dentries.push(new_dentry);
		let mut parent_inode = parent_entry.inode;
		parent_inode.mtime = crate::util::now();
		let payload = DirEntry::encode_payload(&dentries);
		parent_inode.size = payload.len() as u32;
		self.store.append_entry(&LogEntry {
			inode: parent_inode,
			payload,
		})?;

		log::debug!("create({path}) -> inode {new_inode_number}");
		Ok(())
	}

	pub fn unlink(&mut self, path: &str) -> Result<()> {
		let inode_number = self.resolver().resolve_path(path)?;
		let entry = self.resolver().latest_entry_for(inode_number)?;
		if entry.inode.is_dir() {
			return Err(Error::IsADirectory);
		}

		let (parent_path, basename) = split_parent(path).ok_or(Error::NotFound)?;
		let parent_inode_number = self.resolver().resolve_path(&parent_path)?;
		let parent_entry = self.resolver().latest_entry_for(parent_inode_number)?;

		let mut tombstone = entry.inode;
		tombstone.deleted = true;
		tombstone.size = 0;
		self.store.append_entry(&LogEntry {
			inode: tombstone,
			payload: Vec::new(),
		})?;

		let survivors: Vec<DirEntry> = DirEntry::parse_payload(&parent_entry.payload)
			.into_iter()
			.filter(|d| d.name != basename)
			.collect();
		let mut parent_inode = parent_entry.inode;
		parent_inode.mtime = crate::util::now();
		let payload = DirEntry::encode_payload(&survivors);
		parent_inode.size = payload.len() as u32;
		self.store.append_entry(&LogEntry {
			inode: parent_inode,
			payload,
		})?;

		log::debug!("unlink({path})");
		Ok(())
	}

	/// Picks the smallest strictly positive integer not currently live.
	fn allocate_inode(&mut self) -> Result<u64> {
		let mut n: u64 = 1;
		loop {
			match self.resolver().latest_entry_for(n) {
				Err(Error::NotFound) => return Ok(n),
				Ok(_) => n += 1,
				Err(e) => return Err(e),
			}
		}
	}
}

/// Used internally by path splitting to check for an empty leading
/// component; also exposed so gateways can reuse the same tokenizer.
pub fn path_components(path: &str) -> impl Iterator<Item = &str> {
	split_components(path)
}
