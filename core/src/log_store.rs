//! Typed access to the log region: parsing records, iterating the log from
//! its start, and appending new records.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::format::{Inode, LogEntry, Superblock, ROOT_INODE, SB_SIZE, SIZEOF_INODE, S_IFDIR, WFS_MAGIC};
use std::collections::HashMap;

/// Owns the device and the superblock cache, and serves typed access to the
/// log region built on top of it.
///
/// `LogStore` also maintains an in-memory `inode_number -> offset` index as
/// a performance optimization (see DESIGN.md). The index is rebuilt by a
/// single forward scan at [`LogStore::open`] time and kept up to date
/// incrementally on [`LogStore::append_entry`]; nothing in this module's
/// public behavior depends on the index being present, since every lookup
/// that uses it would give the same answer via [`LogStore::iter_from_start`].
#[derive(Debug)]
pub struct LogStore {
	device: Device,
	superblock: Superblock,
	/// inode_number -> offset of its latest log entry (live or deleted).
	index: HashMap<u64, u64>,
}

impl LogStore {
	/// Opens an existing, already-formatted image.
	pub fn open(mut device: Device) -> Result<Self> {
		let sb_bytes = device.read_at(0, SB_SIZE as usize)?;
		let superblock = Superblock::from_bytes(&sb_bytes);
		if superblock.magic != WFS_MAGIC {
			return Err(Error::BadMagic);
		}
		if device.size()? < superblock.head {
			return Err(Error::Truncated);
		}

		let mut store = Self {
			device,
			superblock,
			index: HashMap::new(),
		};
		store.rebuild_index()?;
		Ok(store)
	}

	/// Initializes a fresh image: writes the superblock and the root
	/// directory's first entry.
	pub fn format(mut device: Device) -> Result<()> {
		let head = SB_SIZE + SIZEOF_INODE;
		let root = Inode::new(ROOT_INODE, S_IFDIR | 0o755, 0, 0, 1);
		let root_entry = LogEntry {
			inode: root,
			payload: Vec::new(),
		};
		device.write_at(SB_SIZE, &root_entry.to_bytes())?;

		let sb = Superblock {
			magic: WFS_MAGIC,
			head,
		};
		device.write_at(0, &sb.to_bytes())?;
		device.flush()?;
		Ok(())
	}

	fn rebuild_index(&mut self) -> Result<()> {
		self.index.clear();
		let mut off = SB_SIZE;
		while off < self.superblock.head {
			let entry = self.read_entry_at(off)?;
			let size = entry.disk_size();
			self.index.insert(entry.inode.inode_number, off);
			off += size;
		}
		Ok(())
	}

	/// Reads the log entry starting at `off`.
	pub fn read_entry_at(&mut self, off: u64) -> Result<LogEntry> {
		if off < SB_SIZE || off >= self.superblock.head {
			return Err(Error::OutOfRange);
		}
		let inode_bytes = self.device.read_at(off, SIZEOF_INODE as usize)?;
		let inode = Inode::from_bytes(&inode_bytes);
		let entry_end = off + SIZEOF_INODE + inode.size as u64;
		if entry_end > self.superblock.head {
			return Err(Error::Truncated);
		}
		let payload = self.device.read_at(off + SIZEOF_INODE, inode.size as usize)?;
		Ok(LogEntry { inode, payload })
	}

	/// Appends a new log entry at the current head, advancing and
	/// persisting it.
	pub fn append_entry(&mut self, entry: &LogEntry) -> Result<u64> {
		let off = self.superblock.head;
		let size = entry.disk_size();
		if off + size > self.device.size()? {
			return Err(Error::NoSpace);
		}

		self.device.write_at(off, &entry.to_bytes())?;

		let new_sb = Superblock {
			magic: self.superblock.magic,
			head: off + size,
		};
		self.device.write_at(0, &new_sb.to_bytes())?;
		self.device.flush()?;

		self.superblock = new_sb;
		self.index.insert(entry.inode.inode_number, off);
		Ok(off)
	}

	/// The current head offset.
	pub fn head(&self) -> u64 {
		self.superblock.head
	}

	/// The cached superblock's magic number.
	pub fn magic(&self) -> u32 {
		self.superblock.magic
	}

	/// Total image size in bytes.
	pub fn image_size(&mut self) -> Result<u64> {
		self.device.size()
	}

	/// The offset of the latest entry on record for `inode_number`, if any.
	pub(crate) fn indexed_offset(&self, inode_number: u64) -> Option<u64> {
		self.index.get(&inode_number).copied()
	}

	/// Reads `len` raw bytes at `off`, bypassing entry framing. Used by the
	/// compactor to copy whole entries verbatim.
	pub(crate) fn raw_entry_bytes(&mut self, off: u64, len: u64) -> Result<Vec<u8>> {
		self.device.read_at(off, len as usize)
	}

	/// Writes raw bytes directly to the device. Used by the compactor's
	/// sequential in-place rewrite.
	pub(crate) fn write_raw(&mut self, off: u64, buf: &[u8]) -> Result<()> {
		self.device.write_at(off, buf)
	}

	/// Persists a new head without appending an entry, then rebuilds the
	/// index against the rewritten log. Used only by the compactor, which
	/// does not grow the log through [`LogStore::append_entry`].
	pub(crate) fn set_head(&mut self, head: u64) -> Result<()> {
		let sb = Superblock {
			magic: self.superblock.magic,
			head,
		};
		self.device.write_at(0, &sb.to_bytes())?;
		self.device.flush()?;
		self.superblock = sb;
		self.rebuild_index()?;
		Ok(())
	}

	/// Iterates log entries in ascending offset order, starting right after
	/// the superblock and stopping exactly at `head`.
	pub fn iter_from_start(&mut self) -> LogEntryIter<'_> {
		LogEntryIter {
			store: self,
			off: SB_SIZE,
		}
	}
}

/// Restartable forward iterator over the log, yielding `(offset, entry)`
/// pairs. Never reads past the store's `head`.
pub struct LogEntryIter<'a> {
	store: &'a mut LogStore,
	off: u64,
}

impl<'a> Iterator for LogEntryIter<'a> {
	type Item = Result<(u64, LogEntry)>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.off >= self.store.superblock.head {
			return None;
		}
		let off = self.off;
		match self.store.read_entry_at(off) {
			Ok(entry) => {
				self.off = off + entry.disk_size();
				Some(Ok((off, entry)))
			}
			Err(e) => {
				// Advance past `head` so the iterator terminates instead of
				// looping on the same broken offset.
				self.off = self.store.superblock.head;
				Some(Err(e))
			}
		}
	}
}
