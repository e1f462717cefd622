//! The offline compaction pass: reclaims space occupied by superseded or
//! deleted log entries by rewriting the log to hold only the latest live
//! entry per inode.
//!
//! Must only be run on an unmounted image (see the concurrency model in
//! SPEC_FULL.md: the compactor and a mount session never run together).

use crate::error::Result;
use crate::format::SB_SIZE;
use crate::log_store::LogStore;

/// Summary of a compaction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactReport {
	pub entries_kept: usize,
	pub bytes_reclaimed: u64,
}

/// Compacts `store` in place, keeping only the latest live entry per inode.
pub fn compact(store: &mut LogStore) -> Result<CompactReport> {
	let head_before = store.head();

	// Walk the log once to find, for each inode number, the offset of its
	// latest entry (live or not — deleted tombstones are simply dropped
	// below since they never make it into `keep`).
	let mut latest_offset: std::collections::HashMap<u64, u64> = std::collections::HashMap::new();
	for item in store.iter_from_start() {
		let (off, entry) = item?;
		latest_offset.insert(entry.inode.inode_number, off);
	}

	let mut keep: Vec<u64> = Vec::new();
	for (_, off) in latest_offset {
		let entry = store.read_entry_at(off)?;
		if !entry.inode.deleted {
			keep.push(off);
		}
	}
	keep.sort_unstable();

	let mut cursor = SB_SIZE;
	for off in &keep {
		let entry = store.read_entry_at(*off)?;
		let raw = store.raw_entry_bytes(*off, entry.disk_size())?;
		if cursor != *off {
			store.write_raw(cursor, &raw)?;
		}
		cursor += entry.disk_size();
	}

	store.set_head(cursor)?;

	Ok(CompactReport {
		entries_kept: keep.len(),
		bytes_reclaimed: head_before - cursor,
	})
}
