//! Fixed-offset, synchronous byte-addressable access to the backing image.

use crate::error::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// A single-threaded handle on the image file.
///
/// `Device` owns the file descriptor for the lifetime of the mount and
/// performs only positioned reads and writes; it keeps no buffering of its
/// own beyond whatever the OS page cache does.
#[derive(Debug)]
pub struct Device {
	file: File,
}

impl Device {
	/// Wraps an already-opened file.
	pub fn new(file: File) -> Self {
		Self { file }
	}

	/// Reads exactly `len` bytes starting at `offset`.
	pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
		let mut buf = vec![0u8; len];
		self.file.seek(SeekFrom::Start(offset))?;
		self.file.read_exact(&mut buf)?;
		Ok(buf)
	}

	/// Writes `buf` starting at `offset`.
	pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
		self.file.seek(SeekFrom::Start(offset))?;
		self.file.write_all(buf)?;
		Ok(())
	}

	/// Flushes any buffered writes to the underlying storage.
	pub fn flush(&mut self) -> Result<()> {
		self.file.flush()?;
		self.file.sync_data()?;
		Ok(())
	}

	/// Returns the total size of the image in bytes.
	pub fn size(&self) -> Result<u64> {
		Ok(self.file.metadata()?.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempfile;

	fn dev_of_size(len: u64) -> Device {
		let file = tempfile().unwrap();
		file.set_len(len).unwrap();
		Device::new(file)
	}

	#[test]
	fn write_then_read_round_trips() {
		let mut dev = dev_of_size(64);
		dev.write_at(8, b"hello").unwrap();
		let back = dev.read_at(8, 5).unwrap();
		assert_eq!(&back, b"hello");
	}

	#[test]
	fn read_past_end_fails() {
		let mut dev = dev_of_size(4);
		assert!(dev.read_at(0, 16).is_err());
	}

	#[test]
	fn size_reports_file_length() {
		let dev = dev_of_size(128);
		assert_eq!(dev.size().unwrap(), 128);
	}
}
