//! The on-disk wire structures: superblock, inode, directory entry, and the
//! owned, in-memory log entry built from them.
//!
//! Serialization uses a `#[repr(C)]` struct reinterpreted as a byte slice via
//! [`crate::util::as_bytes`]/[`crate::util::from_bytes`], rather than a
//! general-purpose serialization crate. The image never needs more than
//! fixed-width little-endian records, so nothing more is pulled in.

use crate::error::{Error, Result};
use crate::util::{as_bytes, from_bytes, now};

/// The superblock's magic number.
pub const WFS_MAGIC: u32 = 0x5746_5331; // "WFS1"

/// Size in bytes of the reserved superblock region at the start of the
/// image.
pub const SB_SIZE: u64 = 512;

/// Size in bytes of one on-disk inode record.
pub const SIZEOF_INODE: u64 = 64;

/// Maximum length of a directory entry's name, including the NUL
/// terminator.
pub const MAX_FILE_NAME_LEN: usize = 32;

/// Size in bytes of one on-disk directory entry.
pub const DENTRY_SIZE: u64 = 40;

/// Inode number reserved for the root directory.
pub const ROOT_INODE: u64 = 0;

/// Type bitmask within `mode`.
pub const S_IFMT: u32 = 0xF000;
/// Regular file type bit.
pub const S_IFREG: u32 = 0x8000;
/// Directory type bit.
pub const S_IFDIR: u32 = 0x4000;

/// Raw on-disk superblock layout.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawSuperblock {
	magic: u32,
	_pad0: u32,
	head: u64,
	_pad1: [u8; SB_SIZE as usize - 16],
}

/// The superblock: the image's single source of truth for where the log
/// ends.
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
	pub magic: u32,
	pub head: u64,
}

impl Superblock {
	pub(crate) fn to_bytes(self) -> Vec<u8> {
		let raw = RawSuperblock {
			magic: self.magic,
			_pad0: 0,
			head: self.head,
			_pad1: [0; SB_SIZE as usize - 16],
		};
		unsafe { as_bytes(&raw) }.to_vec()
	}

	pub(crate) fn from_bytes(buf: &[u8]) -> Self {
		let raw: RawSuperblock = unsafe { from_bytes(buf) };
		Self {
			magic: raw.magic,
			head: raw.head,
		}
	}
}

/// Raw on-disk inode layout. Field order matches the wire format; widths
/// follow the widened, uniform `u64` choice for `inode_number` (see
/// DESIGN.md).
#[repr(C)]
#[derive(Clone, Copy)]
struct RawInode {
	inode_number: u64,
	deleted: u32,
	mode: u32,
	uid: u32,
	gid: u32,
	flags: u32,
	size: u32,
	atime: u32,
	mtime: u32,
	ctime: u32,
	links: u32,
	_pad: [u8; SIZEOF_INODE as usize - 48],
}

/// An inode: the metadata prefix of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
	pub inode_number: u64,
	pub mode: u32,
	pub uid: u32,
	pub gid: u32,
	pub flags: u32,
	pub size: u32,
	pub atime: u32,
	pub mtime: u32,
	pub ctime: u32,
	pub links: u32,
	pub deleted: bool,
}

impl Inode {
	/// Builds a fresh, live inode with the current timestamp in every time
	/// field.
	pub fn new(inode_number: u64, mode: u32, uid: u32, gid: u32, links: u32) -> Self {
		let t = now();
		Self {
			inode_number,
			mode,
			uid,
			gid,
			flags: 0,
			size: 0,
			atime: t,
			mtime: t,
			ctime: t,
			links,
			deleted: false,
		}
	}

	pub fn is_dir(&self) -> bool {
		self.mode & S_IFMT == S_IFDIR
	}

	pub fn is_reg(&self) -> bool {
		self.mode & S_IFMT == S_IFREG
	}

	pub(crate) fn to_bytes(self) -> Vec<u8> {
		let raw = RawInode {
			inode_number: self.inode_number,
			deleted: self.deleted as u32,
			mode: self.mode,
			uid: self.uid,
			gid: self.gid,
			flags: self.flags,
			size: self.size,
			atime: self.atime,
			mtime: self.mtime,
			ctime: self.ctime,
			links: self.links,
			_pad: [0; SIZEOF_INODE as usize - 48],
		};
		unsafe { as_bytes(&raw) }.to_vec()
	}

	pub(crate) fn from_bytes(buf: &[u8]) -> Self {
		let raw: RawInode = unsafe { from_bytes(buf) };
		Self {
			inode_number: raw.inode_number,
			mode: raw.mode,
			uid: raw.uid,
			gid: raw.gid,
			flags: raw.flags,
			size: raw.size,
			atime: raw.atime,
			mtime: raw.mtime,
			ctime: raw.ctime,
			links: raw.links,
			deleted: raw.deleted != 0,
		}
	}
}

/// Raw on-disk directory entry layout.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawDirEntry {
	name: [u8; MAX_FILE_NAME_LEN],
	inode_number: u64,
}

/// A directory entry: maps a child name to its inode number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
	pub name: String,
	pub inode_number: u64,
}

impl DirEntry {
	/// Builds a directory entry, failing with `NameTooLong` if `name` does
	/// not fit (with its NUL terminator) in `MAX_FILE_NAME_LEN` bytes.
	pub fn new(name: &str, inode_number: u64) -> Result<Self> {
		if name.len() >= MAX_FILE_NAME_LEN {
			return Err(Error::NameTooLong);
		}
		Ok(Self {
			name: name.to_owned(),
			inode_number,
		})
	}

	pub(crate) fn to_bytes(&self) -> Vec<u8> {
		let mut name = [0u8; MAX_FILE_NAME_LEN];
		let bytes = self.name.as_bytes();
		name[..bytes.len()].copy_from_slice(bytes);
		let raw = RawDirEntry {
			name,
			inode_number: self.inode_number,
		};
		unsafe { as_bytes(&raw) }.to_vec()
	}

	pub(crate) fn from_bytes(buf: &[u8]) -> Self {
		let raw: RawDirEntry = unsafe { from_bytes(buf) };
		let nul = raw.name.iter().position(|&b| b == 0).unwrap_or(raw.name.len());
		let name = String::from_utf8_lossy(&raw.name[..nul]).into_owned();
		Self {
			name,
			inode_number: raw.inode_number,
		}
	}

	/// Parses a directory payload into its dense array of entries.
	pub fn parse_payload(payload: &[u8]) -> Vec<DirEntry> {
		payload
			.chunks_exact(DENTRY_SIZE as usize)
			.map(DirEntry::from_bytes)
			.collect()
	}

	/// Serializes a dense array of entries back into a directory payload.
	pub fn encode_payload(entries: &[DirEntry]) -> Vec<u8> {
		let mut buf = Vec::with_capacity(entries.len() * DENTRY_SIZE as usize);
		for e in entries {
			buf.extend_from_slice(&e.to_bytes());
		}
		buf
	}
}

/// One complete log entry: an inode plus its payload bytes.
#[derive(Debug, Clone)]
pub struct LogEntry {
	pub inode: Inode,
	pub payload: Vec<u8>,
}

impl LogEntry {
	/// Total on-disk size of this entry, inode plus payload.
	pub fn disk_size(&self) -> u64 {
		SIZEOF_INODE + self.payload.len() as u64
	}

	pub(crate) fn to_bytes(&self) -> Vec<u8> {
		let mut buf = self.inode.to_bytes();
		buf.extend_from_slice(&self.payload);
		buf
	}
}
