//! Adapts the path-based core filesystem to `fuser`'s inode-numbered
//! callback API.
//!
//! `fuser`'s lowlevel operations address everything by a kernel-assigned
//! `ino`, but [`wfs_core::Filesystem`] only understands absolute paths. This
//! module bridges the two with [`InodeTable`], a small `ino -> PathBuf` map
//! seeded with the root at mount time and grown as the kernel discovers new
//! names through `lookup`/`readdir`. `fuse_ino` is always `wfs_inode_number +
//! 1`: FUSE reserves ino `0` and WFS reserves inode number `0` for the root,
//! so the table exists only to go back from a bare `ino` to a path, never to
//! invent identity of its own.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fuser::{
	FileAttr, FileType, Filesystem as FuseFilesystem, KernelConfig, ReplyAttr, ReplyData,
	ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request,
};
use wfs_core::format::S_IFDIR;
use wfs_core::{Filesystem, Stat};

/// Attribute cache lifetime handed back to the kernel. The image can only
/// change through this same mount, so a short, fixed TTL is enough.
const ATTR_TTL: Duration = Duration::from_secs(1);

fn path_to_str(name: &OsStr) -> Option<&str> {
	name.to_str()
}

fn join(parent: &Path, name: &str) -> String {
	if parent == Path::new("/") {
		format!("/{name}")
	} else {
		format!("{}/{name}", parent.display())
	}
}

/// Maps kernel-visible inode numbers to the WFS paths they currently name.
struct InodeTable {
	paths: HashMap<u64, PathBuf>,
}

impl InodeTable {
	fn new() -> Self {
		let mut paths = HashMap::new();
		paths.insert(fuser::FUSE_ROOT_ID, PathBuf::from("/"));
		Self { paths }
	}

	fn path_of(&self, ino: u64) -> Option<&Path> {
		self.paths.get(&ino).map(PathBuf::as_path)
	}

	/// Records `path` as belonging to `wfs_inode_number`, returning the
	/// `ino` the kernel should use to refer to it from now on.
	fn remember(&mut self, wfs_inode_number: u64, path: PathBuf) -> u64 {
		let ino = wfs_inode_number + 1;
		self.paths.insert(ino, path);
		ino
	}
}

fn to_file_attr(stat: &Stat, ino: u64) -> FileAttr {
	let kind = if stat.mode & wfs_core::format::S_IFMT == S_IFDIR {
		FileType::Directory
	} else {
		FileType::RegularFile
	};
	let time_of = |secs: u32| SystemTime::UNIX_EPOCH + Duration::from_secs(secs as u64);
	FileAttr {
		ino,
		size: stat.size,
		blocks: stat.size.div_ceil(512),
		atime: time_of(stat.atime),
		mtime: time_of(stat.mtime),
		ctime: time_of(stat.ctime),
		crtime: time_of(stat.ctime),
		kind,
		perm: (stat.mode & 0o7777) as u16,
		nlink: stat.nlink,
		uid: stat.uid,
		gid: stat.gid,
		rdev: 0,
		blksize: 512,
		flags: 0,
	}
}

/// The `fuser::Filesystem` adapter around a [`wfs_core::Filesystem`].
pub struct WfsFuse {
	fs: Filesystem,
	inodes: InodeTable,
}

impl WfsFuse {
	pub fn new(fs: Filesystem) -> Self {
		Self {
			fs,
			inodes: InodeTable::new(),
		}
	}

	fn stat(&mut self, path: &str) -> wfs_core::Result<(Stat, u64)> {
		let stat = self.fs.getattr(path)?;
		Ok((stat, stat.inode_number + 1))
	}
}

impl FuseFilesystem for WfsFuse {
	fn init(
		&mut self,
		_req: &Request<'_>,
		_config: &mut KernelConfig,
	) -> Result<(), std::ffi::c_int> {
		log::debug!("gateway: mounted");
		Ok(())
	}

	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		let Some(parent_path) = self.inodes.path_of(parent).map(Path::to_path_buf) else {
			reply.error(libc::EINVAL);
			return;
		};
		let Some(name) = path_to_str(name) else {
			reply.error(libc::EINVAL);
			return;
		};
		let path = join(&parent_path, name);

		match self.stat(&path) {
			Ok((stat, ino)) => {
				self.inodes.remember(stat.inode_number, PathBuf::from(path));
				reply.entry(&ATTR_TTL, &to_file_attr(&stat, ino), 0);
			}
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
		let Some(path) = self.inodes.path_of(ino).map(Path::to_path_buf) else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.stat(&path.to_string_lossy()) {
			Ok((stat, _)) => reply.attr(&ATTR_TTL, &to_file_attr(&stat, ino)),
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
		let Some(dir_path) = self.inodes.path_of(ino).map(Path::to_path_buf) else {
			reply.error(libc::EINVAL);
			return;
		};

		let mut entries: Vec<(u64, FileType, String)> = vec![
			(ino, FileType::Directory, ".".to_owned()),
			(ino, FileType::Directory, "..".to_owned()),
		];

		let dir_path_str = dir_path.to_string_lossy().into_owned();
		let mut names = Vec::new();
		if let Err(e) = self.fs.readdir(&dir_path_str, |name| {
			names.push(name.to_owned());
			true
		}) {
			reply.error(e.to_errno());
			return;
		}

		for name in names {
			let child_path = join(&dir_path, &name);
			match self.stat(&child_path) {
				Ok((stat, child_ino)) => {
					self.inodes.remember(stat.inode_number, PathBuf::from(&child_path));
					let kind = if stat.mode & wfs_core::format::S_IFMT == S_IFDIR {
						FileType::Directory
					} else {
						FileType::RegularFile
					};
					entries.push((child_ino, kind, name));
				}
				Err(_) => continue, // raced with a concurrent unlink; just skip it
			}
		}

		for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
			if reply.add(ino, (i + 1) as i64, kind, &name) {
				break;
			}
		}
		reply.ok();
	}

	fn read(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyData,
	) {
		let Some(path) = self.inodes.path_of(ino).map(Path::to_path_buf) else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.read(&path.to_string_lossy(), offset.max(0) as u64, size) {
			Ok(data) => reply.data(&data),
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn write(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		data: &[u8],
		_write_flags: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyWrite,
	) {
		let Some(path) = self.inodes.path_of(ino).map(Path::to_path_buf) else {
			reply.error(libc::EINVAL);
			return;
		};
		match self.fs.write(&path.to_string_lossy(), offset.max(0) as u64, data) {
			Ok(written) => reply.written(written),
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn mknod(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		_rdev: u32,
		reply: ReplyEntry,
	) {
		self.create(parent, name, mode, false, reply);
	}

	fn mkdir(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		reply: ReplyEntry,
	) {
		self.create(parent, name, mode, true, reply);
	}

	fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let Some(parent_path) = self.inodes.path_of(parent).map(Path::to_path_buf) else {
			reply.error(libc::EINVAL);
			return;
		};
		let Some(name) = path_to_str(name) else {
			reply.error(libc::EINVAL);
			return;
		};
		let path = join(&parent_path, name);
		match self.fs.unlink(&path) {
			Ok(()) => reply.ok(),
			Err(e) => reply.error(e.to_errno()),
		}
	}

	fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
		// The core has no open-file-descriptor concept: every read/write is
		// stateless and re-resolves its path, so there's nothing to hand
		// back besides a placeholder handle.
		reply.opened(0, 0);
	}

	fn release(
		&mut self,
		_req: &Request<'_>,
		_ino: u64,
		_fh: u64,
		_flags: i32,
		_lock_owner: Option<u64>,
		_flush: bool,
		reply: ReplyEmpty,
	) {
		reply.ok();
	}
}

impl WfsFuse {
	fn create(&mut self, parent: u64, name: &OsStr, mode: u32, is_dir: bool, reply: ReplyEntry) {
		let Some(parent_path) = self.inodes.path_of(parent).map(Path::to_path_buf) else {
			reply.error(libc::EINVAL);
			return;
		};
		let Some(name) = path_to_str(name) else {
			reply.error(libc::EINVAL);
			return;
		};
		let path = join(&parent_path, name);

		let result = if is_dir {
			self.fs.mkdir(&path, mode)
		} else {
			self.fs.mknod(&path, mode)
		};
		if let Err(e) = result {
			reply.error(e.to_errno());
			return;
		}

		match self.stat(&path) {
			Ok((stat, ino)) => {
				self.inodes.remember(stat.inode_number, PathBuf::from(path));
				reply.entry(&ATTR_TTL, &to_file_attr(&stat, ino), 0);
			}
			Err(e) => reply.error(e.to_errno()),
		}
	}
}
