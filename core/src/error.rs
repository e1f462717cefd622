//! The error taxonomy shared by every layer of the core, and its mapping to
//! POSIX error numbers for the benefit of a host filesystem gateway.

use std::fmt;
use std::io;

/// An error produced by any core operation.
#[derive(Debug)]
pub enum Error {
	/// No log entry resolves the requested path or inode number.
	NotFound,
	/// A `mknod`/`mkdir` target already exists.
	Exists,
	/// A path component that must be a directory is not one.
	NotADirectory,
	/// An operation that requires a regular file was given a directory.
	IsADirectory,
	/// A basename exceeds `MAX_FILE_NAME_LEN - 1` bytes.
	NameTooLong,
	/// The image has no room left for another log entry.
	NoSpace,
	/// A requested offset falls outside `[SB_SIZE, head)`.
	OutOfRange,
	/// The superblock's magic number does not match `WFS_MAGIC`.
	BadMagic,
	/// The image is shorter than the log it claims to contain.
	Truncated,
	/// The image contains a structurally invalid record.
	Corrupt(String),
	/// The underlying device failed.
	Io(io::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NotFound => write!(f, "no such file or directory"),
			Self::Exists => write!(f, "file exists"),
			Self::NotADirectory => write!(f, "not a directory"),
			Self::IsADirectory => write!(f, "is a directory"),
			Self::NameTooLong => write!(f, "file name too long"),
			Self::NoSpace => write!(f, "no space left on device"),
			Self::OutOfRange => write!(f, "log offset out of range"),
			Self::BadMagic => write!(f, "bad magic number"),
			Self::Truncated => write!(f, "image truncated"),
			Self::Corrupt(msg) => write!(f, "corrupt image: {msg}"),
			Self::Io(e) => write!(f, "{e}"),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}

impl Error {
	/// Maps the error to the POSIX errno a host filesystem gateway should
	/// reply with.
	pub fn to_errno(&self) -> i32 {
		match self {
			Self::NotFound => libc::ENOENT,
			Self::Exists => libc::EEXIST,
			Self::NotADirectory => libc::ENOTDIR,
			Self::IsADirectory => libc::EISDIR,
			Self::NameTooLong => libc::ENAMETOOLONG,
			Self::NoSpace => libc::ENOSPC,
			Self::OutOfRange | Self::BadMagic | Self::Truncated | Self::Corrupt(_) => libc::EIO,
			Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
		}
	}
}

/// Shorthand for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
