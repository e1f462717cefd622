//! Small helpers shared across the core.

use std::mem::size_of;
use std::slice;
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp, truncated to 32 bits the way the
/// on-disk inode stores it.
pub fn now() -> u32 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock panic")
		.as_secs() as u32
}

/// Reinterprets `val` as its raw byte representation.
///
/// # Safety
/// `T` must be a `#[repr(C)]` (or `repr(C, packed)`) plain-old-data type with
/// no padding that carries uninitialized bytes the caller cares about.
pub unsafe fn as_bytes<T>(val: &T) -> &[u8] {
	slice::from_raw_parts(val as *const T as *const u8, size_of::<T>())
}

/// Reinterprets a byte slice of exactly `size_of::<T>()` bytes as a `T`.
///
/// # Safety
/// `buf` must hold a valid, fully-initialized bit pattern for `T`, and must
/// be at least `size_of::<T>()` bytes long.
pub unsafe fn from_bytes<T: Copy>(buf: &[u8]) -> T {
	debug_assert!(buf.len() >= size_of::<T>());
	(buf.as_ptr() as *const T).read_unaligned()
}
