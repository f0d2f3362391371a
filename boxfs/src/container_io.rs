//! Positioned I/O against the single host file backing a container.
//!
//! All block indices are validated against `[0, total_blocks)` before any
//! syscall is issued. Every operation fails [`Error::Closed`] once [`close`]
//! has been called.

use std::fs::{File, OpenOptions as StdOpenOptions};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::superblock::Superblock;

#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Wraps the host file handle backing a container with explicit positioned
/// I/O (§4.3). On Unix this uses `pread`/`pwrite` so that concurrent shared
/// readers never contend on a shared file cursor; elsewhere it falls back to
/// `seek` serialized behind an internal lock.
pub struct ContainerIO {
	#[cfg(unix)]
	file: File,
	#[cfg(not(unix))]
	file: std::sync::Mutex<File>,
	block_size: u32,
	total_blocks: u64,
	closed: AtomicBool,
}

/// Byte offset, from the start of the host file, of block index `b` (§6).
#[inline]
fn block_offset(block_size: u32, b: u64) -> u64 {
	block_size as u64 * (1 + b)
}

impl ContainerIO {
	/// Creates a new container at `path`.
	///
	/// Fails [`Error::AlreadyExists`] if the file already exists.
	pub fn create(path: &Path, block_size: u32, total_blocks: u64) -> Result<(Self, Superblock)> {
		let file = StdOpenOptions::new()
			.read(true)
			.write(true)
			.create_new(true)
			.open(path)
			.map_err(|e| {
				if e.kind() == io::ErrorKind::AlreadyExists {
					Error::AlreadyExists(path.display().to_string())
				} else {
					Error::IoFailure(e)
				}
			})?;
		let sp = Superblock::new(block_size, total_blocks)?;
		let total_len = block_offset(block_size, total_blocks);
		// Pre-allocate by writing a single byte at the final offset.
		if total_len > 0 {
			Self::pwrite_raw(&file, &[0u8], total_len - 1)?;
		}
		Self::pwrite_raw(&file, &sp.serialize(), 0)?;
		let io = Self::wrap(file, block_size, total_blocks);
		Ok((io, sp))
	}

	/// Opens an existing container at `path`.
	pub fn open(path: &Path, read_only: bool) -> Result<(Self, Superblock)> {
		let file = StdOpenOptions::new()
			.read(true)
			.write(!read_only)
			.open(path)
			.map_err(|e| {
				if e.kind() == io::ErrorKind::NotFound {
					Error::NotFound(path.display().to_string())
				} else {
					Error::IoFailure(e)
				}
			})?;
		// Enough to learn the metadata-extent count (§6); the rest of the
		// extent list, if any, is then read directly past it.
		let mut header = [0u8; 24];
		Self::pread_raw(&file, &mut header, 0)?;
		let count = u32::from_be_bytes(header[20..24].try_into().unwrap()) as usize;
		let needed = 24 + count * 12;
		let mut buf = vec![0u8; needed];
		buf[..24].copy_from_slice(&header);
		if needed > 24 {
			Self::pread_raw(&file, &mut buf[24..], 24)?;
		}
		let sp = Superblock::deserialize(&buf)?;
		let io = Self::wrap(file, sp.block_size(), sp.total_blocks());
		Ok((io, sp))
	}

	#[cfg(unix)]
	fn wrap(file: File, block_size: u32, total_blocks: u64) -> Self {
		Self {
			file,
			block_size,
			total_blocks,
			closed: AtomicBool::new(false),
		}
	}

	#[cfg(not(unix))]
	fn wrap(file: File, block_size: u32, total_blocks: u64) -> Self {
		Self {
			file: std::sync::Mutex::new(file),
			block_size,
			total_blocks,
			closed: AtomicBool::new(false),
		}
	}

	#[cfg(unix)]
	fn pread_raw(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
		file.read_exact_at(buf, offset).map_err(Error::IoFailure)
	}

	#[cfg(not(unix))]
	fn pread_raw(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
		use std::io::{Read, Seek, SeekFrom};
		let mut file = file.try_clone().map_err(Error::IoFailure)?;
		file.seek(SeekFrom::Start(offset)).map_err(Error::IoFailure)?;
		file.read_exact(buf).map_err(Error::IoFailure)
	}

	#[cfg(unix)]
	fn pwrite_raw(file: &File, buf: &[u8], offset: u64) -> Result<()> {
		file.write_all_at(buf, offset).map_err(Error::IoFailure)
	}

	#[cfg(not(unix))]
	fn pwrite_raw(file: &File, buf: &[u8], offset: u64) -> Result<()> {
		use std::io::{Seek, SeekFrom, Write};
		let mut file = file.try_clone().map_err(Error::IoFailure)?;
		file.seek(SeekFrom::Start(offset)).map_err(Error::IoFailure)?;
		file.write_all(buf).map_err(Error::IoFailure)
	}

	#[cfg(unix)]
	fn with_file<T>(&self, f: impl FnOnce(&File) -> Result<T>) -> Result<T> {
		f(&self.file)
	}

	#[cfg(not(unix))]
	fn with_file<T>(&self, f: impl FnOnce(&File) -> Result<T>) -> Result<T> {
		let guard = self.file.lock().unwrap();
		f(&guard)
	}

	fn check_open(&self) -> Result<()> {
		if self.closed.load(Ordering::Acquire) {
			return Err(Error::Closed("container is closed".to_owned()));
		}
		Ok(())
	}

	fn check_range(&self, start_block: u64, count: u64) -> Result<()> {
		if count == 0 {
			return Ok(());
		}
		match start_block.checked_add(count) {
			Some(end) if end <= self.total_blocks => Ok(()),
			Some(end) => Err(Error::Invalid(format!(
				"block range [{start_block}, {end}) out of bounds (container has {total} blocks)",
				total = self.total_blocks
			))),
			None => Err(Error::Invalid(format!(
				"block range starting at {start_block} with count {count} overflows (container has {total} blocks)",
				total = self.total_blocks
			))),
		}
	}

	#[inline]
	pub fn block_size(&self) -> u32 {
		self.block_size
	}

	#[inline]
	pub fn total_blocks(&self) -> u64 {
		self.total_blocks
	}

	/// Reads `count` whole blocks starting at `start_block`.
	pub fn read_blocks(&self, start_block: u64, count: u32) -> Result<Vec<u8>> {
		self.check_open()?;
		self.check_range(start_block, count as u64)?;
		let mut buf = vec![0u8; count as usize * self.block_size as usize];
		let off = block_offset(self.block_size, start_block);
		self.with_file(|f| Self::pread_raw(f, &mut buf, off))?;
		Ok(buf)
	}

	/// Writes `bytes` starting at `start_block`, zero-padding up to whole
	/// block granularity.
	pub fn write_blocks(&self, start_block: u64, bytes: &[u8]) -> Result<()> {
		self.check_open()?;
		let blocks = crate::util::ceil_division(bytes.len() as u64, self.block_size as u64);
		self.check_range(start_block, blocks)?;
		let mut buf = vec![0u8; blocks as usize * self.block_size as usize];
		buf[..bytes.len()].copy_from_slice(bytes);
		let off = block_offset(self.block_size, start_block);
		self.with_file(|f| Self::pwrite_raw(f, &buf, off))
	}

	/// Reads up to `dest.len()` bytes starting at `offset_in_extent` within
	/// `extent`, clamped to the extent's bounds.
	///
	/// Returns the number of bytes actually transferred, or `-1` if
	/// `offset_in_extent` is at or past the end of the extent.
	pub fn read_from_extent(
		&self,
		extent: &Extent,
		offset_in_extent: u64,
		dest: &mut [u8],
	) -> Result<i64> {
		self.check_open()?;
		let extent_len = extent.byte_len(self.block_size);
		if offset_in_extent >= extent_len {
			return Ok(-1);
		}
		let avail = (extent_len - offset_in_extent) as usize;
		let n = dest.len().min(avail);
		if n == 0 {
			return Ok(0);
		}
		let off = block_offset(self.block_size, extent.start()) + offset_in_extent;
		self.with_file(|f| Self::pread_raw(f, &mut dest[..n], off))?;
		Ok(n as i64)
	}

	/// Writes up to `src.len()` bytes starting at `offset_in_extent` within
	/// `extent`, clamped to the extent's bounds.
	///
	/// Returns the number of bytes actually written.
	pub fn write_to_extent(
		&self,
		extent: &Extent,
		offset_in_extent: u64,
		src: &[u8],
	) -> Result<usize> {
		self.check_open()?;
		let extent_len = extent.byte_len(self.block_size);
		if offset_in_extent >= extent_len {
			return Ok(0);
		}
		let avail = (extent_len - offset_in_extent) as usize;
		let n = src.len().min(avail);
		if n == 0 {
			return Ok(0);
		}
		let off = block_offset(self.block_size, extent.start()) + offset_in_extent;
		self.with_file(|f| Self::pwrite_raw(f, &src[..n], off))?;
		Ok(n)
	}

	/// Rewrites the superblock at container offset 0.
	pub fn write_superblock(&self, sp: &Superblock) -> Result<()> {
		self.check_open()?;
		self.with_file(|f| Self::pwrite_raw(f, &sp.serialize(), 0))
	}

	/// Forces host-file buffers to stable storage.
	pub fn sync(&self) -> Result<()> {
		self.check_open()?;
		self.with_file(|f| f.sync_all().map_err(Error::IoFailure))
	}

	/// Marks the container closed. Idempotent.
	pub fn close(&self) {
		self.closed.store(true, Ordering::Release);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::NamedTempFile;

	fn temp_path() -> std::path::PathBuf {
		let f = NamedTempFile::new().unwrap();
		let path = f.path().to_path_buf();
		// Drop without deleting the backing path's parent; `create` requires
		// the path not to exist yet.
		drop(f);
		std::fs::remove_file(&path).ok();
		path
	}

	#[test]
	fn create_then_open_round_trips_superblock() {
		let path = temp_path();
		{
			let (io, sp) = ContainerIO::create(&path, 512, 16).unwrap();
			assert_eq!(sp.block_size(), 512);
			io.close();
		}
		let (_io, sp) = ContainerIO::open(&path, false).unwrap();
		assert_eq!(sp.block_size(), 512);
		assert_eq!(sp.total_blocks(), 16);
		std::fs::remove_file(&path).ok();
	}

	#[test]
	fn create_twice_fails_already_exists() {
		let path = temp_path();
		let (io, _) = ContainerIO::create(&path, 512, 4).unwrap();
		io.close();
		assert!(matches!(
			ContainerIO::create(&path, 512, 4),
			Err(Error::AlreadyExists(_))
		));
		std::fs::remove_file(&path).ok();
	}

	#[test]
	fn block_read_write_round_trip() {
		let path = temp_path();
		let (io, _) = ContainerIO::create(&path, 512, 8).unwrap();
		let data = vec![7u8; 512];
		io.write_blocks(2, &data).unwrap();
		let back = io.read_blocks(2, 1).unwrap();
		assert_eq!(back, data);
		std::fs::remove_file(&path).ok();
	}

	#[test]
	fn extent_io_clamped_and_eof() {
		let path = temp_path();
		let (io, _) = ContainerIO::create(&path, 512, 8).unwrap();
		let extent = Extent::new(0, 2).unwrap();
		io.write_to_extent(&extent, 100, b"hello").unwrap();
		let mut dest = [0u8; 5];
		let n = io.read_from_extent(&extent, 100, &mut dest).unwrap();
		assert_eq!(n, 5);
		assert_eq!(&dest, b"hello");
		// Past the end of the extent.
		let n = io.read_from_extent(&extent, 1024, &mut dest).unwrap();
		assert_eq!(n, -1);
		std::fs::remove_file(&path).ok();
	}

	#[test]
	fn ops_fail_after_close() {
		let path = temp_path();
		let (io, _) = ContainerIO::create(&path, 512, 4).unwrap();
		io.close();
		assert!(matches!(io.read_blocks(0, 1), Err(Error::Closed(_))));
		std::fs::remove_file(&path).ok();
	}

	#[test]
	fn out_of_range_block_fails() {
		let path = temp_path();
		let (io, _) = ContainerIO::create(&path, 512, 4).unwrap();
		assert!(io.read_blocks(3, 2).is_err());
		std::fs::remove_file(&path).ok();
	}

	#[test]
	fn overflowing_block_range_is_invalid_not_a_panic() {
		let path = temp_path();
		let (io, _) = ContainerIO::create(&path, 512, 4).unwrap();
		assert!(matches!(io.read_blocks(u64::MAX - 1, 4), Err(Error::Invalid(_))));
		std::fs::remove_file(&path).ok();
	}
}
