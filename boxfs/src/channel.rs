//! Per-open-file cursor object returned by [`crate::FileSystem::open_file`].

use crate::error::Result;
use crate::fs::FileSystem;

/// A random-access byte channel over a single open file.
///
/// Holds only the resolved inode id and a back-reference to the owning
/// [`FileSystem`]; every call re-resolves the inode under the filesystem's
/// lock rather than caching a borrowed reference (§9 design notes).
pub struct FileChannel {
	fs: FileSystem,
	inode_id: u64,
	position: u64,
}

impl FileChannel {
	pub(crate) fn new(fs: FileSystem, inode_id: u64) -> Self {
		Self {
			fs,
			inode_id,
			position: 0,
		}
	}

	/// Reads into `buf` starting at the channel's current position,
	/// advancing it by the number of bytes read.
	pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
		let n = self.fs.read_inode_at(self.inode_id, self.position, buf)?;
		self.position += n as u64;
		Ok(n)
	}

	/// Writes `buf` starting at the channel's current position, advancing
	/// it by `buf.len()`.
	pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
		let n = self.fs.write_inode_at(self.inode_id, self.position, buf)?;
		self.position += n as u64;
		Ok(n)
	}

	/// The channel's current cursor position.
	pub fn position(&self) -> u64 {
		self.position
	}

	/// Moves the cursor to an absolute byte offset.
	pub fn set_position(&mut self, position: u64) {
		self.position = position;
	}

	/// Truncates (or, per §4.8.8, no-ops on grow) the underlying file to
	/// `new_size`, independent of the channel's own cursor.
	pub fn truncate(&mut self, new_size: u64) -> Result<()> {
		self.fs.truncate_inode(self.inode_id, new_size)
	}

	/// The file's current logical size.
	pub fn size(&self) -> Result<u64> {
		self.fs.inode_size(self.inode_id)
	}

	/// Idempotent; does not imply `sync`.
	pub fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::options::OpenOptions;
	use tempfile::tempdir;

	#[test]
	fn read_write_advances_cursor() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("c.box");
		let fs = FileSystem::open(&path, &OpenOptions::new().create(true).total_blocks(32)).unwrap();
		fs.create_file("/f.txt").unwrap();
		let mut chan = fs.open_file("/f.txt").unwrap();
		chan.write(b"hello").unwrap();
		assert_eq!(chan.position(), 5);
		chan.set_position(0);
		let mut buf = [0u8; 5];
		let n = chan.read(&mut buf).unwrap();
		assert_eq!(n, 5);
		assert_eq!(&buf, b"hello");
	}
}
