//! Binary codec for the metadata region: the inode table, the directory
//! table, and the free list, all flattened into one self-describing byte
//! buffer (§6).
//!
//! Layout, all big-endian:
//!
//! ```text
//! u32  inodeCount
//! inodeCount * {
//!     u64 id
//!     u8  type            (0 = file, 1 = directory)
//!     u64 size
//!     i64 created
//!     i64 modified
//!     i64 accessed
//!     u32 extentCount
//!     extentCount * { u64 startBlock, u32 blockCount }
//! }
//! u32  dirEntryCount
//! dirEntryCount * {
//!     u64 parent
//!     u64 child
//!     u16 nameLen
//!     nameLen bytes of UTF-8 name
//! }
//! u32  freeExtentCount
//! freeExtentCount * { u64 startBlock, u32 blockCount }
//! ```

use crate::directory::{DirEntry, DirectoryTable};
use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::inode::{FileType, Inode, InodeTable, Timestamps};
use crate::space_manager::SpaceManager;

/// Stateless binary codec between the in-memory tables and the container's
/// metadata region.
pub struct MetadataSerializer;

impl MetadataSerializer {
	/// Flattens the inode table, directory table, and free list into one
	/// buffer.
	pub fn serialize(
		inodes: &InodeTable,
		dirs: &DirectoryTable,
		space: &SpaceManager,
	) -> Vec<u8> {
		let mut buf = Vec::new();

		buf.extend_from_slice(&(inodes.len() as u32).to_be_bytes());
		for inode in inodes.iter() {
			buf.extend_from_slice(&inode.id().to_be_bytes());
			buf.push(match inode.file_type() {
				FileType::File => 0,
				FileType::Directory => 1,
			});
			buf.extend_from_slice(&inode.size().to_be_bytes());
			let ts = inode.timestamps();
			buf.extend_from_slice(&ts.created.to_be_bytes());
			buf.extend_from_slice(&ts.modified.to_be_bytes());
			buf.extend_from_slice(&ts.accessed.to_be_bytes());
			buf.extend_from_slice(&(inode.extents().len() as u32).to_be_bytes());
			for ext in inode.extents() {
				buf.extend_from_slice(&ext.start().to_be_bytes());
				buf.extend_from_slice(&ext.count().to_be_bytes());
			}
		}

		let entries = dirs.all_entries();
		buf.extend_from_slice(&(entries.len() as u32).to_be_bytes());
		for e in &entries {
			buf.extend_from_slice(&e.parent.to_be_bytes());
			buf.extend_from_slice(&e.child.to_be_bytes());
			let name_bytes = e.name.as_bytes();
			buf.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
			buf.extend_from_slice(name_bytes);
		}

		let free = space.free_extents();
		buf.extend_from_slice(&(free.len() as u32).to_be_bytes());
		for ext in free {
			buf.extend_from_slice(&ext.start().to_be_bytes());
			buf.extend_from_slice(&ext.count().to_be_bytes());
		}

		buf
	}

	/// Parses a metadata buffer back into fresh tables.
	///
	/// Fails with [`Error::InvalidFormat`] on a truncated buffer or an
	/// unrecognized inode type tag; fails with whatever [`DirectoryTable`]
	/// or [`Extent`] construction reports if the encoded graph or extents
	/// are malformed.
	pub fn deserialize(bytes: &[u8]) -> Result<(InodeTable, DirectoryTable, SpaceManager)> {
		let mut cur = Cursor::new(bytes);

		let inode_count = cur.read_u32()?;
		let mut inodes = InodeTable::new();
		inodes.clear();
		for _ in 0..inode_count {
			let id = cur.read_u64()?;
			let type_tag = cur.read_u8()?;
			let file_type = match type_tag {
				0 => FileType::File,
				1 => FileType::Directory,
				other => {
					return Err(Error::InvalidFormat(format!(
						"unrecognized inode type tag {other}"
					)))
				}
			};
			let size = cur.read_u64()?;
			let created = cur.read_i64()?;
			let modified = cur.read_i64()?;
			let accessed = cur.read_i64()?;
			let extent_count = cur.read_u32()?;
			let mut extents = Vec::with_capacity(extent_count as usize);
			for _ in 0..extent_count {
				let start = cur.read_u64()?;
				let count = cur.read_u32()?;
				extents.push(Extent::new(start, count)?);
			}
			let timestamps = Timestamps {
				created,
				modified,
				accessed,
			};
			inodes.register(Inode::from_parts(id, file_type, size, extents, timestamps));
		}

		let dir_count = cur.read_u32()?;
		let mut dirs = DirectoryTable::new();
		dirs.clear();
		let mut dir_entries = Vec::with_capacity(dir_count as usize);
		for _ in 0..dir_count {
			let parent = cur.read_u64()?;
			let child = cur.read_u64()?;
			let name_len = cur.read_u16()? as usize;
			let name = cur.read_utf8(name_len)?;
			dir_entries.push(DirEntry { parent, name, child });
		}
		dirs.rebuild(dir_entries)?;

		let free_count = cur.read_u32()?;
		let mut free = Vec::with_capacity(free_count as usize);
		for _ in 0..free_count {
			let start = cur.read_u64()?;
			let count = cur.read_u32()?;
			free.push(Extent::new(start, count)?);
		}
		let mut space = SpaceManager::new();
		space.set_free_extents(free);

		Ok((inodes, dirs, space))
	}
}

/// A minimal big-endian cursor over a byte slice, reporting
/// [`Error::InvalidFormat`] on underrun rather than panicking.
struct Cursor<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	fn new(bytes: &'a [u8]) -> Self {
		Self { bytes, pos: 0 }
	}

	fn take(&mut self, n: usize) -> Result<&'a [u8]> {
		if self.pos + n > self.bytes.len() {
			return Err(Error::InvalidFormat(
				"metadata buffer truncated".to_owned(),
			));
		}
		let slice = &self.bytes[self.pos..self.pos + n];
		self.pos += n;
		Ok(slice)
	}

	fn read_u8(&mut self) -> Result<u8> {
		Ok(self.take(1)?[0])
	}

	fn read_u16(&mut self) -> Result<u16> {
		Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
	}

	fn read_u32(&mut self) -> Result<u32> {
		Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
	}

	fn read_u64(&mut self) -> Result<u64> {
		Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
	}

	fn read_i64(&mut self) -> Result<i64> {
		Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
	}

	fn read_utf8(&mut self, len: usize) -> Result<String> {
		let raw = self.take(len)?;
		String::from_utf8(raw.to_vec())
			.map_err(|_| Error::InvalidFormat("directory entry name is not valid UTF-8".to_owned()))
	}
}
