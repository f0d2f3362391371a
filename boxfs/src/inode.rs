//! In-memory inode descriptors and their table.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::util::now_millis;

/// Identifier of the root directory inode. Never removed, never reused.
pub const ROOT_INODE_ID: u64 = 0;

/// The type of a file-system object. Immutable after creation (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
	File,
	Directory,
}

/// Epoch-millisecond timestamps carried by every inode.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timestamps {
	pub created: i64,
	pub modified: i64,
	pub accessed: i64,
}

impl Timestamps {
	fn now() -> Self {
		let t = now_millis();
		Self {
			created: t,
			modified: t,
			accessed: t,
		}
	}
}

/// A file or directory descriptor.
#[derive(Debug, Clone)]
pub struct Inode {
	id: u64,
	file_type: FileType,
	size: u64,
	extents: Vec<Extent>,
	timestamps: Timestamps,
}

impl Inode {
	fn new(id: u64, file_type: FileType) -> Self {
		Self {
			id,
			file_type,
			size: 0,
			extents: Vec::new(),
			timestamps: Timestamps::now(),
		}
	}

	#[inline]
	pub fn id(&self) -> u64 {
		self.id
	}

	#[inline]
	pub fn file_type(&self) -> FileType {
		self.file_type
	}

	#[inline]
	pub fn is_directory(&self) -> bool {
		self.file_type == FileType::Directory
	}

	#[inline]
	pub fn size(&self) -> u64 {
		self.size
	}

	#[inline]
	pub fn extents(&self) -> &[Extent] {
		&self.extents
	}

	#[inline]
	pub fn timestamps(&self) -> Timestamps {
		self.timestamps
	}

	/// Total bytes available across this inode's extents.
	pub fn allocated_bytes(&self, block_size: u32) -> u64 {
		self.extents.iter().map(|e| e.byte_len(block_size)).sum()
	}

	/// Appends newly-allocated extents to this inode's data map.
	pub fn append_extents(&mut self, new: impl IntoIterator<Item = Extent>) {
		self.extents.extend(new);
	}

	/// Replaces the extent list wholesale (used by truncate and by
	/// deserialization).
	pub fn set_extents(&mut self, extents: Vec<Extent>) {
		self.extents = extents;
	}

	/// Sets the logical size. Callers are responsible for the §3 invariant
	/// `size <= sum(extent sizes)`.
	pub fn set_size(&mut self, size: u64) {
		self.size = size;
	}

	pub fn touch_modified(&mut self) {
		self.timestamps.modified = now_millis();
	}

	pub fn touch_accessed(&mut self) {
		self.timestamps.accessed = now_millis();
	}

	/// Constructs an inode directly from decoded fields, used only by the
	/// metadata codec.
	pub(crate) fn from_parts(
		id: u64,
		file_type: FileType,
		size: u64,
		extents: Vec<Extent>,
		timestamps: Timestamps,
	) -> Self {
		Self {
			id,
			file_type,
			size,
			extents,
			timestamps,
		}
	}
}

/// In-memory map `inode id -> Inode`, plus the monotonic id generator.
#[derive(Debug, Default)]
pub struct InodeTable {
	inodes: HashMap<u64, Inode>,
	next_id: u64,
}

impl InodeTable {
	pub fn new() -> Self {
		Self {
			inodes: HashMap::new(),
			next_id: ROOT_INODE_ID + 1,
		}
	}

	/// Creates the root directory inode (id 0). Fails if it already exists.
	pub fn create_root_inode(&mut self) -> Result<()> {
		if self.inodes.contains_key(&ROOT_INODE_ID) {
			return Err(Error::Invalid("root inode already exists".to_owned()));
		}
		self.inodes
			.insert(ROOT_INODE_ID, Inode::new(ROOT_INODE_ID, FileType::Directory));
		Ok(())
	}

	/// Allocates a fresh inode id and inserts a new, empty inode of the
	/// given type.
	pub fn create_inode(&mut self, file_type: FileType) -> &mut Inode {
		let id = self.next_id;
		self.next_id += 1;
		self.inodes.insert(id, Inode::new(id, file_type));
		self.inodes.get_mut(&id).expect("just inserted")
	}

	/// Inserts an already-constructed inode (used by deserialization) and
	/// bumps `next_id` past its id so future allocations never collide.
	pub fn register(&mut self, inode: Inode) {
		self.next_id = self.next_id.max(inode.id() + 1);
		self.inodes.insert(inode.id(), inode);
	}

	pub fn get(&self, id: u64) -> Option<&Inode> {
		self.inodes.get(&id)
	}

	pub fn get_mut(&mut self, id: u64) -> Option<&mut Inode> {
		self.inodes.get_mut(&id)
	}

	/// Removes an inode. Refuses to remove the root.
	pub fn remove(&mut self, id: u64) -> Result<Inode> {
		if id == ROOT_INODE_ID {
			return Err(Error::Invalid("cannot remove the root inode".to_owned()));
		}
		self.inodes
			.remove(&id)
			.ok_or_else(|| Error::NotFound(format!("inode {id}")))
	}

	pub fn len(&self) -> usize {
		self.inodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inodes.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Inode> {
		self.inodes.values()
	}

	/// Clears every inode (used before a metadata deserialize pass, §4.7).
	pub fn clear(&mut self) {
		self.inodes.clear();
		self.next_id = ROOT_INODE_ID + 1;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn root_created_once() {
		let mut t = InodeTable::new();
		t.create_root_inode().unwrap();
		assert!(t.get(ROOT_INODE_ID).unwrap().is_directory());
		assert!(t.create_root_inode().is_err());
	}

	#[test]
	fn ids_are_monotonic() {
		let mut t = InodeTable::new();
		t.create_root_inode().unwrap();
		let a = t.create_inode(FileType::File).id();
		let b = t.create_inode(FileType::Directory).id();
		assert!(b > a);
		assert_ne!(a, ROOT_INODE_ID);
	}

	#[test]
	fn register_bumps_next_id() {
		let mut t = InodeTable::new();
		t.register(Inode::new(41, FileType::File));
		let next = t.create_inode(FileType::File).id();
		assert_eq!(next, 42);
	}

	#[test]
	fn remove_refuses_root() {
		let mut t = InodeTable::new();
		t.create_root_inode().unwrap();
		assert!(t.remove(ROOT_INODE_ID).is_err());
	}

	#[test]
	fn remove_missing_is_not_found() {
		let mut t = InodeTable::new();
		assert!(matches!(t.remove(99), Err(Error::NotFound(_))));
	}
}
