//! The FileSystem core: composes every other module, resolves paths, and
//! implements the create/delete/move/copy/read/write/truncate operations
//! under a single reader-writer lock (§4.8, §5).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::channel::FileChannel;
use crate::container_io::ContainerIO;
use crate::directory::DirectoryTable;
use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::inode::{FileType, Inode, InodeTable, Timestamps, ROOT_INODE_ID};
use crate::metadata::MetadataSerializer;
use crate::options::OpenOptions;
use crate::path::{join, normalize};
use crate::space_manager::SpaceManager;
use crate::superblock::Superblock;
use crate::util::ceil_division;

/// Attributes returned by [`FileSystem::stat`].
#[derive(Debug, Clone, Copy)]
pub struct Metadata {
	pub file_type: FileType,
	pub size: u64,
	pub timestamps: Timestamps,
}

/// The full set of in-memory tables guarded by the filesystem's single
/// reader-writer lock (§5): the superblock, the inode and directory
/// tables, and the free-space list all move together under one lock so
/// that every public operation is atomic with respect to every other.
struct State {
	superblock: Superblock,
	inodes: InodeTable,
	dirs: DirectoryTable,
	space: SpaceManager,
}

/// State shared by every clone of a [`FileSystem`] handle.
struct Shared {
	io: ContainerIO,
	state: RwLock<State>,
	path: PathBuf,
	read_only: bool,
	closed: AtomicBool,
}

/// An open single-container file system.
///
/// Cheaply `Clone`-able: every clone shares the same lock and host-file
/// handle. Obtained via [`FileSystem::open`].
#[derive(Clone)]
pub struct FileSystem {
	shared: Arc<Shared>,
}

impl FileSystem {
	/// Opens (optionally creating) the container at `path`.
	///
	/// This bypasses the process-wide [`crate::Registry`]; most callers
	/// should prefer [`crate::Registry::open`] instead, unless they
	/// deliberately want an unshared handle.
	pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
		let path = path.as_ref();
		match ContainerIO::open(path, options.read_only) {
			Ok((io, superblock)) => {
				let (inodes, dirs, space) = load_metadata(&io, &superblock)?;
				Ok(Self::from_parts(io, superblock, inodes, dirs, space, path, options.read_only))
			}
			Err(Error::NotFound(_)) if options.create => {
				let total_blocks = if options.total_blocks == 0 {
					256
				} else {
					options.total_blocks
				};
				let (io, superblock) = ContainerIO::create(path, options.block_size, total_blocks)?;
				let mut inodes = InodeTable::new();
				inodes.create_root_inode()?;
				let mut dirs = DirectoryTable::new();
				dirs.init_root();
				let mut space = SpaceManager::new();
				space.initialize_new(0, total_blocks)?;
				log::debug!("created new container at {}", path.display());
				Ok(Self::from_parts(
					io,
					superblock,
					inodes,
					dirs,
					space,
					path,
					options.read_only,
				))
			}
			Err(e) => Err(e),
		}
	}

	fn from_parts(
		io: ContainerIO,
		superblock: Superblock,
		inodes: InodeTable,
		dirs: DirectoryTable,
		space: SpaceManager,
		path: &Path,
		read_only: bool,
	) -> Self {
		Self {
			shared: Arc::new(Shared {
				io,
				state: RwLock::new(State {
					superblock,
					inodes,
					dirs,
					space,
				}),
				path: path.to_path_buf(),
				read_only,
				closed: AtomicBool::new(false),
			}),
		}
	}

	fn check_open(&self) -> Result<()> {
		if self.shared.closed.load(Ordering::Acquire) {
			return Err(Error::Closed(self.shared.path.display().to_string()));
		}
		Ok(())
	}

	fn check_writable(&self) -> Result<()> {
		self.check_open()?;
		if self.shared.read_only {
			return Err(Error::ReadOnly(self.shared.path.display().to_string()));
		}
		Ok(())
	}

	fn resolve(state: &State, components: &[String]) -> Result<u64> {
		let mut current = ROOT_INODE_ID;
		for name in components {
			current = state
				.dirs
				.lookup(current, name)
				.ok_or_else(|| Error::NotFound(join(components)))?;
		}
		Ok(current)
	}

	/// Walks to `path`'s parent directory inode and returns
	/// `(parent_id, leaf_name)`.
	fn resolve_parent(state: &State, components: &[String]) -> Result<(u64, String)> {
		let (leaf, parent_components) = components
			.split_last()
			.ok_or_else(|| Error::AlreadyExists("/".to_owned()))?;
		let parent_id = Self::resolve(state, parent_components)?;
		if !state.inodes.get(parent_id).map(Inode::is_directory).unwrap_or(false) {
			return Err(Error::NotDirectory(join(parent_components)));
		}
		Ok((parent_id, leaf.clone()))
	}

	// ---- directory operations -------------------------------------------------

	pub fn create_file(&self, path: impl AsRef<str>) -> Result<()> {
		self.create(path.as_ref(), FileType::File)
	}

	pub fn create_directory(&self, path: impl AsRef<str>) -> Result<()> {
		self.create(path.as_ref(), FileType::Directory)
	}

	fn create(&self, path: &str, file_type: FileType) -> Result<()> {
		self.check_writable()?;
		let components = normalize(path)?;
		let mut state = self.shared.state.write().unwrap();
		let (parent_id, leaf) = Self::resolve_parent(&state, &components)?;
		if state.dirs.lookup(parent_id, &leaf).is_some() {
			return Err(Error::AlreadyExists(path.to_owned()));
		}
		let child_id = state.inodes.create_inode(file_type).id();
		state.dirs.link(parent_id, &leaf, child_id)?;
		Ok(())
	}

	/// Deletes the file or empty directory at `path`.
	pub fn delete(&self, path: impl AsRef<str>) -> Result<()> {
		self.check_writable()?;
		let components = normalize(path.as_ref())?;
		let mut state = self.shared.state.write().unwrap();
		Self::delete_locked(&mut state, &components)
	}

	fn delete_locked(state: &mut State, components: &[String]) -> Result<()> {
		if components.is_empty() {
			return Err(Error::Invalid("cannot delete the root directory".to_owned()));
		}
		let (parent_id, leaf) = Self::resolve_parent(state, components)?;
		let target_id = state
			.dirs
			.lookup(parent_id, &leaf)
			.ok_or_else(|| Error::NotFound(join(components)))?;
		let target = state
			.inodes
			.get(target_id)
			.ok_or_else(|| Error::NotFound(join(components)))?;
		if target.is_directory() && !state.dirs.is_empty(target_id) {
			return Err(Error::DirectoryNotEmpty(join(components)));
		}
		let extents: Vec<Extent> = target.extents().to_vec();
		state.space.free_all(extents);
		state.dirs.unlink(parent_id, &leaf)?;
		state.inodes.remove(target_id)?;
		Ok(())
	}

	/// Lists the names and inode ids directly under the directory at `path`.
	pub fn list_directory(&self, path: impl AsRef<str>) -> Result<Vec<String>> {
		self.check_open()?;
		let components = normalize(path.as_ref())?;
		let state = self.shared.state.read().unwrap();
		let target = Self::resolve(&state, &components)?;
		if !state.inodes.get(target).map(Inode::is_directory).unwrap_or(false) {
			return Err(Error::NotDirectory(join(&components)));
		}
		Ok(state.dirs.list(target)?.into_iter().map(|(name, _)| name).collect())
	}

	/// Returns type/size/timestamp attributes for `path`.
	pub fn stat(&self, path: impl AsRef<str>) -> Result<Metadata> {
		self.check_open()?;
		let components = normalize(path.as_ref())?;
		let state = self.shared.state.read().unwrap();
		let id = Self::resolve(&state, &components)?;
		let inode = state.inodes.get(id).ok_or_else(|| Error::NotFound(join(&components)))?;
		Ok(Metadata {
			file_type: inode.file_type(),
			size: inode.size(),
			timestamps: inode.timestamps(),
		})
	}

	/// Total free blocks currently available for allocation.
	pub fn free_blocks(&self) -> Result<u64> {
		self.check_open()?;
		Ok(self.shared.state.read().unwrap().space.total_free_blocks())
	}

	pub fn block_size(&self) -> u32 {
		self.shared.io.block_size()
	}

	pub fn total_blocks(&self) -> u64 {
		self.shared.io.total_blocks()
	}

	// ---- move / copy ------------------------------------------------------

	/// Renames or relocates `from` to `to`. If `to` already exists, the
	/// operation fails `AlreadyExists` unless `replace_existing` is set, in
	/// which case the existing target is deleted first, atomically with the
	/// rest of the move (§4.8.4).
	pub fn mv(&self, from: impl AsRef<str>, to: impl AsRef<str>, replace_existing: bool) -> Result<()> {
		self.check_writable()?;
		let from_components = normalize(from.as_ref())?;
		let to_components = normalize(to.as_ref())?;
		let mut state = self.shared.state.write().unwrap();

		let source_id = Self::resolve(&state, &from_components)?;
		let (target_parent, target_leaf) = Self::resolve_parent(&state, &to_components)?;

		if state.dirs.is_ancestor(source_id, target_parent) {
			return Err(Error::Invalid(
				"cannot move a directory into itself or one of its own descendants".to_owned(),
			));
		}

		Self::prepare_replace_target(&mut state, &to_components, target_parent, &target_leaf, source_id, replace_existing)?;

		state.dirs.relink(source_id, target_parent, &target_leaf)?;
		Ok(())
	}

	/// Copies file `from` to `to`. Directory sources are rejected. Target
	/// preparation mirrors [`Self::mv`] (§4.8.5).
	pub fn cp(&self, from: impl AsRef<str>, to: impl AsRef<str>, replace_existing: bool) -> Result<()> {
		self.check_writable()?;
		let from_components = normalize(from.as_ref())?;
		let to_components = normalize(to.as_ref())?;
		let mut state = self.shared.state.write().unwrap();

		let source_id = Self::resolve(&state, &from_components)?;
		{
			let source = state
				.inodes
				.get(source_id)
				.ok_or_else(|| Error::NotFound(join(&from_components)))?;
			if source.is_directory() {
				return Err(Error::Invalid(format!(
					"cannot copy directory {}",
					join(&from_components)
				)));
			}
		}
		let (target_parent, target_leaf) = Self::resolve_parent(&state, &to_components)?;
		// Validate (and, if `replace_existing`, hold off actually deleting) the
		// target before touching the allocator, so a NoSpace failure below
		// never destroys an existing file that the copy couldn't replace.
		let needs_replace = Self::validate_replace_target(
			&state,
			&to_components,
			target_parent,
			&target_leaf,
			source_id,
			replace_existing,
		)?;

		let block_size = self.shared.io.block_size();
		let (size, extents) = {
			let source = state.inodes.get(source_id).expect("resolved above");
			(source.size(), source.extents().to_vec())
		};
		let needed_blocks = ceil_division(size, block_size as u64) as u32;
		let new_extents = if needed_blocks == 0 {
			Vec::new()
		} else {
			let allocated = state.space.allocate_multiple(needed_blocks);
			if allocated.is_empty() {
				log::warn!("no space left copying {} bytes", size);
				return Err(Error::NoSpace);
			}
			allocated
		};

		copy_bytes(&self.shared.io, &extents, &new_extents, size, block_size)?;

		if needs_replace {
			Self::delete_locked(&mut state, &to_components)?;
		}

		let target_id = state.inodes.create_inode(FileType::File).id();
		{
			let target = state.inodes.get_mut(target_id).expect("just created");
			target.append_extents(new_extents);
			target.set_size(size);
		}
		state.dirs.link(target_parent, &target_leaf, target_id)?;
		Ok(())
	}

	/// Checks whether a replace at `(target_parent, target_leaf)` is allowed
	/// (non-empty-directory, `AlreadyExists`, and type-conflict rules from
	/// §4.8.4/§4.8.5), without deleting anything. Returns whether an existing
	/// entry there needs to be deleted to make room for the new one.
	fn validate_replace_target(
		state: &State,
		to_components: &[String],
		target_parent: u64,
		target_leaf: &str,
		source_id: u64,
		replace_existing: bool,
	) -> Result<bool> {
		let Some(existing_id) = state.dirs.lookup(target_parent, target_leaf) else {
			return Ok(false);
		};
		if existing_id == source_id {
			return Ok(false);
		}
		let existing = state
			.inodes
			.get(existing_id)
			.ok_or_else(|| Error::NotFound(join(to_components)))?;
		let source_is_dir = state
			.inodes
			.get(source_id)
			.map(Inode::is_directory)
			.unwrap_or(false);
		if existing.is_directory() && !state.dirs.is_empty(existing_id) {
			return Err(Error::DirectoryNotEmpty(join(to_components)));
		}
		if !replace_existing {
			return Err(Error::AlreadyExists(join(to_components)));
		}
		if existing.is_directory() != source_is_dir {
			return Err(Error::replace_type_conflict(existing.is_directory()));
		}
		Ok(true)
	}

	fn prepare_replace_target(
		state: &mut State,
		to_components: &[String],
		target_parent: u64,
		target_leaf: &str,
		source_id: u64,
		replace_existing: bool,
	) -> Result<()> {
		if Self::validate_replace_target(state, to_components, target_parent, target_leaf, source_id, replace_existing)? {
			Self::delete_locked(state, to_components)?;
		}
		Ok(())
	}

	// ---- byte-level I/O, used directly and via FileChannel -----------------

	/// Opens an existing file at `path` for random-access reads and writes.
	pub fn open_file(&self, path: impl AsRef<str>) -> Result<FileChannel> {
		self.check_open()?;
		let components = normalize(path.as_ref())?;
		let state = self.shared.state.read().unwrap();
		let id = Self::resolve(&state, &components)?;
		let inode = state.inodes.get(id).ok_or_else(|| Error::NotFound(join(&components)))?;
		if inode.is_directory() {
			return Err(Error::Invalid(format!("{} is a directory", join(&components))));
		}
		Ok(FileChannel::new(self.clone(), id))
	}

	/// Convenience: creates `path` if missing, then overwrites it entirely
	/// with `data`.
	///
	/// The overwrite itself (discarding old content and writing the new
	/// bytes) happens under a single write-lock acquisition, so a
	/// concurrent reader never observes the transient empty state between
	/// a truncate and the following write (§5 atomicity).
	pub fn write_file(&self, path: impl AsRef<str>, data: &[u8]) -> Result<()> {
		let path = path.as_ref();
		match self.create_file(path) {
			Ok(()) | Err(Error::AlreadyExists(_)) => {}
			Err(e) => return Err(e),
		}
		let components = normalize(path)?;
		let id = {
			let state = self.shared.state.read().unwrap();
			Self::resolve(&state, &components)?
		};
		self.overwrite_inode(id, data)
	}

	/// Convenience: reads a file's entire contents.
	pub fn read_file(&self, path: impl AsRef<str>) -> Result<Vec<u8>> {
		let mut chan = self.open_file(path)?;
		let size = chan.size()?;
		let mut buf = vec![0u8; size as usize];
		let mut read = 0usize;
		while read < buf.len() {
			let n = chan.read(&mut buf[read..])?;
			if n == 0 {
				break;
			}
			read += n;
		}
		buf.truncate(read);
		Ok(buf)
	}

	pub(crate) fn read_inode_at(&self, inode_id: u64, position: u64, dest: &mut [u8]) -> Result<usize> {
		self.check_open()?;
		let n = {
			let state = self.shared.state.read().unwrap();
			let inode = state
				.inodes
				.get(inode_id)
				.ok_or_else(|| Error::NotFound(format!("inode {inode_id}")))?;
			read_at(inode, position, dest, &self.shared.io)?
		};
		// Updating `accessed` is a separate, brief write-lock acquisition so
		// the actual read above stays concurrent with other readers (§5).
		if n > 0 {
			if let Some(inode) = self.shared.state.write().unwrap().inodes.get_mut(inode_id) {
				inode.touch_accessed();
			}
		}
		Ok(n)
	}

	pub(crate) fn write_inode_at(&self, inode_id: u64, position: u64, src: &[u8]) -> Result<usize> {
		self.check_writable()?;
		let mut state = self.shared.state.write().unwrap();
		let block_size = self.shared.io.block_size();
		let State { inodes, space, .. } = &mut *state;
		let inode = inodes
			.get_mut(inode_id)
			.ok_or_else(|| Error::NotFound(format!("inode {inode_id}")))?;
		write_at(inode, position, src, &self.shared.io, space, block_size)
	}

	pub(crate) fn truncate_inode(&self, inode_id: u64, new_size: u64) -> Result<()> {
		self.check_writable()?;
		let mut state = self.shared.state.write().unwrap();
		let block_size = self.shared.io.block_size();
		let State { inodes, space, .. } = &mut *state;
		let inode = inodes
			.get_mut(inode_id)
			.ok_or_else(|| Error::NotFound(format!("inode {inode_id}")))?;
		truncate_inode(inode, new_size, space, block_size);
		Ok(())
	}

	/// Discards an inode's current content and writes `data` from offset
	/// zero, all under one write-lock acquisition (§5 atomicity), so no
	/// concurrent read ever observes the empty state in between.
	pub(crate) fn overwrite_inode(&self, inode_id: u64, data: &[u8]) -> Result<()> {
		self.check_writable()?;
		let mut state = self.shared.state.write().unwrap();
		let block_size = self.shared.io.block_size();
		let State { inodes, space, .. } = &mut *state;
		let inode = inodes
			.get_mut(inode_id)
			.ok_or_else(|| Error::NotFound(format!("inode {inode_id}")))?;
		truncate_inode(inode, 0, space, block_size);
		write_at(inode, 0, data, &self.shared.io, space, block_size)?;
		Ok(())
	}

	pub(crate) fn inode_size(&self, inode_id: u64) -> Result<u64> {
		self.check_open()?;
		let state = self.shared.state.read().unwrap();
		Ok(state
			.inodes
			.get(inode_id)
			.ok_or_else(|| Error::NotFound(format!("inode {inode_id}")))?
			.size())
	}

	// ---- persistence --------------------------------------------------------

	/// Writes the in-memory tables back to the container and force-syncs
	/// the host file (§4.8.9).
	pub fn sync(&self) -> Result<()> {
		self.check_open()?;
		let mut state = self.shared.state.write().unwrap();
		persist_metadata(&self.shared.io, &mut state)?;
		self.shared.io.sync()
	}

	/// Persists, syncs, and releases the host handle. Idempotent.
	pub fn close(&self) -> Result<()> {
		if self.shared.closed.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		let result = (|| {
			let mut state = self.shared.state.write().unwrap();
			persist_metadata(&self.shared.io, &mut state)?;
			self.shared.io.sync()
		})();
		self.shared.io.close();
		result
	}
}

fn load_metadata(io: &ContainerIO, superblock: &Superblock) -> Result<(InodeTable, DirectoryTable, SpaceManager)> {
	if superblock.metadata_extents().is_empty() {
		log::warn!("container has no metadata extents");
		return Err(Error::InvalidFormat("no metadata extents in superblock".to_owned()));
	}
	let mut bytes = Vec::new();
	for ext in superblock.metadata_extents() {
		let chunk = io.read_blocks(ext.start(), ext.count())?;
		bytes.extend_from_slice(&chunk);
	}
	MetadataSerializer::deserialize(&bytes)
}

fn persist_metadata(io: &ContainerIO, state: &mut State) -> Result<()> {
	let block_size = io.block_size();
	let mut current_extents = state.superblock.metadata_extents().to_vec();

	loop {
		let bytes = MetadataSerializer::serialize(&state.inodes, &state.dirs, &state.space);
		let blocks_needed = ceil_division(bytes.len() as u64, block_size as u64) as u32;
		let have: u64 = current_extents.iter().map(|e| e.count() as u64).sum();
		if have >= blocks_needed as u64 {
			write_into_extents(io, &current_extents, &bytes, block_size)?;
			break;
		}
		log::debug!(
			"persist_metadata: {} blocks needed, {} held, reallocating",
			blocks_needed,
			have
		);
		state.space.free_all(current_extents.drain(..));
		let allocated = state.space.allocate_multiple(blocks_needed);
		if allocated.is_empty() {
			log::warn!("no space left persisting metadata ({blocks_needed} blocks needed)");
			return Err(Error::NoSpace);
		}
		current_extents = allocated;
		state.superblock.set_metadata_extents(current_extents.clone())?;
	}

	state.superblock.set_metadata_extents(current_extents)?;
	io.write_superblock(&state.superblock)
}

fn write_into_extents(io: &ContainerIO, extents: &[Extent], bytes: &[u8], block_size: u32) -> Result<()> {
	let mut offset = 0usize;
	for ext in extents {
		let cap = ext.byte_len(block_size) as usize;
		let take = cap.min(bytes.len().saturating_sub(offset));
		let mut chunk = vec![0u8; cap];
		if take > 0 {
			chunk[..take].copy_from_slice(&bytes[offset..offset + take]);
		}
		io.write_blocks(ext.start(), &chunk)?;
		offset += take;
	}
	Ok(())
}

/// Cumulative logical byte range covered by each extent, in inode order.
fn extent_ranges(extents: &[Extent], block_size: u32) -> Vec<(u64, u64)> {
	let mut ranges = Vec::with_capacity(extents.len());
	let mut cursor = 0u64;
	for ext in extents {
		let len = ext.byte_len(block_size);
		ranges.push((cursor, cursor + len));
		cursor += len;
	}
	ranges
}

fn read_at(inode: &Inode, position: u64, dest: &mut [u8], io: &ContainerIO) -> Result<usize> {
	if position >= inode.size() || dest.is_empty() {
		return Ok(0);
	}
	let block_size = io.block_size();
	let ranges = extent_ranges(inode.extents(), block_size);
	let mut total = 0usize;
	let mut pos = position;
	let limit = inode.size();

	while total < dest.len() && pos < limit {
		let idx = ranges
			.iter()
			.position(|(start, end)| pos >= *start && pos < *end)
			.ok_or_else(|| Error::Invalid("logical position outside allocated extents".to_owned()))?;
		let (range_start, range_end) = ranges[idx];
		let offset_in_extent = pos - range_start;
		let want = (range_end - pos).min((dest.len() - total) as u64).min(limit - pos) as usize;
		let n = io.read_from_extent(&inode.extents()[idx], offset_in_extent, &mut dest[total..total + want])?;
		if n <= 0 {
			break;
		}
		total += n as usize;
		pos += n as u64;
	}
	Ok(total)
}

fn write_at(
	inode: &mut Inode,
	position: u64,
	src: &[u8],
	io: &ContainerIO,
	space: &mut SpaceManager,
	block_size: u32,
) -> Result<usize> {
	if src.is_empty() {
		return Ok(0);
	}
	let end = position + src.len() as u64;
	let allocated_bytes = inode.allocated_bytes(block_size);
	if end > allocated_bytes {
		let needed_bytes = end - allocated_bytes;
		let needed_blocks = ceil_division(needed_bytes, block_size as u64) as u32;
		let new_extents = space.allocate_multiple(needed_blocks);
		if new_extents.is_empty() {
			log::warn!("no space left growing file to {end} bytes");
			return Err(Error::NoSpace);
		}
		inode.append_extents(new_extents);
	}

	// A write starting past the current end of file leaves a hole; the
	// blocks backing it may still hold another (deleted) file's bytes, so
	// zero them rather than leaving stale data visible to later reads.
	let old_size = inode.size();
	if position > old_size {
		zero_fill(inode, old_size, position, io, block_size)?;
	}

	let ranges = extent_ranges(inode.extents(), block_size);
	let mut total = 0usize;
	let mut pos = position;
	while total < src.len() {
		let idx = ranges
			.iter()
			.position(|(start, end)| pos >= *start && pos < *end)
			.ok_or_else(|| Error::Invalid("write position outside allocated extents".to_owned()))?;
		let (range_start, range_end) = ranges[idx];
		let offset_in_extent = pos - range_start;
		let want = (range_end - pos).min((src.len() - total) as u64) as usize;
		let n = io.write_to_extent(&inode.extents()[idx], offset_in_extent, &src[total..total + want])?;
		if n == 0 {
			break;
		}
		total += n;
		pos += n as u64;
	}

	if end > inode.size() {
		inode.set_size(end);
	}
	inode.touch_modified();
	Ok(total)
}

/// Zero-fills the logical byte range `[from, to)`, which must already lie
/// within `inode`'s allocated extents. Used to scrub a hole left by a write
/// that starts past the file's current size.
fn zero_fill(inode: &Inode, from: u64, to: u64, io: &ContainerIO, block_size: u32) -> Result<()> {
	if from >= to {
		return Ok(());
	}
	let ranges = extent_ranges(inode.extents(), block_size);
	let mut pos = from;
	while pos < to {
		let idx = ranges
			.iter()
			.position(|(start, end)| pos >= *start && pos < *end)
			.ok_or_else(|| Error::Invalid("zero-fill position outside allocated extents".to_owned()))?;
		let (range_start, range_end) = ranges[idx];
		let offset_in_extent = pos - range_start;
		let want = (range_end - pos).min(to - pos) as usize;
		let zeros = vec![0u8; want];
		io.write_to_extent(&inode.extents()[idx], offset_in_extent, &zeros)?;
		pos += want as u64;
	}
	Ok(())
}

fn truncate_inode(inode: &mut Inode, new_size: u64, space: &mut SpaceManager, block_size: u32) {
	if new_size >= inode.size() {
		return;
	}
	let blocks_needed = ceil_division(new_size, block_size as u64);
	let mut kept = Vec::new();
	let mut freed = Vec::new();
	let mut consumed = 0u64;

	for ext in inode.extents() {
		if consumed >= blocks_needed {
			freed.push(*ext);
			continue;
		}
		let remaining = blocks_needed - consumed;
		if (ext.count() as u64) <= remaining {
			kept.push(*ext);
			consumed += ext.count() as u64;
		} else {
			let (prefix, suffix) = ext
				.split_at(remaining as u32)
				.expect("remaining < ext.count() in the straddling branch");
			kept.push(prefix);
			if let Some(suffix) = suffix {
				freed.push(suffix);
			}
			consumed += remaining;
		}
	}

	space.free_all(freed);
	inode.set_extents(kept);
	inode.set_size(new_size);
	inode.touch_modified();
}

fn copy_bytes(io: &ContainerIO, src_extents: &[Extent], dst_extents: &[Extent], size: u64, block_size: u32) -> Result<()> {
	let mut remaining = size;
	let mut buf = vec![0u8; block_size as usize];
	let src_ranges = extent_ranges(src_extents, block_size);
	let dst_ranges = extent_ranges(dst_extents, block_size);
	let mut pos = 0u64;

	while remaining > 0 {
		let chunk = (block_size as u64).min(remaining) as usize;
		let src_idx = src_ranges
			.iter()
			.position(|(start, end)| pos >= *start && pos < *end)
			.expect("size is within the source extents by construction");
		let dst_idx = dst_ranges
			.iter()
			.position(|(start, end)| pos >= *start && pos < *end)
			.expect("size is within the destination extents by construction");
		let src_off = pos - src_ranges[src_idx].0;
		let dst_off = pos - dst_ranges[dst_idx].0;
		let n = io.read_from_extent(&src_extents[src_idx], src_off, &mut buf[..chunk])?;
		let n = if n < 0 { 0 } else { n as usize };
		io.write_to_extent(&dst_extents[dst_idx], dst_off, &buf[..n])?;
		pos += chunk as u64;
		remaining -= chunk as u64;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn open_fresh(block_size: u32, total_blocks: u64) -> (FileSystem, tempfile::TempDir) {
		let dir = tempdir().unwrap();
		let path = dir.path().join("c.box");
		let opts = OpenOptions::new().create(true).block_size(block_size).total_blocks(total_blocks);
		(FileSystem::open(&path, &opts).unwrap(), dir)
	}

	#[test]
	fn create_read_write_roundtrip() {
		let (fs, _dir) = open_fresh(4096, 256);
		fs.write_file("/test.txt", b"Hello, BoxFS!").unwrap();
		assert_eq!(fs.read_file("/test.txt").unwrap(), b"Hello, BoxFS!");
	}

	#[test]
	fn persistence_across_reopen() {
		let (fs, dir) = open_fresh(4096, 256);
		let path = dir.path().join("c.box");
		fs.create_directory("/a").unwrap();
		fs.create_directory("/a/b").unwrap();
		fs.write_file("/a/file1.txt", b"Content 1").unwrap();
		fs.write_file("/a/b/file2.txt", b"Content 2").unwrap();
		fs.close().unwrap();

		let fs2 = FileSystem::open(&path, &OpenOptions::new()).unwrap();
		assert_eq!(fs2.read_file("/a/file1.txt").unwrap(), b"Content 1");
		assert_eq!(fs2.read_file("/a/b/file2.txt").unwrap(), b"Content 2");
	}

	#[test]
	fn truncate_shrinks_file() {
		let (fs, _dir) = open_fresh(512, 16);
		fs.write_file("/t.txt", b"0123456789").unwrap();
		let mut chan = fs.open_file("/t.txt").unwrap();
		chan.truncate(5).unwrap();
		assert_eq!(fs.read_file("/t.txt").unwrap(), b"01234");
		assert_eq!(fs.stat("/t.txt").unwrap().size, 5);
	}

	#[test]
	fn random_access_read() {
		let (fs, _dir) = open_fresh(512, 16);
		fs.write_file("/s.bin", &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
		let mut chan = fs.open_file("/s.bin").unwrap();
		chan.set_position(5);
		let mut buf = [0u8; 5];
		chan.read(&mut buf).unwrap();
		assert_eq!(buf, [5, 6, 7, 8, 9]);
	}

	#[test]
	fn move_replace_existing_type_conflict() {
		let (fs, _dir) = open_fresh(512, 16);
		fs.create_file("/src.txt").unwrap();
		fs.create_directory("/dst").unwrap();
		let err = fs.mv("/src.txt", "/dst", true).unwrap_err();
		assert!(matches!(&err, Error::Invalid(msg) if msg.contains("Cannot replace directory with file")));
		assert!(fs.stat("/src.txt").is_ok());
		assert!(fs.stat("/dst").is_ok());
	}

	#[test]
	fn move_rejects_directory_into_its_own_descendant() {
		let (fs, _dir) = open_fresh(512, 16);
		fs.create_directory("/a").unwrap();
		fs.create_directory("/a/b").unwrap();
		let err = fs.mv("/a", "/a/b/a", false).unwrap_err();
		assert!(matches!(&err, Error::Invalid(msg) if msg.contains("own descendants")));
		assert!(fs.stat("/a/b").is_ok());
	}

	#[test]
	fn move_rejects_directory_into_itself() {
		let (fs, _dir) = open_fresh(512, 16);
		fs.create_directory("/a").unwrap();
		let err = fs.mv("/a", "/a/renamed", false).unwrap_err();
		assert!(matches!(&err, Error::Invalid(msg) if msg.contains("own descendants")));
	}

	#[test]
	fn write_past_end_zero_fills_the_hole_even_over_reused_blocks() {
		let (fs, _dir) = open_fresh(512, 16);
		fs.write_file("/a.txt", &[0xAAu8; 512]).unwrap();
		fs.delete("/a.txt").unwrap();

		fs.create_file("/b.txt").unwrap();
		let mut chan = fs.open_file("/b.txt").unwrap();
		chan.set_position(100);
		chan.write(b"hello").unwrap();

		let data = fs.read_file("/b.txt").unwrap();
		assert_eq!(data.len(), 105);
		assert!(data[..100].iter().all(|&b| b == 0), "hole must read back as zeros");
		assert_eq!(&data[100..105], b"hello");
	}

	#[test]
	fn delete_rejects_nonempty_directory() {
		let (fs, _dir) = open_fresh(512, 16);
		fs.create_directory("/d").unwrap();
		fs.create_file("/d/a.txt").unwrap();
		assert!(matches!(fs.delete("/d"), Err(Error::DirectoryNotEmpty(_))));
	}

	#[test]
	fn copy_duplicates_bytes_independently() {
		let (fs, _dir) = open_fresh(512, 16);
		fs.write_file("/a.txt", b"copy me").unwrap();
		fs.cp("/a.txt", "/b.txt", false).unwrap();
		assert_eq!(fs.read_file("/b.txt").unwrap(), b"copy me");
		fs.write_file("/a.txt", b"changed!").unwrap();
		assert_eq!(fs.read_file("/b.txt").unwrap(), b"copy me");
	}

	#[test]
	fn read_only_rejects_mutation() {
		let (fs, dir) = open_fresh(512, 16);
		let path = dir.path().join("c.box");
		fs.write_file("/a.txt", b"x").unwrap();
		fs.close().unwrap();
		let ro = FileSystem::open(&path, &OpenOptions::new().read_only(true)).unwrap();
		assert!(matches!(ro.create_file("/b.txt"), Err(Error::ReadOnly(_))));
		assert_eq!(ro.read_file("/a.txt").unwrap(), b"x");
	}

	#[test]
	fn no_space_fails_deterministically() {
		let (fs, _dir) = open_fresh(512, 4);
		// Only 4 blocks total; a large write should eventually exhaust them.
		let big = vec![7u8; 512 * 10];
		assert!(matches!(fs.write_file("/big.bin", &big), Err(Error::NoSpace)));
	}

	#[test]
	fn reading_a_file_updates_accessed_timestamp() {
		let (fs, _dir) = open_fresh(512, 16);
		fs.write_file("/a.txt", b"x").unwrap();
		let before = fs.stat("/a.txt").unwrap().timestamps.accessed;
		std::thread::sleep(std::time::Duration::from_millis(5));
		fs.read_file("/a.txt").unwrap();
		let after = fs.stat("/a.txt").unwrap().timestamps.accessed;
		assert!(after > before, "accessed timestamp must advance after a read");
	}

	#[test]
	fn failed_copy_replace_leaves_existing_target_intact() {
		let (fs, _dir) = open_fresh(512, 4);
		fs.write_file("/dst.bin", &[1u8; 1024]).unwrap();
		fs.write_file("/src.bin", &[2u8; 1024]).unwrap();
		// All 4 blocks are now spoken for; copying /src.bin over /dst.bin
		// needs 2 more blocks before the old ones can be freed.
		assert!(matches!(fs.cp("/src.bin", "/dst.bin", true), Err(Error::NoSpace)));
		assert_eq!(fs.read_file("/dst.bin").unwrap(), vec![1u8; 1024]);
	}
}
