//! The parent/child index: a two-way table mapping `(parent inode, name)`
//! to a child inode id, and back.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::inode::ROOT_INODE_ID;

/// Longest a directory entry's name may be, in UTF-8 bytes (§3).
pub const MAX_NAME_BYTES: usize = 255;

/// Fails with [`Error::Invalid`] unless `name` is non-empty, at most
/// [`MAX_NAME_BYTES`] UTF-8 bytes, and contains no `/` (§3).
fn validate_name(name: &str) -> Result<()> {
	if name.is_empty() {
		return Err(Error::Invalid("directory entry name must not be empty".to_owned()));
	}
	if name.as_bytes().len() > MAX_NAME_BYTES {
		return Err(Error::Invalid(format!(
			"directory entry name {name:?} exceeds {MAX_NAME_BYTES} UTF-8 bytes"
		)));
	}
	if name.contains('/') {
		return Err(Error::Invalid(format!(
			"directory entry name {name:?} must not contain '/'"
		)));
	}
	Ok(())
}

/// A single directory entry: an edge from a parent directory to a child
/// inode, labeled with the child's name within that directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
	pub parent: u64,
	pub name: String,
	pub child: u64,
}

/// Two-way index over [`DirEntry`] rows: children-of-parent for listing and
/// resolution, parent-of-child for the name a given inode is known by.
#[derive(Debug, Default)]
pub struct DirectoryTable {
	children: HashMap<u64, HashMap<String, u64>>,
	parent_of: HashMap<u64, (u64, String)>,
}

impl DirectoryTable {
	pub fn new() -> Self {
		Self {
			children: HashMap::new(),
			parent_of: HashMap::new(),
		}
	}

	/// Registers the root directory as its own top, with no parent entry.
	pub fn init_root(&mut self) {
		self.children.entry(ROOT_INODE_ID).or_default();
	}

	/// Looks up the child of `parent` named `name`.
	pub fn lookup(&self, parent: u64, name: &str) -> Option<u64> {
		self.children.get(&parent)?.get(name).copied()
	}

	/// Lists the `(name, child id)` pairs directly under `parent`, sorted by
	/// name for deterministic iteration.
	pub fn list(&self, parent: u64) -> Result<Vec<(String, u64)>> {
		let map = self
			.children
			.get(&parent)
			.ok_or_else(|| Error::NotFound(format!("directory inode {parent}")))?;
		let mut entries: Vec<(String, u64)> = map.iter().map(|(n, c)| (n.clone(), *c)).collect();
		entries.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(entries)
	}

	/// `true` if `parent` has no children.
	pub fn is_empty(&self, parent: u64) -> bool {
		self.children.get(&parent).map(|m| m.is_empty()).unwrap_or(true)
	}

	/// The `(parent, name)` under which `child` is currently linked, if any.
	pub fn parent_of(&self, child: u64) -> Option<(u64, &str)> {
		self.parent_of.get(&child).map(|(p, n)| (*p, n.as_str()))
	}

	/// Links `child` under `parent` as `name`. Also registers `child` as a
	/// directory node so it can itself hold entries.
	///
	/// Fails with [`Error::AlreadyExists`] if `name` is already taken under
	/// `parent`.
	pub fn link(&mut self, parent: u64, name: &str, child: u64) -> Result<()> {
		validate_name(name)?;
		let siblings = self
			.children
			.get(&parent)
			.ok_or_else(|| Error::NotFound(format!("directory inode {parent}")))?;
		if siblings.contains_key(name) {
			return Err(Error::AlreadyExists(name.to_owned()));
		}
		self.children
			.get_mut(&parent)
			.expect("checked above")
			.insert(name.to_owned(), child);
		self.children.entry(child).or_default();
		self.parent_of.insert(child, (parent, name.to_owned()));
		Ok(())
	}

	/// Unlinks `child` (named `name`) from `parent` and drops its own child
	/// map entry too. Fails with [`Error::DirectoryNotEmpty`] if `child`
	/// still has entries of its own, so a grandchild can never be silently
	/// discarded.
	pub fn unlink(&mut self, parent: u64, name: &str) -> Result<u64> {
		let child = *self
			.children
			.get(&parent)
			.ok_or_else(|| Error::NotFound(format!("directory inode {parent}")))?
			.get(name)
			.ok_or_else(|| Error::NotFound(name.to_owned()))?;
		if !self.is_empty(child) {
			return Err(Error::DirectoryNotEmpty(name.to_owned()));
		}
		self.children
			.get_mut(&parent)
			.expect("checked above")
			.remove(name);
		self.parent_of.remove(&child);
		self.children.remove(&child);
		Ok(child)
	}

	/// Whether `ancestor` is `node` itself, or is reached by walking `node`'s
	/// parent chain up to the root. Used to reject moves that would nest a
	/// directory inside itself or one of its own descendants.
	pub fn is_ancestor(&self, ancestor: u64, node: u64) -> bool {
		let mut current = node;
		loop {
			if current == ancestor {
				return true;
			}
			match self.parent_of(current) {
				Some((parent, _)) => current = parent,
				None => return false,
			}
		}
	}

	/// Renames/moves `child` from its current parent/name to
	/// `(new_parent, new_name)`, preserving its own children map.
	pub fn relink(&mut self, child: u64, new_parent: u64, new_name: &str) -> Result<()> {
		validate_name(new_name)?;
		if self
			.children
			.get(&new_parent)
			.ok_or_else(|| Error::NotFound(format!("directory inode {new_parent}")))?
			.contains_key(new_name)
		{
			return Err(Error::AlreadyExists(new_name.to_owned()));
		}
		if let Some((old_parent, old_name)) = self.parent_of.get(&child).cloned() {
			self.children
				.get_mut(&old_parent)
				.expect("parent_of is kept consistent with children")
				.remove(&old_name);
		}
		self.children
			.get_mut(&new_parent)
			.expect("checked above")
			.insert(new_name.to_owned(), child);
		self.parent_of.insert(child, (new_parent, new_name.to_owned()));
		Ok(())
	}

	/// All `(parent, name, child)` rows, in unspecified order — used only by
	/// the metadata serializer.
	pub fn all_entries(&self) -> Vec<DirEntry> {
		let mut out = Vec::new();
		for (parent, names) in &self.children {
			for (name, child) in names {
				out.push(DirEntry {
					parent: *parent,
					name: name.clone(),
					child: *child,
				});
			}
		}
		out
	}

	/// Clears the table entirely and reinstates a fresh root (used before a
	/// metadata deserialize pass, §4.7).
	pub fn clear(&mut self) {
		self.children.clear();
		self.parent_of.clear();
		self.init_root();
	}

	/// Rebuilds the table from a flat entry list, as decoded from a
	/// container's metadata region. The encoded order is not assumed to be
	/// parent-before-child, so every parent and child slot is created in a
	/// first pass before any links are made in a second.
	pub fn rebuild(&mut self, entries: impl IntoIterator<Item = DirEntry>) -> Result<()> {
		let entries: Vec<DirEntry> = entries.into_iter().collect();
		for e in &entries {
			self.children.entry(e.parent).or_default();
			self.children.entry(e.child).or_default();
		}
		for e in entries {
			self.link(e.parent, &e.name, e.child)?;
		}
		Ok(())
	}
}
