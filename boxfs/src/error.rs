//! The error type returned by every fallible operation in this crate.
//!
//! Each variant carries the offending path or identifier so that callers do
//! not need to reconstruct context after the fact.

use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Failure kinds produced by the file system core.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// A path did not resolve, or the container file is missing.
	#[error("not found: {0}")]
	NotFound(String),
	/// The target of a create/move/copy already exists.
	#[error("already exists: {0}")]
	AlreadyExists(String),
	/// An operation expected a directory but found a file.
	#[error("not a directory: {0}")]
	NotDirectory(String),
	/// A directory delete/replace target still has children.
	#[error("directory not empty: {0}")]
	DirectoryNotEmpty(String),
	/// A bad argument or a forbidden operation (deleting root, copying a
	/// directory, a type-incompatible replace).
	#[error("invalid: {0}")]
	Invalid(String),
	/// The allocator could not satisfy a request.
	#[error("no space left in container")]
	NoSpace,
	/// A mutator was attempted on a read-only file system.
	#[error("read-only: {0}")]
	ReadOnly(String),
	/// An operation was attempted on an already-closed file system or
	/// channel.
	#[error("closed: {0}")]
	Closed(String),
	/// The superblock or metadata region failed validation.
	#[error("invalid format: {0}")]
	InvalidFormat(String),
	/// Host file I/O failed.
	#[error("I/O failure: {0}")]
	IoFailure(#[from] io::Error),
}

impl Error {
	/// Builds an [`Error::Invalid`] describing a type-incompatible replace,
	/// in the exact wording relied upon by callers (§4.8.4).
	pub(crate) fn replace_type_conflict(existing_is_dir: bool) -> Error {
		let (existing, incoming) = if existing_is_dir {
			("directory", "file")
		} else {
			("file", "directory")
		};
		Error::Invalid(format!("Cannot replace {existing} with {incoming}"))
	}
}
