//! Process-wide registry enforcing one open [`FileSystem`] per container
//! path (§4.11, §9 design notes).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::options::OpenOptions;

fn registry() -> &'static Mutex<HashMap<PathBuf, FileSystem>> {
	static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, FileSystem>>> = OnceLock::new();
	REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Canonicalizes `path` even if it doesn't exist yet, by canonicalizing its
/// parent directory and re-joining the file name.
fn canonical_key(path: &Path) -> Result<PathBuf> {
	match path.canonicalize() {
		Ok(p) => Ok(p),
		Err(_) => {
			let file_name = path
				.file_name()
				.ok_or_else(|| Error::Invalid(format!("path has no file name: {}", path.display())))?;
			let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
			let canonical_parent = parent
				.canonicalize()
				.map_err(|_| Error::NotFound(path.display().to_string()))?;
			Ok(canonical_parent.join(file_name))
		}
	}
}

/// The process-wide table of open containers.
///
/// `open` is atomic: two threads racing to open the same container path
/// either both receive a clone of the same live [`FileSystem`] handle, or
/// the later one does if the first is still winning the race.
pub struct Registry;

impl Registry {
	/// Opens `path` through the registry, sharing a single [`FileSystem`]
	/// handle across every caller for the same canonical path.
	pub fn open(path: impl AsRef<Path>, options: &OpenOptions) -> Result<FileSystem> {
		let key = canonical_key(path.as_ref())?;
		let mut map = registry().lock().unwrap();
		if let Some(existing) = map.get(&key) {
			return Ok(existing.clone());
		}
		let fs = FileSystem::open(path.as_ref(), options)?;
		map.insert(key, fs.clone());
		Ok(fs)
	}

	/// Closes and removes the registry entry for `path`, if any.
	pub fn close(path: impl AsRef<Path>) -> Result<()> {
		let key = canonical_key(path.as_ref())?;
		let fs = registry().lock().unwrap().remove(&key);
		match fs {
			Some(fs) => fs.close(),
			None => Ok(()),
		}
	}

	/// The number of currently-registered open containers. Exposed for
	/// tests.
	#[cfg(test)]
	pub(crate) fn len() -> usize {
		registry().lock().unwrap().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn open_twice_shares_one_handle() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("c.box");
		let opts = OpenOptions::new().create(true).total_blocks(16);

		let a = Registry::open(&path, &opts).unwrap();
		let b = Registry::open(&path, &opts).unwrap();
		a.create_file("/f.txt").unwrap();
		assert!(b.stat("/f.txt").is_ok());

		Registry::close(&path).unwrap();
	}

	#[test]
	fn close_removes_entry() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("c2.box");
		let opts = OpenOptions::new().create(true).total_blocks(16);
		let before = Registry::len();
		let _fs = Registry::open(&path, &opts).unwrap();
		assert_eq!(Registry::len(), before + 1);
		Registry::close(&path).unwrap();
		assert_eq!(Registry::len(), before);
	}
}
