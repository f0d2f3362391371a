//! Path normalization: turns a user-supplied path string into an ordered
//! list of path components relative to the root (§4.8.1).

use crate::error::{Error, Result};

/// Splits and normalizes a slash-separated path into its components.
///
/// `.` components are dropped, `..` pops the previous component (it is an
/// error to `..` past the root), empty components from repeated or leading
/// slashes are ignored, and a bare `"/"` or `""` normalizes to the root (no
/// components at all).
pub fn normalize(path: &str) -> Result<Vec<String>> {
	let mut components: Vec<String> = Vec::new();
	for part in path.split('/') {
		match part {
			"" | "." => continue,
			".." => {
				if components.pop().is_none() {
					return Err(Error::Invalid(format!(
						"path escapes the root: {path}"
					)));
				}
			}
			other => components.push(other.to_owned()),
		}
	}
	Ok(components)
}

/// Re-joins normalized components into a canonical, root-anchored display
/// path (used for error messages and `stat`-style output).
pub fn join(components: &[String]) -> String {
	if components.is_empty() {
		"/".to_owned()
	} else {
		format!("/{}", components.join("/"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn root_paths_normalize_empty() {
		assert_eq!(normalize("/").unwrap(), Vec::<String>::new());
		assert_eq!(normalize("").unwrap(), Vec::<String>::new());
		assert_eq!(normalize(".").unwrap(), Vec::<String>::new());
	}

	#[test]
	fn collapses_repeated_slashes_and_dot() {
		assert_eq!(
			normalize("//a///b/./c/").unwrap(),
			vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]
		);
	}

	#[test]
	fn dot_dot_pops_previous_component() {
		assert_eq!(
			normalize("/a/b/../c").unwrap(),
			vec!["a".to_owned(), "c".to_owned()]
		);
	}

	#[test]
	fn dot_dot_past_root_is_invalid() {
		assert!(normalize("/..").is_err());
		assert!(normalize("/a/../..").is_err());
	}

	#[test]
	fn join_round_trips() {
		assert_eq!(join(&normalize("/a/b").unwrap()), "/a/b");
		assert_eq!(join(&normalize("/").unwrap()), "/");
	}
}
