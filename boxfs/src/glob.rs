//! `PathMatcher`: compiles a `"glob:PATTERN"` or `"regex:PATTERN"` string
//! into something that can test a normalized path for a match (§4.8.11).

use regex::Regex;

use crate::error::{Error, Result};

/// A compiled path pattern, built from either glob or regex source syntax.
pub struct PathMatcher {
	regex: Regex,
}

impl PathMatcher {
	/// Compiles `spec`, which must be prefixed with `"glob:"` or
	/// `"regex:"`.
	///
	/// Fails with [`Error::Invalid`] on a missing/unrecognized prefix or a
	/// pattern that does not compile.
	pub fn compile(spec: &str) -> Result<Self> {
		if let Some(pattern) = spec.strip_prefix("glob:") {
			let translated = glob_to_regex(pattern)?;
			let regex = Regex::new(&translated)
				.map_err(|e| Error::Invalid(format!("bad glob pattern {pattern:?}: {e}")))?;
			Ok(Self { regex })
		} else if let Some(pattern) = spec.strip_prefix("regex:") {
			let regex = Regex::new(pattern)
				.map_err(|e| Error::Invalid(format!("bad regex pattern {pattern:?}: {e}")))?;
			Ok(Self { regex })
		} else {
			Err(Error::Invalid(format!(
				"pattern must start with \"glob:\" or \"regex:\": {spec:?}"
			)))
		}
	}

	/// Whether `path` (a root-anchored display path, e.g. `"/a/b.txt"`)
	/// matches this pattern in full.
	pub fn matches(&self, path: &str) -> bool {
		self.regex.is_match(path)
	}
}

/// Translates a shell-style glob into an anchored regular expression.
///
/// Supported syntax: `?` (one character except `/`), `*` (zero or more
/// characters except `/`), `**` (zero or more characters, including `/`),
/// `[...]`/`[!...]` character classes, `{a,b,c}` alternation groups, and
/// `\` to escape the next character literally.
fn glob_to_regex(pattern: &str) -> Result<String> {
	let mut out = String::from("^");
	let chars: Vec<char> = pattern.chars().collect();
	let mut i = 0;
	let mut brace_depth = 0usize;

	while i < chars.len() {
		let c = chars[i];
		match c {
			'\\' => {
				i += 1;
				match chars.get(i) {
					Some(escaped) => {
						out.push_str(&regex::escape(&escaped.to_string()));
					}
					None => {
						return Err(Error::Invalid(
							"glob pattern ends with a dangling escape".to_owned(),
						))
					}
				}
			}
			'*' => {
				if chars.get(i + 1) == Some(&'*') {
					if chars.get(i + 2) == Some(&'/') {
						// `**/` also matches zero directories, so `a/**/b`
						// matches `a/b` as well as `a/x/y/b`.
						out.push_str("(?:.*/)?");
						i += 2;
					} else {
						out.push_str(".*");
						i += 1;
					}
				} else {
					out.push_str("[^/]*");
				}
			}
			'?' => out.push_str("[^/]"),
			'[' => {
				let mut j = i + 1;
				let negate = chars.get(j) == Some(&'!');
				if negate {
					j += 1;
				}
				let class_start = j;
				while j < chars.len() && chars[j] != ']' {
					j += 1;
				}
				if j >= chars.len() {
					return Err(Error::Invalid(format!(
						"unterminated character class in glob pattern {pattern:?}"
					)));
				}
				let class: String = chars[class_start..j].iter().collect();
				if class.contains('/') {
					return Err(Error::Invalid(format!(
						"character class must not contain '/' in glob pattern {pattern:?}"
					)));
				}
				out.push('[');
				if negate {
					out.push('^');
				}
				out.push_str(&class.replace('\\', "\\\\"));
				out.push(']');
				i = j;
			}
			'{' => {
				brace_depth += 1;
				out.push('(');
			}
			'}' => {
				if brace_depth == 0 {
					return Err(Error::Invalid(format!(
						"unmatched '}}' in glob pattern {pattern:?}"
					)));
				}
				brace_depth -= 1;
				out.push(')');
			}
			',' if brace_depth > 0 => out.push('|'),
			other => out.push_str(&regex::escape(&other.to_string())),
		}
		i += 1;
	}

	if brace_depth != 0 {
		return Err(Error::Invalid(format!(
			"unmatched '{{' in glob pattern {pattern:?}"
		)));
	}

	out.push('$');
	Ok(out)
}
