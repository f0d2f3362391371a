//! Small arithmetic helpers shared by the block-level modules.

use std::time::{SystemTime, UNIX_EPOCH};

/// Divides `n` by `d`, rounding up.
#[inline]
pub fn ceil_division(n: u64, d: u64) -> u64 {
	(n + d - 1) / d
}

/// Returns `true` if `n` is a power of two and at least `min`.
#[inline]
pub fn is_valid_block_size(n: u32) -> bool {
	n >= 512 && n.is_power_of_two()
}

/// The current time as epoch-milliseconds, the timestamp format stored in
/// inodes (§3, §6).
pub fn now_millis() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as i64)
		.unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ceil_div() {
		assert_eq!(ceil_division(0, 4096), 0);
		assert_eq!(ceil_division(1, 4096), 1);
		assert_eq!(ceil_division(4096, 4096), 1);
		assert_eq!(ceil_division(4097, 4096), 2);
	}

	#[test]
	fn block_size_validation() {
		assert!(is_valid_block_size(512));
		assert!(is_valid_block_size(4096));
		assert!(!is_valid_block_size(511));
		assert!(!is_valid_block_size(600));
		assert!(!is_valid_block_size(0));
	}

}
