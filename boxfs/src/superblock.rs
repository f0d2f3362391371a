//! The fixed first-block header: magic, version, geometry, and the current
//! location of the metadata region.
//!
//! Layout is big-endian (§6), occupies exactly one block at container offset
//! 0, zero-padded past the last metadata extent entry.

use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::util::is_valid_block_size;

/// `"BOXF"`.
pub const MAGIC: u32 = 0x424F_5846;
/// The only on-disk version this implementation understands.
pub const VERSION: u32 = 1;

/// Byte offset, within block 0, of the start of the metadata extent array.
const EXTENTS_OFFSET: usize = 24;
/// Encoded size of a single `{startBlock: u64, blockCount: u32}` entry.
const EXTENT_ENTRY_SIZE: usize = 12;

/// The container's fixed first-block header.
#[derive(Debug, Clone)]
pub struct Superblock {
	block_size: u32,
	total_blocks: u64,
	metadata_extents: Vec<Extent>,
}

impl Superblock {
	/// The maximum number of metadata extents that fit in one block, given
	/// `block_size`.
	pub fn max_extents(block_size: u32) -> usize {
		(block_size as usize - EXTENTS_OFFSET) / EXTENT_ENTRY_SIZE
	}

	/// Creates a fresh superblock with no metadata extents yet assigned.
	///
	/// Fails with [`Error::Invalid`] if `block_size` is not a power of two
	/// `>= 512`.
	pub fn new(block_size: u32, total_blocks: u64) -> Result<Self> {
		if !is_valid_block_size(block_size) {
			return Err(Error::Invalid(format!(
				"block size {block_size} must be a power of two >= 512"
			)));
		}
		Ok(Self {
			block_size,
			total_blocks,
			metadata_extents: Vec::new(),
		})
	}

	#[inline]
	pub fn block_size(&self) -> u32 {
		self.block_size
	}

	#[inline]
	pub fn total_blocks(&self) -> u64 {
		self.total_blocks
	}

	#[inline]
	pub fn metadata_extents(&self) -> &[Extent] {
		&self.metadata_extents
	}

	/// Replaces the current metadata extent list.
	///
	/// Fails with [`Error::Invalid`] if the list is too large to fit in one
	/// block.
	pub fn set_metadata_extents(&mut self, extents: Vec<Extent>) -> Result<()> {
		if extents.len() > Self::max_extents(self.block_size) {
			return Err(Error::Invalid(format!(
				"{} metadata extents exceed the per-block maximum of {}",
				extents.len(),
				Self::max_extents(self.block_size)
			)));
		}
		self.metadata_extents = extents;
		Ok(())
	}

	/// Serializes the superblock into a `block_size`-byte, zero-padded
	/// buffer.
	pub fn serialize(&self) -> Vec<u8> {
		let mut buf = vec![0u8; self.block_size as usize];
		buf[0..4].copy_from_slice(&MAGIC.to_be_bytes());
		buf[4..8].copy_from_slice(&VERSION.to_be_bytes());
		buf[8..12].copy_from_slice(&self.block_size.to_be_bytes());
		buf[12..20].copy_from_slice(&self.total_blocks.to_be_bytes());
		buf[20..24].copy_from_slice(&(self.metadata_extents.len() as u32).to_be_bytes());
		let mut off = EXTENTS_OFFSET;
		for ext in &self.metadata_extents {
			buf[off..off + 8].copy_from_slice(&ext.start().to_be_bytes());
			buf[off + 8..off + 12].copy_from_slice(&ext.count().to_be_bytes());
			off += EXTENT_ENTRY_SIZE;
		}
		buf
	}

	/// Parses a superblock out of a raw block buffer.
	///
	/// Fails with [`Error::InvalidFormat`] on a wrong magic, unsupported
	/// version, or an extent count out of range for the encoded block size.
	pub fn deserialize(bytes: &[u8]) -> Result<Self> {
		if bytes.len() < EXTENTS_OFFSET {
			return Err(Error::InvalidFormat("superblock buffer too short".into()));
		}
		let magic = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
		if magic != MAGIC {
			return Err(Error::InvalidFormat(format!(
				"bad superblock magic {magic:#010x}"
			)));
		}
		let version = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
		if version != VERSION {
			return Err(Error::InvalidFormat(format!(
				"unsupported superblock version {version}"
			)));
		}
		let block_size = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
		if !is_valid_block_size(block_size) {
			return Err(Error::InvalidFormat(format!(
				"invalid block size {block_size} in superblock"
			)));
		}
		let total_blocks = u64::from_be_bytes(bytes[12..20].try_into().unwrap());
		let count = u32::from_be_bytes(bytes[20..24].try_into().unwrap()) as usize;
		let max = Self::max_extents(block_size);
		if count > max {
			return Err(Error::InvalidFormat(format!(
				"superblock declares {count} metadata extents, max is {max}"
			)));
		}
		let needed = EXTENTS_OFFSET + count * EXTENT_ENTRY_SIZE;
		if bytes.len() < needed {
			return Err(Error::InvalidFormat(
				"superblock buffer truncated before end of extent list".into(),
			));
		}
		let mut metadata_extents = Vec::with_capacity(count);
		let mut off = EXTENTS_OFFSET;
		for _ in 0..count {
			let start = u64::from_be_bytes(bytes[off..off + 8].try_into().unwrap());
			let blocks = u32::from_be_bytes(bytes[off + 8..off + 12].try_into().unwrap());
			let ext = Extent::new(start, blocks)
				.map_err(|e| Error::InvalidFormat(format!("bad metadata extent: {e}")))?;
			metadata_extents.push(ext);
			off += EXTENT_ENTRY_SIZE;
		}
		Ok(Self {
			block_size,
			total_blocks,
			metadata_extents,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_empty() {
		let sp = Superblock::new(4096, 256).unwrap();
		let bytes = sp.serialize();
		assert_eq!(bytes.len(), 4096);
		let back = Superblock::deserialize(&bytes).unwrap();
		assert_eq!(back.block_size(), 4096);
		assert_eq!(back.total_blocks(), 256);
		assert!(back.metadata_extents().is_empty());
	}

	#[test]
	fn round_trip_with_extents() {
		let mut sp = Superblock::new(512, 64).unwrap();
		sp.set_metadata_extents(vec![Extent::new(1, 3).unwrap(), Extent::new(10, 1).unwrap()])
			.unwrap();
		let bytes = sp.serialize();
		let back = Superblock::deserialize(&bytes).unwrap();
		assert_eq!(back.metadata_extents().len(), 2);
		assert_eq!(back.metadata_extents()[0].start(), 1);
		assert_eq!(back.metadata_extents()[1].count(), 1);
	}

	#[test]
	fn rejects_bad_magic() {
		let sp = Superblock::new(512, 64).unwrap();
		let mut bytes = sp.serialize();
		bytes[0] = 0;
		assert!(matches!(
			Superblock::deserialize(&bytes),
			Err(Error::InvalidFormat(_))
		));
	}

	#[test]
	fn rejects_too_many_extents() {
		let mut sp = Superblock::new(512, 64).unwrap();
		let max = Superblock::max_extents(512);
		let too_many = vec![Extent::new(0, 1).unwrap(); max + 1];
		assert!(sp.set_metadata_extents(too_many).is_err());
	}

	#[test]
	fn rejects_bad_block_size() {
		assert!(Superblock::new(600, 10).is_err());
		assert!(Superblock::new(256, 10).is_err());
	}
}
