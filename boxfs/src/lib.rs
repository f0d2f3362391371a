//! A single-container file system: a complete hierarchical file system
//! whose superblock, metadata index, and file data all live inside one
//! regular host file.
//!
//! ```no_run
//! use boxfs::{FileSystem, OpenOptions};
//!
//! let opts = OpenOptions::new().create(true).total_blocks(256);
//! let fs = FileSystem::open("container.box", &opts)?;
//! fs.write_file("/hello.txt", b"hi")?;
//! assert_eq!(fs.read_file("/hello.txt")?, b"hi");
//! fs.close()?;
//! # Ok::<(), boxfs::Error>(())
//! ```

pub mod channel;
pub mod container_io;
pub mod directory;
pub mod error;
pub mod extent;
pub mod fs;
pub mod glob;
pub mod inode;
pub mod metadata;
pub mod options;
pub mod path;
pub mod registry;
pub mod space_manager;
pub mod superblock;
pub mod util;

pub use channel::FileChannel;
pub use error::{Error, Result};
pub use extent::Extent;
pub use fs::{FileSystem, Metadata};
pub use glob::PathMatcher;
pub use inode::FileType;
pub use options::OpenOptions;
pub use registry::Registry;
