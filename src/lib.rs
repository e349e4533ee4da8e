//! An in-memory file system with POSIX-ish semantics: inodes, hard and
//! symbolic links, copy-on-write shadow layering over a frozen parent, and
//! lazily mounted external sources, all driven by a configurable clock so
//! test runs are deterministic.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

mod apply;
mod clock;
mod error;
mod fs;
mod inode;
mod links;
mod meta;
pub mod path;
mod resolver;
mod scan;
mod stats;

#[cfg(test)]
mod tests;

pub use crate::apply::{Entry, File, FileSet, Link, Mount, Symlink};
pub use crate::clock::Clock;
pub use crate::error::{ErrorCode, IoError, Result};
pub use crate::fs::{FileSystem, FileSystemOptions, MAX_SYMLINK_DEPTH};
pub use crate::inode::{
    S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK,
};
pub use crate::meta::{MetaMap, MetaValue};
pub use crate::resolver::{FileSystemResolver, HostResolver, MountStats, VfsResolver};
pub use crate::scan::{ScanAxis, Traversal};
pub use crate::stats::Stats;
