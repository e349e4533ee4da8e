use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::inode::{
    S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFMT, S_IFREG, S_IFSOCK,
};

/// Point-in-time snapshot of an inode, in the shape of `struct stat`.
///
/// `uid`, `gid`, `rdev` and `blocks` are fixed at zero and `blksize` at 4096;
/// they exist so the snapshot is drop-in for code written against real stat
/// results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: usize,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime_ms: i64,
    pub mtime_ms: i64,
    pub ctime_ms: i64,
    pub birthtime_ms: i64,
}

impl Stats {
    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_directory(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub fn is_block_device(&self) -> bool {
        self.mode & S_IFMT == S_IFBLK
    }

    pub fn is_character_device(&self) -> bool {
        self.mode & S_IFMT == S_IFCHR
    }

    pub fn is_fifo(&self) -> bool {
        self.mode & S_IFMT == S_IFIFO
    }

    pub fn is_socket(&self) -> bool {
        self.mode & S_IFMT == S_IFSOCK
    }

    pub fn atime(&self) -> SystemTime {
        millis_to_system_time(self.atime_ms)
    }

    pub fn mtime(&self) -> SystemTime {
        millis_to_system_time(self.mtime_ms)
    }

    pub fn ctime(&self) -> SystemTime {
        millis_to_system_time(self.ctime_ms)
    }

    pub fn birthtime(&self) -> SystemTime {
        millis_to_system_time(self.birthtime_ms)
    }
}

fn millis_to_system_time(millis: i64) -> SystemTime {
    if millis >= 0 {
        UNIX_EPOCH + Duration::from_millis(millis as u64)
    } else {
        UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
    }
}
