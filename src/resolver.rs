//! The seam through which mounted directories get their content.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ErrorCode, Result};
use crate::fs::FileSystem;
use crate::inode::{S_IFDIR, S_IFREG};

/// What stat through a resolver reports: just enough to materialize a
/// mounted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountStats {
    pub mode: u32,
    pub size: u64,
}

/// External source of directory listings and file content for `mount`.
///
/// All three methods are synchronous; the file system calls `read_dir` once
/// per mounted directory (expansion is one-shot) and `read_file` at most once
/// per file, on first read.
pub trait FileSystemResolver: Send + Sync {
    fn stat(&self, path: &str) -> Result<MountStats>;
    fn read_dir(&self, path: &str) -> Result<Vec<String>>;
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;
}

/// Resolver backed by the host file system. Mount source paths are joined
/// onto `base` with their root stripped, so a source of `/sub/f` reads
/// `<base>/sub/f`.
pub struct HostResolver {
    base: PathBuf,
}

impl HostResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        HostResolver { base: base.into() }
    }

    fn host_path(&self, path: &str) -> PathBuf {
        let mut result = self.base.clone();
        for part in path.split('/').filter(|part| !part.is_empty()) {
            result.push(part);
        }
        result
    }
}

impl FileSystemResolver for HostResolver {
    fn stat(&self, path: &str) -> Result<MountStats> {
        let metadata = fs::metadata(self.host_path(path))?;
        let mode = if metadata.is_dir() {
            S_IFDIR | 0o777
        } else {
            S_IFREG | 0o666
        };
        Ok(MountStats {
            mode,
            size: metadata.len(),
        })
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.host_path(path))? {
            let name = entry?
                .file_name()
                .into_string()
                .map_err(|_| ErrorCode::EINVAL)?;
            names.push(name);
        }
        Ok(names)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.host_path(path))?)
    }
}

/// Resolver that reads through another in-memory file system, so one
/// instance can be mounted inside another.
pub struct VfsResolver(pub Arc<FileSystem>);

impl FileSystemResolver for VfsResolver {
    fn stat(&self, path: &str) -> Result<MountStats> {
        let stats = self.0.stat(path)?;
        Ok(MountStats {
            mode: stats.mode,
            size: stats.size,
        })
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        self.0.readdir(path)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.0.read_file(path)
    }
}
