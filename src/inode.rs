//! The inode model: a tagged record per file system object, sharing a stat
//! header and diverging in the tail payload.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use spin::RwLock;

use crate::links::LinkMap;
use crate::meta::MetaMap;
use crate::resolver::FileSystemResolver;

/// File-type bits, POSIX layout. Only regular files, directories and
/// symlinks are producible through the public API; the rest are stored for
/// compatibility.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

// Device and inode ids are process-global so identity comparisons across
// file systems (shadow identity in particular) remain meaningful.
static NEXT_DEV: AtomicU64 = AtomicU64::new(0);
static NEXT_INO: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_dev() -> u64 {
    NEXT_DEV.fetch_add(1, Ordering::SeqCst) + 1
}

fn next_ino() -> u64 {
    NEXT_INO.fetch_add(1, Ordering::SeqCst) + 1
}

pub(crate) fn empty_buffer() -> Arc<[u8]> {
    Vec::new().into()
}

/// Where a lazily expanded directory or file gets its content from.
#[derive(Clone)]
pub(crate) struct MountSource {
    pub path: String,
    pub resolver: Arc<dyn FileSystemResolver>,
}

/// The authoritative content of a regular file: exactly one of these at any
/// given time.
pub(crate) enum FileContent {
    /// Materialized bytes. Shared with shadow copies until one of them is
    /// rewritten, so the `Arc` is never handed out without copying.
    Buffer(Arc<[u8]>),
    /// Not yet loaded; `size` comes from the resolver's stat.
    Source { source: MountSource, size: u64 },
    /// Read through `shadow_root` on first access.
    Shadowed,
}

#[derive(Default)]
pub(crate) struct DirContent {
    /// Child entries, built on first demand.
    pub links: Option<LinkMap>,
    /// Pending mount expansion; cleared once `links` is built.
    pub source: Option<MountSource>,
}

pub(crate) enum InodeKind {
    File(FileContent),
    Dir(DirContent),
    Symlink(String),
}

impl InodeKind {
    pub fn new_file() -> Self {
        InodeKind::File(FileContent::Buffer(empty_buffer()))
    }

    pub fn new_dir() -> Self {
        InodeKind::Dir(DirContent::default())
    }

    fn type_bits(&self) -> u32 {
        match self {
            InodeKind::File(_) => S_IFREG,
            InodeKind::Dir(_) => S_IFDIR,
            InodeKind::Symlink(_) => S_IFLNK,
        }
    }
}

pub(crate) struct InodeData {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: usize,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub birthtime: i64,
    pub meta: Option<Arc<MetaMap>>,
    /// The inode in the shadowed file system this one was materialized
    /// from. A handle, never ownership.
    pub shadow_root: Option<Arc<Inode>>,
    pub kind: InodeKind,
}

impl InodeData {
    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub fn dir(&self) -> Option<&DirContent> {
        match &self.kind {
            InodeKind::Dir(content) => Some(content),
            _ => None,
        }
    }

    pub fn dir_mut(&mut self) -> Option<&mut DirContent> {
        match &mut self.kind {
            InodeKind::Dir(content) => Some(content),
            _ => None,
        }
    }
}

pub(crate) struct Inode(pub RwLock<InodeData>);

impl std::fmt::Debug for Inode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inode").field("ino", &self.0.read().ino).finish()
    }
}

impl Inode {
    /// Mint a fresh inode with `nlink == 0`; the caller attaches it with
    /// `add_link`. Group and other write bits are masked off, umask-style.
    pub fn mknod(dev: u64, mode: u32, time: i64, kind: InodeKind) -> Arc<Inode> {
        let mode = (mode & 0o7777 & !0o022) | kind.type_bits();
        Arc::new(Inode(RwLock::new(InodeData {
            dev,
            ino: next_ino(),
            mode,
            nlink: 0,
            atime: time,
            mtime: time,
            ctime: time,
            birthtime: time,
            meta: None,
            shadow_root: None,
            kind,
        })))
    }

    pub fn ino(&self) -> u64 {
        self.0.read().ino
    }

    pub fn is_dir(&self) -> bool {
        self.0.read().is_dir()
    }

    pub fn is_symlink(&self) -> bool {
        self.0.read().is_symlink()
    }
}
