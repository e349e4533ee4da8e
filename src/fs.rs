//! The file system proper: the inode graph, the path walker, shadow and
//! mount materialization, and the POSIX-ish operation surface.
//!
//! Everything lives in process memory. Paths are resolved against the
//! current working directory, walked component by component through lazily
//! built name maps, and mutations stamp timestamps from the configured
//! clock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use spin::RwLock;

use crate::apply::FileSet;
use crate::clock::Clock;
use crate::error::ErrorCode::*;
use crate::error::{IoError, Result};
use crate::inode::{
    next_dev, DirContent, FileContent, Inode, InodeData, InodeKind, MountSource, S_IFDIR, S_IFMT,
    S_IFREG,
};
use crate::links::LinkMap;
use crate::meta::{MetaMap, MetaValue};
use crate::path::{self, ValidationFlags};
use crate::resolver::FileSystemResolver;
use crate::stats::Stats;

/// Symlink expansions allowed in a single walk before `ELOOP`.
pub const MAX_SYMLINK_DEPTH: usize = 40;

/// Options for [`FileSystem::with_options`].
#[derive(Default)]
pub struct FileSystemOptions {
    /// Clock source; defaults to wall-clock time.
    pub time: Option<Clock>,
    /// Initial working directory. Must be absolute; created with `mkdirp`.
    pub cwd: Option<String>,
    /// Initial tree, applied after `cwd` is set.
    pub files: Option<FileSet>,
    /// Initial file-system-level metadata entries.
    pub meta: Vec<(String, MetaValue)>,
}

/// An in-memory, POSIX-semantics file system.
///
/// A `FileSystem` is either mutable or read-only; [`make_readonly`] freezes
/// it irreversibly, after which [`shadow`] can fork cheap copy-on-write
/// layers over it.
///
/// [`make_readonly`]: FileSystem::make_readonly
/// [`shadow`]: FileSystem::shadow
#[derive(Debug)]
pub struct FileSystem {
    ignore_case: bool,
    readonly: AtomicBool,
    /// Root name map, keyed by whole roots (`/`, `c:/`). Lazy so a shadow
    /// can fill it from its parent on first use.
    roots: RwLock<Option<LinkMap>>,
    cwd: RwLock<String>,
    dir_stack: RwLock<Vec<String>>,
    clock: RwLock<Clock>,
    /// The read-only file system this one layers over, if any.
    shadow_root: Option<Arc<FileSystem>>,
    /// Shadow inodes already materialized from `shadow_root`, keyed by the
    /// source inode number.
    shadows: RwLock<BTreeMap<u64, Arc<Inode>>>,
    meta: RwLock<Option<Arc<MetaMap>>>,
    self_ref: RwLock<Weak<FileSystem>>,
}

/// What a walk came back with. `node` may be absent on the last step: the
/// partial result creating callers use to tell "parent exists but target
/// does not" from "parent missing".
pub(crate) struct WalkResult {
    pub realpath: String,
    pub basename: String,
    pub parent: Option<Arc<Inode>>,
    pub node: Option<Arc<Inode>>,
}

impl FileSystem {
    /// A fresh, empty, mutable file system. No roots exist yet; the first
    /// `mkdir` of a root path creates one.
    pub fn new(ignore_case: bool) -> Arc<Self> {
        Self::wrap(FileSystem {
            ignore_case,
            readonly: AtomicBool::new(false),
            roots: RwLock::new(None),
            cwd: RwLock::new(String::new()),
            dir_stack: RwLock::new(Vec::new()),
            clock: RwLock::new(Clock::default()),
            shadow_root: None,
            shadows: RwLock::new(BTreeMap::new()),
            meta: RwLock::new(None),
            self_ref: RwLock::new(Weak::new()),
        })
    }

    pub fn with_options(ignore_case: bool, options: FileSystemOptions) -> Result<Arc<Self>> {
        let fs = Self::new(ignore_case);
        if let Some(time) = options.time {
            *fs.clock.write() = time;
        }
        for (key, value) in options.meta {
            fs.meta().set(&key, value);
        }
        if let Some(cwd) = options.cwd {
            let cwd = path::validate(&cwd, ValidationFlags::ABSOLUTE)?;
            fs.mkdirp(&cwd)?;
            *fs.cwd.write() = path::resolve("", &cwd);
        }
        if let Some(files) = options.files {
            fs.apply(&files)?;
        }
        Ok(fs)
    }

    fn wrap(fs: FileSystem) -> Arc<Self> {
        let fs = Arc::new(fs);
        *fs.self_ref.write() = Arc::downgrade(&fs);
        fs
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly.load(Ordering::SeqCst)
    }

    /// Freeze this file system. Irreversible; from here on every mutating
    /// operation fails `EROFS`.
    pub fn make_readonly(&self) {
        self.readonly.store(true, Ordering::SeqCst);
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.is_readonly() {
            Err(EROFS.into())
        } else {
            Ok(())
        }
    }

    /// Fork a mutable file system layered over this one. The receiver must
    /// already be read-only (`EPERM` otherwise); reads on names the fork has
    /// not overwritten fall through to the parent.
    pub fn shadow(&self) -> Result<Arc<FileSystem>> {
        self.shadow_with(self.ignore_case)
    }

    /// Like [`shadow`](FileSystem::shadow) with an explicit case
    /// sensitivity. A case-insensitive shadow of a case-sensitive parent is
    /// rejected with `EINVAL`.
    pub fn shadow_with(&self, ignore_case: bool) -> Result<Arc<FileSystem>> {
        if !self.is_readonly() {
            return Err(EPERM.into());
        }
        if ignore_case && !self.ignore_case {
            return Err(EINVAL.into());
        }
        let parent = self.self_ref.read().upgrade().unwrap();
        Ok(Self::wrap(FileSystem {
            ignore_case,
            readonly: AtomicBool::new(false),
            roots: RwLock::new(None),
            cwd: RwLock::new(self.cwd.read().clone()),
            dir_stack: RwLock::new(Vec::new()),
            clock: RwLock::new(self.clock.read().clone()),
            shadow_root: Some(parent),
            shadows: RwLock::new(BTreeMap::new()),
            meta: RwLock::new(None),
            self_ref: RwLock::new(Weak::new()),
        }))
    }

    /// The current time in milliseconds, as the configured clock sees it.
    pub fn time(&self) -> i64 {
        self.clock.read().now()
    }

    /// Replace the clock source. `EPERM` on a read-only file system.
    pub fn set_time(&self, clock: impl Into<Clock>) -> Result<()> {
        if self.is_readonly() {
            return Err(EPERM.into());
        }
        *self.clock.write() = clock.into();
        Ok(())
    }

    /// File-system-level metadata, inheriting from the shadowed parent's.
    pub fn meta(&self) -> Arc<MetaMap> {
        if let Some(meta) = &*self.meta.read() {
            return meta.clone();
        }
        let parent = self.shadow_root.as_ref().map(|fs| fs.meta());
        let mut slot = self.meta.write();
        if slot.is_none() {
            *slot = Some(Arc::new(MetaMap::new(parent)));
        }
        slot.as_ref().unwrap().clone()
    }

    // === cwd and the directory stack ===

    pub fn cwd(&self) -> String {
        self.cwd.read().clone()
    }

    pub fn chdir(&self, path: &str) -> Result<()> {
        self.check_writable()?;
        let path = self.resolve_path(path)?;
        let result = self.walk(&path, false)?;
        let node = result.node.ok_or(IoError::from(ENOENT))?;
        if !node.is_dir() {
            return Err(ENOTDIR.into());
        }
        *self.cwd.write() = path;
        Ok(())
    }

    /// Push the current directory onto the stack and optionally change to a
    /// new one.
    pub fn pushd(&self, path: Option<&str>) -> Result<()> {
        self.check_writable()?;
        let cwd = self.cwd();
        if !cwd.is_empty() {
            self.dir_stack.write().push(cwd);
        }
        if let Some(path) = path {
            self.chdir(path)?;
        }
        Ok(())
    }

    /// Pop the directory stack and change to the popped directory. A no-op
    /// on an empty stack.
    pub fn popd(&self) -> Result<()> {
        self.check_writable()?;
        let popped = self.dir_stack.write().pop();
        if let Some(path) = popped {
            self.chdir(&path)?;
        }
        Ok(())
    }

    // === path resolution and the walker ===

    pub(crate) fn resolve_path(&self, path: &str) -> Result<String> {
        let path = path::validate(path, ValidationFlags::RELATIVE_OR_ABSOLUTE)?;
        let resolved = path::resolve(&self.cwd(), &path);
        if !path::is_absolute(&resolved) {
            // relative path against an unset cwd
            return Err(EINVAL.into());
        }
        Ok(resolved)
    }

    /// Resolve an absolute path component by component, splicing symlink
    /// targets back into the walk as they are met. With `no_follow` the
    /// final component is not dereferenced.
    pub(crate) fn walk(&self, path: &str, no_follow: bool) -> Result<WalkResult> {
        let mut components = path::parse(path);
        let mut parent: Option<Arc<Inode>> = None;
        let mut step = 0;
        let mut depth = 0;
        loop {
            if depth >= MAX_SYMLINK_DEPTH {
                return Err(ELOOP.into());
            }
            let basename = components[step].clone();
            let node = self.child(parent.as_ref(), &basename)?;
            let last_step = step == components.len() - 1;
            if last_step && (no_follow || !node.as_ref().map_or(false, |n| n.is_symlink())) {
                return Ok(WalkResult {
                    realpath: path::format(&components),
                    basename,
                    parent,
                    node,
                });
            }
            let node = node.ok_or(IoError::from(ENOENT))?;
            let target = {
                let data = node.0.read();
                match &data.kind {
                    InodeKind::Symlink(target) => Some(target.clone()),
                    InodeKind::Dir(_) => None,
                    InodeKind::File(_) => return Err(ENOTDIR.into()),
                }
            };
            match target {
                Some(target) => {
                    // splice the link text into the walk and start over
                    let prefix = path::format(&components[..step]);
                    let resolved = path::resolve(&prefix, &target);
                    let mut spliced = path::parse(&resolved);
                    spliced.extend_from_slice(&components[step + 1..]);
                    components = spliced;
                    parent = None;
                    step = 0;
                    depth += 1;
                }
                None => {
                    parent = Some(node);
                    step += 1;
                }
            }
        }
    }

    /// Look `name` up in `parent`'s links (or the root map), materializing
    /// the links first if needed.
    fn child(&self, parent: Option<&Arc<Inode>>, name: &str) -> Result<Option<Arc<Inode>>> {
        match parent {
            None => {
                self.ensure_root_links()?;
                Ok(self.roots.read().as_ref().unwrap().get(name).cloned())
            }
            Some(dir) => {
                self.ensure_links(dir)?;
                let data = dir.0.read();
                let links = data.dir().and_then(|c| c.links.as_ref());
                Ok(links.ok_or(IoError::from(ENOTDIR))?.get(name).cloned())
            }
        }
    }

    // === lazy materialization: roots, shadows, mounts, buffers ===

    fn ensure_root_links(&self) -> Result<()> {
        if self.roots.read().is_some() {
            return Ok(());
        }
        let mut map = LinkMap::new(self.ignore_case);
        if let Some(parent_fs) = &self.shadow_root {
            parent_fs.ensure_root_links()?;
            let entries: Vec<(String, Arc<Inode>)> = {
                let roots = parent_fs.roots.read();
                roots
                    .as_ref()
                    .unwrap()
                    .iter()
                    .map(|(name, node)| (name.to_string(), node.clone()))
                    .collect()
            };
            for (name, source) in entries {
                let shadow = self.get_shadow(&source);
                map.set(&name, shadow);
            }
        }
        let mut roots = self.roots.write();
        if roots.is_none() {
            *roots = Some(map);
        }
        Ok(())
    }

    /// Mirror `source` (an inode of the shadowed file system) into this one.
    /// The per-FS shadow table makes this idempotent: the same source always
    /// yields the same shadow inode.
    fn get_shadow(&self, source: &Arc<Inode>) -> Arc<Inode> {
        let header = {
            let src = source.0.read();
            let kind = match &src.kind {
                InodeKind::File(_) => InodeKind::File(FileContent::Shadowed),
                InodeKind::Dir(_) => InodeKind::Dir(DirContent::default()),
                // symlink text is copied eagerly
                InodeKind::Symlink(target) => InodeKind::Symlink(target.clone()),
            };
            InodeData {
                dev: src.dev,
                ino: src.ino,
                mode: src.mode,
                nlink: src.nlink,
                atime: src.atime,
                mtime: src.mtime,
                ctime: src.ctime,
                birthtime: src.birthtime,
                meta: None,
                shadow_root: Some(source.clone()),
                kind,
            }
        };
        let mut shadows = self.shadows.write();
        if let Some(existing) = shadows.get(&header.ino) {
            return existing.clone();
        }
        trace!("materializing shadow of inode {}", header.ino);
        let shadow = Arc::new(Inode(RwLock::new(header)));
        shadows.insert(shadow.ino(), shadow.clone());
        shadow
    }

    /// Build a directory's name map if it is still a thunk: empty for a
    /// plain directory, mirrored from the shadowed directory, or expanded
    /// through the mount resolver.
    pub(crate) fn ensure_links(&self, dir: &Arc<Inode>) -> Result<()> {
        enum Pending {
            Ready,
            Empty,
            Shadow(Arc<Inode>),
            Mount(MountSource),
        }
        let pending = {
            let data = dir.0.read();
            match &data.kind {
                InodeKind::Dir(content) => {
                    if content.links.is_some() {
                        Pending::Ready
                    } else if let Some(source) = &content.source {
                        Pending::Mount(source.clone())
                    } else if let Some(source) = &data.shadow_root {
                        Pending::Shadow(source.clone())
                    } else {
                        Pending::Empty
                    }
                }
                _ => return Err(ENOTDIR.into()),
            }
        };
        let map = match pending {
            Pending::Ready => return Ok(()),
            Pending::Empty => LinkMap::new(self.ignore_case),
            Pending::Shadow(source) => match &self.shadow_root {
                Some(parent_fs) => {
                    parent_fs.ensure_links(&source)?;
                    let entries: Vec<(String, Arc<Inode>)> = {
                        let src = source.0.read();
                        src.dir()
                            .and_then(|c| c.links.as_ref())
                            .map(|links| {
                                links
                                    .iter()
                                    .map(|(name, node)| (name.to_string(), node.clone()))
                                    .collect()
                            })
                            .unwrap_or_default()
                    };
                    let mut map = LinkMap::new(self.ignore_case);
                    for (name, child) in entries {
                        let shadow = self.get_shadow(&child);
                        map.set(&name, shadow);
                    }
                    map
                }
                None => LinkMap::new(self.ignore_case),
            },
            Pending::Mount(source) => self.expand_mount(dir, source)?,
        };
        let mut data = dir.0.write();
        if let Some(content) = data.dir_mut() {
            if content.links.is_none() {
                content.links = Some(map);
            }
            // expansion is one-shot
            content.source = None;
        }
        Ok(())
    }

    fn expand_mount(&self, dir: &Arc<Inode>, mount: MountSource) -> Result<LinkMap> {
        let time = self.time();
        let dev = dir.0.read().dev;
        let mut map = LinkMap::new(self.ignore_case);
        for name in mount.resolver.read_dir(&mount.path)? {
            let child_source = path::combine(&mount.path, &name);
            let stats = mount.resolver.stat(&child_source)?;
            let node = match stats.mode & S_IFMT {
                S_IFDIR => Inode::mknod(
                    dev,
                    0o777,
                    time,
                    InodeKind::Dir(DirContent {
                        links: None,
                        source: Some(MountSource {
                            path: child_source,
                            resolver: mount.resolver.clone(),
                        }),
                    }),
                ),
                S_IFREG => Inode::mknod(
                    dev,
                    0o666,
                    time,
                    InodeKind::File(FileContent::Source {
                        source: MountSource {
                            path: child_source,
                            resolver: mount.resolver.clone(),
                        },
                        size: stats.size,
                    }),
                ),
                _ => continue,
            };
            {
                let mut child = node.0.write();
                child.nlink = 1;
                child.ctime = time;
            }
            map.set(&name, node);
        }
        debug!("{} entries expanded from {}", map.len(), mount.path);
        dir.0.write().mtime = time;
        Ok(map)
    }

    /// A file's bytes, loading them on first access: from the mount
    /// resolver, or from the shadowed file (sharing its storage), or empty.
    fn file_buffer(&self, node: &Arc<Inode>) -> Result<Arc<[u8]>> {
        enum Pending {
            Ready(Arc<[u8]>),
            Load(MountSource),
            Shadow(Arc<Inode>),
            Empty,
        }
        let pending = {
            let data = node.0.read();
            match &data.kind {
                InodeKind::File(FileContent::Buffer(buffer)) => Pending::Ready(buffer.clone()),
                InodeKind::File(FileContent::Source { source, .. }) => Pending::Load(source.clone()),
                InodeKind::File(FileContent::Shadowed) => match &data.shadow_root {
                    Some(source) => Pending::Shadow(source.clone()),
                    None => Pending::Empty,
                },
                _ => return Err(EBADF.into()),
            }
        };
        let buffer: Arc<[u8]> = match pending {
            Pending::Ready(buffer) => return Ok(buffer),
            Pending::Load(source) => {
                trace!("loading {} through its resolver", source.path);
                source.resolver.read_file(&source.path)?.into()
            }
            Pending::Shadow(source) => match &self.shadow_root {
                Some(parent_fs) => parent_fs.file_buffer(&source)?,
                None => crate::inode::empty_buffer(),
            },
            Pending::Empty => crate::inode::empty_buffer(),
        };
        let mut data = node.0.write();
        if let InodeKind::File(content) = &mut data.kind {
            *content = FileContent::Buffer(buffer.clone());
        }
        Ok(buffer)
    }

    fn file_size(&self, node: &Arc<Inode>) -> u64 {
        enum Size {
            Known(u64),
            Shadow(Arc<Inode>),
        }
        let size = {
            let data = node.0.read();
            match &data.kind {
                InodeKind::File(FileContent::Buffer(buffer)) => Size::Known(buffer.len() as u64),
                InodeKind::File(FileContent::Source { size, .. }) => Size::Known(*size),
                InodeKind::File(FileContent::Shadowed) => match &data.shadow_root {
                    Some(source) => Size::Shadow(source.clone()),
                    None => Size::Known(0),
                },
                _ => Size::Known(0),
            }
        };
        match size {
            Size::Known(size) => size,
            Size::Shadow(source) => self
                .shadow_root
                .as_ref()
                .map_or(0, |parent_fs| parent_fs.file_size(&source)),
        }
    }

    // === link bookkeeping ===

    /// Attach `node` under `name`. Bumps `nlink`, stamps `ctime`, touches
    /// the parent's `mtime`. Adding the first root to a file system with an
    /// unset cwd makes that root the cwd.
    fn add_link(&self, parent: Option<&Arc<Inode>>, name: &str, node: &Arc<Inode>, time: i64) {
        match parent {
            Some(dir) => {
                let mut data = dir.0.write();
                if let Some(links) = data.dir_mut().and_then(|c| c.links.as_mut()) {
                    links.set(name, node.clone());
                }
                data.mtime = time;
            }
            None => {
                self.roots.write().as_mut().unwrap().set(name, node.clone());
                let mut cwd = self.cwd.write();
                if cwd.is_empty() {
                    *cwd = name.to_string();
                }
            }
        }
        let mut data = node.0.write();
        data.nlink += 1;
        data.ctime = time;
    }

    fn remove_link(&self, parent: Option<&Arc<Inode>>, name: &str, node: &Arc<Inode>, time: i64) {
        match parent {
            Some(dir) => {
                let mut data = dir.0.write();
                if let Some(links) = data.dir_mut().and_then(|c| c.links.as_mut()) {
                    links.remove(name);
                }
                data.mtime = time;
            }
            None => {
                self.roots.write().as_mut().unwrap().remove(name);
            }
        }
        let mut data = node.0.write();
        data.nlink -= 1;
        data.ctime = time;
    }

    // === stat family ===

    fn node_stats(&self, node: &Arc<Inode>) -> Stats {
        let size = match &node.0.read().kind {
            InodeKind::File(_) => self.file_size(node),
            InodeKind::Dir(_) => 0,
            InodeKind::Symlink(target) => target.len() as u64,
        };
        let data = node.0.read();
        Stats {
            dev: data.dev,
            ino: data.ino,
            mode: data.mode,
            nlink: data.nlink,
            uid: 0,
            gid: 0,
            rdev: 0,
            size,
            blksize: 4096,
            blocks: 0,
            atime_ms: data.atime,
            mtime_ms: data.mtime,
            ctime_ms: data.ctime,
            birthtime_ms: data.birthtime,
        }
    }

    pub(crate) fn stat_resolved(&self, path: &str, no_follow: bool) -> Result<Stats> {
        let result = self.walk(path, no_follow)?;
        let node = result.node.ok_or(IoError::from(ENOENT))?;
        Ok(self.node_stats(&node))
    }

    /// Stat, following a final symlink.
    pub fn stat(&self, path: &str) -> Result<Stats> {
        let path = self.resolve_path(path)?;
        self.stat_resolved(&path, false)
    }

    /// Stat without dereferencing a final symlink.
    pub fn lstat(&self, path: &str) -> Result<Stats> {
        let path = self.resolve_path(path)?;
        self.stat_resolved(&path, true)
    }

    // === directory operations ===

    /// Names in the directory, in comparator order.
    pub fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let result = self.walk(&self.resolve_path(path)?, false)?;
        let node = result.node.ok_or(IoError::from(ENOENT))?;
        if !node.is_dir() {
            return Err(ENOTDIR.into());
        }
        self.ensure_links(&node)?;
        let data = node.0.read();
        Ok(data
            .dir()
            .and_then(|c| c.links.as_ref())
            .map(|links| links.names())
            .unwrap_or_default())
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.check_writable()?;
        let result = self.walk(&self.resolve_path(path)?, true)?;
        if result.node.is_some() {
            return Err(EEXIST.into());
        }
        let time = self.time();
        let dev = match &result.parent {
            Some(parent) => parent.0.read().dev,
            None => next_dev(),
        };
        let node = Inode::mknod(dev, 0o777, time, InodeKind::new_dir());
        self.add_link(result.parent.as_ref(), &result.basename, &node, time);
        Ok(())
    }

    /// `mkdir -p`: create the directory and any missing ancestors.
    pub fn mkdirp(&self, path: &str) -> Result<()> {
        let path = self.resolve_path(path)?;
        self.mkdirp_resolved(&path)
    }

    fn mkdirp_resolved(&self, path: &str) -> Result<()> {
        match self.mkdir(path) {
            Err(error) if error.code == ENOENT => {
                self.mkdirp_resolved(&path::dirname(path))?;
                self.mkdir(path)
            }
            Err(error) if error.code == EEXIST => Ok(()),
            other => other,
        }
    }

    pub fn rmdir(&self, path: &str) -> Result<()> {
        self.check_writable()?;
        let result = self.walk(&self.resolve_path(path)?, true)?;
        if result.parent.is_none() {
            return Err(EPERM.into());
        }
        let node = match &result.node {
            Some(node) if node.is_dir() => node.clone(),
            _ => return Err(ENOTDIR.into()),
        };
        self.ensure_links(&node)?;
        {
            let data = node.0.read();
            let empty = data
                .dir()
                .and_then(|c| c.links.as_ref())
                .map_or(true, |links| links.is_empty());
            if !empty {
                return Err(ENOTEMPTY.into());
            }
        }
        self.remove_link(result.parent.as_ref(), &result.basename, &node, self.time());
        Ok(())
    }

    // === links, names, files ===

    /// Attach an existing inode under a second name.
    pub fn link(&self, oldpath: &str, newpath: &str) -> Result<()> {
        self.check_writable()?;
        let old = self.walk(&self.resolve_path(oldpath)?, false)?;
        let node = old.node.ok_or(IoError::from(ENOENT))?;
        if node.is_dir() {
            return Err(EPERM.into());
        }
        let new = self.walk(&self.resolve_path(newpath)?, true)?;
        if new.parent.is_none() {
            return Err(EPERM.into());
        }
        if new.node.is_some() {
            return Err(EEXIST.into());
        }
        self.add_link(new.parent.as_ref(), &new.basename, &node, self.time());
        Ok(())
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        self.check_writable()?;
        let result = self.walk(&self.resolve_path(path)?, true)?;
        if result.parent.is_none() {
            return Err(EPERM.into());
        }
        let node = result.node.ok_or(IoError::from(ENOENT))?;
        if node.is_dir() {
            return Err(EISDIR.into());
        }
        self.remove_link(result.parent.as_ref(), &result.basename, &node, self.time());
        Ok(())
    }

    pub fn rename(&self, oldpath: &str, newpath: &str) -> Result<()> {
        self.check_writable()?;
        let old = self.walk(&self.resolve_path(oldpath)?, true)?;
        if old.parent.is_none() {
            return Err(EPERM.into());
        }
        let node = old.node.clone().ok_or(IoError::from(ENOENT))?;
        let new = self.walk(&self.resolve_path(newpath)?, true)?;
        if new.parent.is_none() {
            return Err(EPERM.into());
        }
        let time = self.time();
        if let Some(existing) = &new.node {
            if Arc::ptr_eq(existing, &node) {
                return Ok(());
            }
            if node.is_dir() {
                if !existing.is_dir() {
                    return Err(ENOTDIR.into());
                }
                self.ensure_links(existing)?;
                let empty = {
                    let data = existing.0.read();
                    data.dir()
                        .and_then(|c| c.links.as_ref())
                        .map_or(true, |links| links.is_empty())
                };
                if !empty {
                    return Err(ENOTEMPTY.into());
                }
            } else if existing.is_dir() {
                return Err(EISDIR.into());
            }
            self.remove_link(new.parent.as_ref(), &new.basename, existing, time);
        }
        let same_parent = match (&old.parent, &new.parent) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if same_parent {
            if let Some(dir) = &old.parent {
                let mut data = dir.0.write();
                if let Some(links) = data.dir_mut().and_then(|c| c.links.as_mut()) {
                    links.remove(&old.basename);
                    links.set(&new.basename, node.clone());
                }
                data.mtime = time;
            }
        } else {
            self.remove_link(old.parent.as_ref(), &old.basename, &node, time);
            self.add_link(new.parent.as_ref(), &new.basename, &node, time);
        }
        Ok(())
    }

    /// Create a symbolic link whose stored text is `target`, verbatim.
    pub fn symlink(&self, target: &str, linkpath: &str) -> Result<()> {
        self.check_writable()?;
        let target = path::validate(target, ValidationFlags::RELATIVE_OR_ABSOLUTE)?;
        let result = self.walk(&self.resolve_path(linkpath)?, true)?;
        if result.parent.is_none() {
            return Err(EPERM.into());
        }
        if result.node.is_some() {
            return Err(EEXIST.into());
        }
        let time = self.time();
        let dev = result.parent.as_ref().unwrap().0.read().dev;
        let node = Inode::mknod(dev, 0o666, time, InodeKind::Symlink(target));
        self.add_link(result.parent.as_ref(), &result.basename, &node, time);
        Ok(())
    }

    /// The stored link text, without normalization.
    pub fn readlink(&self, path: &str) -> Result<String> {
        let result = self.walk(&self.resolve_path(path)?, true)?;
        let node = result.node.ok_or(IoError::from(EINVAL))?;
        let data = node.0.read();
        match &data.kind {
            InodeKind::Symlink(target) => Ok(target.clone()),
            _ => Err(EINVAL.into()),
        }
    }

    /// The path with every intermediate symlink resolved. The final node
    /// need not exist.
    pub fn realpath(&self, path: &str) -> Result<String> {
        let result = self.walk(&self.resolve_path(path)?, false)?;
        Ok(result.realpath)
    }

    /// A copy of the file's bytes. Mutating the returned vector never
    /// affects the stored content.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let result = self.walk(&self.resolve_path(path)?, false)?;
        let node = result.node.ok_or(IoError::from(ENOENT))?;
        {
            let data = node.0.read();
            if data.is_dir() {
                return Err(EISDIR.into());
            }
            if !data.is_file() {
                return Err(EBADF.into());
            }
        }
        Ok(self.file_buffer(&node)?.to_vec())
    }

    /// [`read_file`](FileSystem::read_file), decoded as UTF-8.
    pub fn read_file_to_string(&self, path: &str) -> Result<String> {
        String::from_utf8(self.read_file(path)?).map_err(|_| EINVAL.into())
    }

    /// Write `data` to the file, creating it if absent. The stored buffer is
    /// a fresh copy of `data`.
    pub fn write_file(&self, path: &str, data: impl AsRef<[u8]>) -> Result<()> {
        self.check_writable()?;
        let result = self.walk(&self.resolve_path(path)?, false)?;
        if result.parent.is_none() {
            return Err(EPERM.into());
        }
        let time = self.time();
        let node = match result.node {
            Some(node) => node,
            None => {
                let dev = result.parent.as_ref().unwrap().0.read().dev;
                let node = Inode::mknod(dev, 0o666, time, InodeKind::new_file());
                self.add_link(result.parent.as_ref(), &result.basename, &node, time);
                node
            }
        };
        let mut guard = node.0.write();
        let inode = &mut *guard;
        match &mut inode.kind {
            InodeKind::Dir(_) => Err(EISDIR.into()),
            InodeKind::Symlink(_) => Err(EBADF.into()),
            InodeKind::File(content) => {
                *content = FileContent::Buffer(data.as_ref().to_vec().into());
                inode.mtime = time;
                inode.ctime = time;
                Ok(())
            }
        }
    }

    /// Mount an external source at `target`: children are produced on
    /// demand by `resolver`, one level at a time.
    pub fn mount(
        &self,
        source: &str,
        target: &str,
        resolver: Arc<dyn FileSystemResolver>,
    ) -> Result<()> {
        self.check_writable()?;
        let source = path::validate(source, ValidationFlags::ABSOLUTE)?;
        let result = self.walk(&self.resolve_path(target)?, true)?;
        if result.node.is_some() {
            return Err(EEXIST.into());
        }
        let time = self.time();
        let dev = match &result.parent {
            Some(parent) => parent.0.read().dev,
            None => next_dev(),
        };
        let node = Inode::mknod(
            dev,
            0o777,
            time,
            InodeKind::Dir(DirContent {
                links: None,
                source: Some(MountSource {
                    path: source,
                    resolver,
                }),
            }),
        );
        self.add_link(result.parent.as_ref(), &result.basename, &node, time);
        Ok(())
    }

    /// The file's metadata map, lazily allocated with the shadowed file's
    /// metadata as its fallback. The handle mutates, so this is guarded like
    /// any other mutation.
    pub fn filemeta(&self, path: &str) -> Result<Arc<MetaMap>> {
        self.check_writable()?;
        let result = self.walk(&self.resolve_path(path)?, false)?;
        let node = result.node.ok_or(IoError::from(ENOENT))?;
        Ok(self.node_meta(&node))
    }

    fn node_meta(&self, node: &Arc<Inode>) -> Arc<MetaMap> {
        if let Some(meta) = &node.0.read().meta {
            return meta.clone();
        }
        let source = node.0.read().shadow_root.clone();
        let parent = match (&self.shadow_root, source) {
            (Some(parent_fs), Some(source)) => Some(parent_fs.node_meta(&source)),
            _ => None,
        };
        let meta = Arc::new(MetaMap::new(parent));
        node.0.write().meta = Some(meta.clone());
        meta
    }

    // === existence probes and recursive removal ===

    pub fn exists(&self, path: &str) -> bool {
        self.resolve_path(path)
            .and_then(|path| self.walk(&path, true))
            .map(|result| result.node.is_some())
            .unwrap_or(false)
    }

    pub fn file_exists(&self, path: &str) -> bool {
        self.stat(path).map(|stats| stats.is_file()).unwrap_or(false)
    }

    pub fn directory_exists(&self, path: &str) -> bool {
        self.stat(path)
            .map(|stats| stats.is_directory())
            .unwrap_or(false)
    }

    /// `rm -rf`: remove the tree at `path`. Missing targets are fine.
    pub fn rimraf(&self, path: &str) -> Result<()> {
        match self.try_rimraf(path) {
            Err(error) if error.code == ENOENT => Ok(()),
            other => other,
        }
    }

    fn try_rimraf(&self, path: &str) -> Result<()> {
        let stats = self.lstat(path)?;
        if stats.is_directory() {
            for name in self.readdir(path)? {
                self.rimraf(&path::combine(path, &name))?;
            }
            self.rmdir(path)
        } else {
            self.unlink(path)
        }
    }
}
