//! Declarative population: build a tree from a literal description.
//!
//! Content lands in two phases. Directories and file bytes are created
//! first; hard links, symlinks and mounts are deferred until everything
//! else exists, so their sources and lexical targets are resolvable no
//! matter where they appear in the literal.

use std::sync::Arc;

use crate::error::Result;
use crate::fs::FileSystem;
use crate::meta::MetaValue;
use crate::path::{self, ValidationFlags};
use crate::resolver::FileSystemResolver;

/// An ordered tree literal: `(path fragment, entry)` pairs. Fragments are
/// relative to the enclosing directory, or to the cwd at the top level.
#[derive(Default, Clone)]
pub struct FileSet(pub Vec<(String, Entry)>);

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, path: impl Into<String>, entry: impl Into<Entry>) -> Self {
        self.0.push((path.into(), entry.into()));
        self
    }
}

#[derive(Clone)]
pub enum Entry {
    Directory(FileSet),
    File(File),
    Link(Link),
    Symlink(Symlink),
    Mount(Mount),
    /// Remove whatever is at the path, recursively. A missing target is
    /// fine.
    Rimraf,
}

/// File content, with optional metadata entries.
#[derive(Clone, Default)]
pub struct File {
    pub data: Vec<u8>,
    pub meta: Vec<(String, MetaValue)>,
}

impl File {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        File {
            data: data.into(),
            meta: Vec::new(),
        }
    }

    pub fn text(data: &str) -> Self {
        Self::new(data.as_bytes().to_vec())
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.meta.push((key.into(), value.into()));
        self
    }
}

/// A hard link to the inode at `path`.
#[derive(Clone)]
pub struct Link {
    pub path: String,
}

impl Link {
    pub fn new(path: impl Into<String>) -> Self {
        Link { path: path.into() }
    }
}

/// A symbolic link with the given stored text.
#[derive(Clone)]
pub struct Symlink {
    pub target: String,
    pub meta: Vec<(String, MetaValue)>,
}

impl Symlink {
    pub fn new(target: impl Into<String>) -> Self {
        Symlink {
            target: target.into(),
            meta: Vec::new(),
        }
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.meta.push((key.into(), value.into()));
        self
    }
}

/// A directory whose children come from an external resolver.
#[derive(Clone)]
pub struct Mount {
    pub source: String,
    pub resolver: Arc<dyn FileSystemResolver>,
    pub meta: Vec<(String, MetaValue)>,
}

impl Mount {
    pub fn new(source: impl Into<String>, resolver: Arc<dyn FileSystemResolver>) -> Self {
        Mount {
            source: source.into(),
            resolver,
            meta: Vec::new(),
        }
    }
}

impl From<&str> for Entry {
    fn from(data: &str) -> Self {
        Entry::File(File::text(data))
    }
}

impl From<String> for Entry {
    fn from(data: String) -> Self {
        Entry::File(File::new(data.into_bytes()))
    }
}

impl From<Vec<u8>> for Entry {
    fn from(data: Vec<u8>) -> Self {
        Entry::File(File::new(data))
    }
}

impl From<FileSet> for Entry {
    fn from(files: FileSet) -> Self {
        Entry::Directory(files)
    }
}

impl From<File> for Entry {
    fn from(file: File) -> Self {
        Entry::File(file)
    }
}

impl From<Link> for Entry {
    fn from(link: Link) -> Self {
        Entry::Link(link)
    }
}

impl From<Symlink> for Entry {
    fn from(symlink: Symlink) -> Self {
        Entry::Symlink(symlink)
    }
}

impl From<Mount> for Entry {
    fn from(mount: Mount) -> Self {
        Entry::Mount(mount)
    }
}

enum Deferred {
    Link(Link),
    Symlink(Symlink),
    Mount(Mount),
}

impl FileSystem {
    /// Populate from a tree literal.
    ///
    /// Structurally invalid roots (a root that is a file, hard link,
    /// symlink, or deletion) are bugs in the literal and panic; they are
    /// never `IoError`s.
    pub fn apply(&self, files: &FileSet) -> Result<()> {
        self.check_writable()?;
        let mut deferred = Vec::new();
        self.apply_worker(files, &self.cwd(), &mut deferred)?;
        for (entry, target) in deferred {
            let dirname = path::dirname(&target);
            self.mkdirp(&dirname)?;
            self.pushd(Some(dirname.as_str()))?;
            let result = match &entry {
                Deferred::Symlink(symlink) => self
                    .symlink(&symlink.target, &target)
                    .and_then(|_| self.apply_meta(&target, &symlink.meta)),
                Deferred::Link(link) => self.link(&link.path, &target),
                Deferred::Mount(mount) => self
                    .mount(&mount.source, &target, mount.resolver.clone())
                    .and_then(|_| self.apply_meta(&target, &mount.meta)),
            };
            self.popd()?;
            result?;
        }
        Ok(())
    }

    fn apply_worker(
        &self,
        files: &FileSet,
        dirname: &str,
        deferred: &mut Vec<(Deferred, String)>,
    ) -> Result<()> {
        for (fragment, entry) in &files.0 {
            let target = path::resolve(dirname, fragment);
            path::validate(&target, ValidationFlags::ABSOLUTE)?;
            let is_root = path::equals(&path::dirname(&target), &target, self.ignore_case());
            match entry {
                Entry::Rimraf => {
                    if is_root {
                        panic!("Roots cannot be deleted.");
                    }
                    self.rimraf(&target)?;
                }
                Entry::File(file) => {
                    if is_root {
                        panic!("Roots cannot be files.");
                    }
                    self.mkdirp(&path::dirname(&target))?;
                    self.write_file(&target, &file.data)?;
                    self.apply_meta(&target, &file.meta)?;
                }
                Entry::Directory(children) => {
                    self.mkdirp(&target)?;
                    self.apply_worker(children, &target, deferred)?;
                }
                Entry::Link(link) => {
                    if is_root {
                        panic!("Roots cannot be hard links.");
                    }
                    deferred.push((Deferred::Link(link.clone()), target));
                }
                Entry::Symlink(symlink) => {
                    if is_root {
                        panic!("Roots cannot be symbolic links.");
                    }
                    deferred.push((Deferred::Symlink(symlink.clone()), target));
                }
                Entry::Mount(mount) => {
                    deferred.push((Deferred::Mount(mount.clone()), target));
                }
            }
        }
        Ok(())
    }

    fn apply_meta(&self, path: &str, meta: &[(String, MetaValue)]) -> Result<()> {
        if meta.is_empty() {
            return Ok(());
        }
        let map = self.filemeta(path)?;
        for (key, value) in meta {
            map.set(key, value.clone());
        }
        Ok(())
    }
}
