//! Comparator-ordered name → inode maps.
//!
//! Every map in a file system is keyed by the same comparator (byte order,
//! or an ASCII case fold); the ordering is what makes `readdir` listings
//! deterministic and reproducible across runs.

use core::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::inode::Inode;
use crate::path;

/// Map key: the original spelling plus the fold the map is ordered by.
#[derive(Debug, Clone, Eq)]
struct FileName {
    name: String,
    sort: String,
}

impl FileName {
    fn new(name: &str, ignore_case: bool) -> Self {
        FileName {
            name: name.to_string(),
            sort: if ignore_case {
                path::fold(name)
            } else {
                name.to_string()
            },
        }
    }
}

// Only the fold participates in ordering, so that a case-insensitive map
// treats `Foo` and `foo` as the same entry while listing the spelling that
// was inserted first.
impl PartialEq for FileName {
    fn eq(&self, other: &Self) -> bool {
        self.sort == other.sort
    }
}

impl PartialOrd for FileName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort.cmp(&other.sort)
    }
}

#[derive(Debug)]
pub(crate) struct LinkMap {
    ignore_case: bool,
    entries: BTreeMap<FileName, Arc<Inode>>,
}

impl LinkMap {
    pub fn new(ignore_case: bool) -> Self {
        LinkMap {
            ignore_case,
            entries: BTreeMap::new(),
        }
    }

    fn key(&self, name: &str) -> FileName {
        FileName::new(name, self.ignore_case)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Inode>> {
        self.entries.get(&self.key(name))
    }

    pub fn set(&mut self, name: &str, node: Arc<Inode>) {
        self.entries.insert(self.key(name), node);
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Inode>> {
        self.entries.remove(&self.key(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in comparator order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Inode>)> {
        self.entries.iter().map(|(key, node)| (key.name.as_str(), node))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().map(|key| key.name.clone()).collect()
    }
}
