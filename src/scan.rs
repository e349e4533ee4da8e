//! Axis-based traversal over the tree: self, ancestors, or descendants,
//! filtered by caller-supplied predicates.

use crate::error::Result;
use crate::fs::FileSystem;
use crate::path;
use crate::stats::Stats;

/// Which direction a scan walks from its starting path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAxis {
    Ancestors,
    AncestorsOrSelf,
    Current,
    DescendantsOrSelf,
    Descendants,
}

/// Caller hooks for a scan. `accept` filters what is emitted; `traverse`
/// gates whether a directory's children are visited at all.
#[derive(Default)]
pub struct Traversal<'a> {
    pub accept: Option<Box<dyn Fn(&str, &Stats) -> bool + 'a>>,
    pub traverse: Option<Box<dyn Fn(&str, &Stats) -> bool + 'a>>,
}

impl<'a> Traversal<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(mut self, f: impl Fn(&str, &Stats) -> bool + 'a) -> Self {
        self.accept = Some(Box::new(f));
        self
    }

    pub fn traverse(mut self, f: impl Fn(&str, &Stats) -> bool + 'a) -> Self {
        self.traverse = Some(Box::new(f));
        self
    }
}

impl FileSystem {
    /// Paths along `axis` from `path`, in emission order: self first, then
    /// ancestors upward, or descendants in name order. Errors met while
    /// visiting children are skipped; only the starting walk's error
    /// surfaces.
    pub fn scan(&self, path: &str, axis: ScanAxis, traversal: &Traversal) -> Result<Vec<String>> {
        self.scan_from(path, axis, traversal, false)
    }

    /// Like [`scan`](FileSystem::scan) but never follows symlinks: links are
    /// reported with their own stats and not traversed through.
    pub fn lscan(&self, path: &str, axis: ScanAxis, traversal: &Traversal) -> Result<Vec<String>> {
        self.scan_from(path, axis, traversal, true)
    }

    fn scan_from(
        &self,
        path: &str,
        axis: ScanAxis,
        traversal: &Traversal,
        no_follow: bool,
    ) -> Result<Vec<String>> {
        let path = self.resolve_path(path)?;
        let stats = self.stat_resolved(&path, no_follow)?;
        let mut results = Vec::new();
        self.scan_node(&path, &stats, axis, traversal, no_follow, &mut results);
        Ok(results)
    }

    fn scan_node(
        &self,
        path: &str,
        stats: &Stats,
        axis: ScanAxis,
        traversal: &Traversal,
        no_follow: bool,
        results: &mut Vec<String>,
    ) {
        use ScanAxis::*;
        if matches!(axis, AncestorsOrSelf | Current | DescendantsOrSelf) {
            let accepted = traversal
                .accept
                .as_ref()
                .map_or(true, |accept| accept(path, stats));
            if accepted {
                results.push(path.to_string());
            }
        }
        if matches!(axis, AncestorsOrSelf | Ancestors) {
            let dirname = path::dirname(path);
            if dirname != path {
                if let Ok(stats) = self.stat_resolved(&dirname, no_follow) {
                    self.scan_node(&dirname, &stats, AncestorsOrSelf, traversal, no_follow, results);
                }
            }
        }
        if matches!(axis, DescendantsOrSelf | Descendants) {
            let descend = stats.is_directory()
                && traversal
                    .traverse
                    .as_ref()
                    .map_or(true, |traverse| traverse(path, stats));
            if descend {
                if let Ok(names) = self.readdir(path) {
                    for name in names {
                        let child = path::combine(path, &name);
                        if let Ok(stats) = self.stat_resolved(&child, no_follow) {
                            self.scan_node(
                                &child,
                                &stats,
                                DescendantsOrSelf,
                                traversal,
                                no_follow,
                                results,
                            );
                        }
                    }
                }
            }
        }
    }
}
