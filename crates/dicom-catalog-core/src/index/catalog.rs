use crate::dicom::AttributeExtractor;
use crate::error::Error;
use crate::index::directory::{DirectoryIndex, FileRecord};
use crate::index::snapshot;
use crate::progress::{ProgressSchedule, ProgressSink};
use crate::scanner::{self, DirListing, FileMeta};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Relative phase weights. Reconcile dominates: hydration mostly hits the
/// snapshot cache, reconcile pays for every stale directory's extraction.
const PHASES: [(&str, f64); 3] = [("enumerate", 15.0), ("hydrate", 5.0), ("reconcile", 80.0)];
pub const DISPLAY_STEPS: u32 = 100;

/// The aggregate index over one directory tree root.
///
/// Owns one `DirectoryIndex` per admitted directory. Total record count is
/// bounded by `max_files`; once admitting a directory would exceed it, the
/// remaining directories are omitted and the catalog is a valid partial
/// result. Not internally synchronized — callers serialize indexing runs
/// against the same instance.
pub struct CatalogIndex {
    directories: BTreeMap<PathBuf, DirectoryIndex>,
    max_files: usize,
    ignore_patterns: Vec<String>,
    cancel: Arc<AtomicBool>,
}

/// Wall-clock timings and counters for one indexing run.
#[derive(Debug, Default)]
pub struct IndexingReport {
    pub enumerate_duration: Duration,
    pub hydrate_duration: Duration,
    pub reconcile_duration: Duration,
    pub directories_indexed: usize,
    pub directories_skipped: usize,
    pub files_indexed: usize,
    pub snapshot_hits: usize,
    pub fresh_fills: usize,
    pub updated_directories: usize,
    pub cancelled: bool,
}

impl CatalogIndex {
    pub fn new(max_files: usize) -> Self {
        Self {
            directories: BTreeMap::new(),
            max_files,
            ignore_patterns: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    /// Shared token for cooperative cancellation. Checked between
    /// per-directory units of work, never mid-directory; a cancelled run
    /// returns a valid partial catalog, not an error.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Release all directory state, e.g. before re-running against a
    /// different root.
    pub fn clear(&mut self) {
        self.directories.clear();
    }

    pub fn total_records(&self) -> usize {
        self.directories.values().map(DirectoryIndex::len).sum()
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    pub fn get(&self, directory: &Path) -> Option<&DirectoryIndex> {
        self.directories.get(directory)
    }

    pub fn directories(&self) -> impl Iterator<Item = &DirectoryIndex> {
        self.directories.values()
    }

    /// Flat view over every record, feeding the cluster builder.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.directories.values().flat_map(|dir| dir.records.iter())
    }

    /// Run the full indexing pipeline against `root`:
    /// 1. Enumerate the directory tree (pure I/O)
    /// 2. Hydrate each directory from its persisted snapshot, or extract
    ///    fresh, admitting directories up to the file ceiling
    /// 3. Reconcile every held directory against the live listing and
    ///    persist snapshots for those that changed
    pub fn catalog_indexing(
        &mut self,
        root: &Path,
        extractor: &dyn AttributeExtractor,
        verbose: bool,
        sink: &dyn ProgressSink,
    ) -> Result<IndexingReport, Error> {
        self.cancel.store(false, Ordering::Relaxed);
        let schedule = ProgressSchedule::new(&PHASES, DISPLAY_STEPS)?;
        let steps = schedule.display_steps();
        let mut report = IndexingReport::default();

        // Phase 1: enumerate
        sink.on_phase_start("enumerate");
        let phase_start = Instant::now();
        let tree = scanner::walk(root, &self.ignore_patterns)?;
        report.enumerate_duration = phase_start.elapsed();
        let (_, enumerate_end) = schedule.sub_range(0);
        sink.on_position(enumerate_end, steps);
        sink.on_phase_complete("enumerate", report.enumerate_duration.as_secs_f64());

        // Lexicographic path order doubles as the admission tie-break for
        // the file ceiling, so repeat runs admit the same prefix.
        let listings: BTreeMap<PathBuf, Vec<FileMeta>> = flatten(tree).into_iter().collect();
        if verbose {
            info!(
                "Enumerated {} directories under {} in {:.2}s",
                listings.len(),
                root.display(),
                report.enumerate_duration.as_secs_f64(),
            );
        }

        // Phase 2: hydrate
        sink.on_phase_start("hydrate");
        let phase_start = Instant::now();
        let (hydrate_start, hydrate_end) = schedule.sub_range(1);
        let hydrate_width = hydrate_end - hydrate_start;
        let total_dirs = listings.len().max(1);
        let mut dirty: BTreeSet<PathBuf> = BTreeSet::new();
        let mut total = self.total_records();

        for (i, (dir_path, files)) in listings.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                break;
            }
            sink.on_position(
                hydrate_start + hydrate_width * i as f64 / total_dirs as f64,
                steps,
            );
            if self.directories.contains_key(dir_path) {
                continue;
            }

            let (index, freshly_filled) = match snapshot::load(dir_path)? {
                Some(index) => {
                    report.snapshot_hits += 1;
                    (index, false)
                }
                None => {
                    let mut index = DirectoryIndex::new(dir_path.clone());
                    if !index.fill(files, extractor) {
                        trace!("No eligible files in {}", dir_path.display());
                        continue;
                    }
                    report.fresh_fills += 1;
                    (index, true)
                }
            };
            if index.is_empty() {
                continue;
            }
            if total + index.len() > self.max_files {
                report.directories_skipped = listings.len() - i;
                debug!(
                    "File ceiling {} reached at {}; stopping admission",
                    self.max_files,
                    dir_path.display(),
                );
                break;
            }
            total += index.len();
            if freshly_filled {
                dirty.insert(dir_path.clone());
            }
            self.directories.insert(dir_path.clone(), index);
        }
        report.hydrate_duration = phase_start.elapsed();
        sink.on_position(hydrate_end, steps);
        sink.on_phase_complete("hydrate", report.hydrate_duration.as_secs_f64());
        if verbose {
            info!(
                "Hydrated {} directories ({} from snapshots, {} fresh) in {:.2}s",
                self.directories.len(),
                report.snapshot_hits,
                report.fresh_fills,
                report.hydrate_duration.as_secs_f64(),
            );
        }

        // Phase 3: reconcile
        if !report.cancelled {
            sink.on_phase_start("reconcile");
            let phase_start = Instant::now();
            let (reconcile_start, reconcile_end) = schedule.sub_range(2);
            let reconcile_width = reconcile_end - reconcile_start;

            // held directories that vanished from the tree
            let gone: Vec<PathBuf> = self
                .directories
                .keys()
                .filter(|path| !listings.contains_key(*path))
                .cloned()
                .collect();
            for path in gone {
                debug!("Dropping vanished directory {}", path.display());
                self.directories.remove(&path);
            }

            let paths: Vec<PathBuf> = self.directories.keys().cloned().collect();
            let total_dirs = paths.len().max(1);
            for (i, path) in paths.iter().enumerate() {
                if self.cancel.load(Ordering::Relaxed) {
                    report.cancelled = true;
                    break;
                }
                sink.on_position(
                    reconcile_start + reconcile_width * i as f64 / total_dirs as f64,
                    steps,
                );
                let live = match listings.get(path) {
                    Some(live) => live,
                    None => continue,
                };
                let index = match self.directories.get_mut(path) {
                    Some(index) => index,
                    None => continue,
                };
                if index.check_actuality(live) {
                    index.update(live, extractor);
                    report.updated_directories += 1;
                    dirty.insert(path.clone());
                }
                if dirty.contains(path) {
                    snapshot::save(index)?;
                }
                let now_empty = index.is_empty();
                if now_empty {
                    self.directories.remove(path);
                }
            }
            report.reconcile_duration = phase_start.elapsed();
            sink.on_position(steps, steps);
            sink.on_phase_complete("reconcile", report.reconcile_duration.as_secs_f64());
            if verbose {
                info!(
                    "Reconciled {} directories ({} re-indexed) in {:.2}s",
                    paths.len(),
                    report.updated_directories,
                    report.reconcile_duration.as_secs_f64(),
                );
            }
        }

        report.directories_indexed = self.directories.len();
        report.files_indexed = self.total_records();
        if verbose {
            info!(
                "Catalog: {} directories, {} files{}",
                report.directories_indexed,
                report.files_indexed,
                if report.cancelled { " (cancelled)" } else { "" },
            );
        }
        Ok(report)
    }
}

/// Catalog equality is a set comparison of directories by content,
/// independent of insertion order and of record order within a directory.
impl PartialEq for CatalogIndex {
    fn eq(&self, other: &Self) -> bool {
        self.directories.len() == other.directories.len()
            && self.directories.iter().all(|(path, dir)| {
                other
                    .directories
                    .get(path)
                    .is_some_and(|o| dir.content_eq(o))
            })
    }
}

/// Unroll the nested listing tree into (directory, files) pairs with an
/// explicit worklist, parent before children, siblings in name order.
fn flatten(tree: DirListing) -> Vec<(PathBuf, Vec<FileMeta>)> {
    let mut flat = Vec::new();
    let mut pending = vec![tree];
    while let Some(node) = pending.pop() {
        flat.push((node.directory_path, node.files));
        pending.extend(node.children.into_iter().rev());
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_is_parent_first_in_name_order() {
        let mk = |path: &str| DirListing {
            directory_path: PathBuf::from(path),
            files: Vec::new(),
            children: Vec::new(),
        };
        let mut root = mk("/r");
        let mut a = mk("/r/a");
        a.children.push(mk("/r/a/inner"));
        root.children.push(a);
        root.children.push(mk("/r/b"));

        let order: Vec<PathBuf> = flatten(root).into_iter().map(|(path, _)| path).collect();
        assert_eq!(
            order,
            vec![
                PathBuf::from("/r"),
                PathBuf::from("/r/a"),
                PathBuf::from("/r/a/inner"),
                PathBuf::from("/r/b"),
            ]
        );
    }
}
