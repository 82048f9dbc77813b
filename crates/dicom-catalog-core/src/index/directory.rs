use crate::dicom::{self, AttributeExtractor, AttributeMap};
use crate::scanner::FileMeta;
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::debug;

/// One indexed file: filesystem fingerprint plus extracted attributes.
/// Immutable once hydrated; a re-scan replaces it wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub attributes: AttributeMap,
}

/// Per-directory cache of extracted file records.
///
/// Staleness is judged on file identity plus a (size, modified) fingerprint;
/// content is never re-read for the check. Known limitation: a file
/// rewritten with identical size within the filesystem's timestamp
/// granularity is not detected.
#[derive(Debug, Clone)]
pub struct DirectoryIndex {
    pub directory_path: PathBuf,
    pub records: Vec<FileRecord>,
    pub last_indexed: DateTime<Utc>,
    pub needs_reindex: bool,
}

impl DirectoryIndex {
    pub fn new(directory_path: PathBuf) -> Self {
        Self {
            directory_path,
            records: Vec::new(),
            last_indexed: Utc::now(),
            needs_reindex: true,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Populate `records` from a live listing of this directory, extracting
    /// attributes for every eligible file. Files that fail extraction are
    /// skipped. Returns false when no file yields a record, in which case
    /// the directory should not be admitted to a catalog.
    pub fn fill(&mut self, files: &[FileMeta], extractor: &dyn AttributeExtractor) -> bool {
        self.records.clear();
        for meta in files {
            if !dicom::is_candidate(&meta.name) {
                continue;
            }
            let path = self.directory_path.join(&meta.name);
            match extractor.extract(&path) {
                Ok(attributes) => self.records.push(FileRecord {
                    path,
                    size: meta.size,
                    modified: meta.modified,
                    attributes,
                }),
                Err(err) => {
                    debug!("Skipping {}: {}", path.display(), err);
                }
            }
        }
        self.last_indexed = Utc::now();
        self.needs_reindex = false;
        !self.records.is_empty()
    }

    /// Compare the live listing against the cached records by path and
    /// (size, modified) fingerprint. Any added, removed or modified file
    /// marks the directory for re-indexing. Returns the new flag value.
    pub fn check_actuality(&mut self, live: &[FileMeta]) -> bool {
        let live: Vec<&FileMeta> = live
            .iter()
            .filter(|meta| dicom::is_candidate(&meta.name))
            .collect();

        let mut stale = live.len() != self.records.len();
        if !stale {
            for meta in &live {
                let matched = self.records.iter().any(|record| {
                    record.path.file_name() == Some(OsStr::new(&meta.name))
                        && record.size == meta.size
                        && record.modified == meta.modified
                });
                if !matched {
                    stale = true;
                    break;
                }
            }
        }
        self.needs_reindex = stale;
        stale
    }

    /// Re-run `fill` against a fresh listing when the directory is marked
    /// stale; no-op otherwise. Returns whether a re-fill happened.
    pub fn update(&mut self, live: &[FileMeta], extractor: &dyn AttributeExtractor) -> bool {
        if !self.needs_reindex {
            return false;
        }
        self.fill(live, extractor);
        true
    }

    /// Content equality, ignoring record order: every record in self has a
    /// counterpart in other with identical path and attributes, and counts
    /// match. Duplicate paths are forbidden, so this is symmetric.
    pub fn content_eq(&self, other: &DirectoryIndex) -> bool {
        self.records.len() == other.records.len()
            && self.records.iter().all(|record| {
                other
                    .records
                    .iter()
                    .any(|o| o.path == record.path && o.attributes == record.attributes)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::{ExtractError, Tag};
    use std::path::Path;
    use std::time::{Duration, UNIX_EPOCH};

    /// Extractor that serves canned attribute maps keyed by file name and
    /// fails for names it does not know.
    struct CannedExtractor(Vec<(&'static str, Vec<(Tag, &'static str)>)>);

    impl AttributeExtractor for CannedExtractor {
        fn extract(&self, path: &Path) -> Result<AttributeMap, ExtractError> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            for (known, attrs) in &self.0 {
                if *known == name {
                    return Ok(attrs
                        .iter()
                        .map(|(tag, value)| (*tag, (*value).to_string()))
                        .collect());
                }
            }
            Err(ExtractError::Malformed("unreadable".to_string()))
        }
    }

    fn meta(name: &str, size: u64, secs: u64) -> FileMeta {
        FileMeta {
            name: name.to_string(),
            size,
            modified: UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    fn patient_tag() -> Tag {
        crate::dicom::tags::PATIENT_ID
    }

    #[test]
    fn test_fill_skips_failures_and_non_candidates() {
        let extractor = CannedExtractor(vec![("a.dcm", vec![(patient_tag(), "P1")])]);
        let mut index = DirectoryIndex::new(PathBuf::from("/tree/d1"));
        let filled = index.fill(
            &[
                meta("a.dcm", 10, 100),
                meta("broken.dcm", 11, 100),
                meta("notes.txt", 12, 100),
            ],
            &extractor,
        );
        assert!(filled);
        assert_eq!(index.len(), 1);
        assert_eq!(index.records[0].path, PathBuf::from("/tree/d1/a.dcm"));
        assert!(!index.needs_reindex);
    }

    #[test]
    fn test_fill_with_no_eligible_files_returns_false() {
        let extractor = CannedExtractor(vec![]);
        let mut index = DirectoryIndex::new(PathBuf::from("/tree/d1"));
        assert!(!index.fill(&[meta("readme.txt", 5, 1)], &extractor));
        assert!(index.is_empty());
    }

    #[test]
    fn test_check_actuality_detects_add_remove_modify() {
        let extractor = CannedExtractor(vec![
            ("a.dcm", vec![(patient_tag(), "P1")]),
            ("b.dcm", vec![(patient_tag(), "P1")]),
        ]);
        let listing = [meta("a.dcm", 10, 100), meta("b.dcm", 20, 100)];
        let mut index = DirectoryIndex::new(PathBuf::from("/tree/d1"));
        index.fill(&listing, &extractor);

        assert!(!index.check_actuality(&listing));

        // modified file
        assert!(index.check_actuality(&[meta("a.dcm", 10, 101), meta("b.dcm", 20, 100)]));
        // removed file
        assert!(index.check_actuality(&[meta("a.dcm", 10, 100)]));
        // added file
        assert!(index.check_actuality(&[
            meta("a.dcm", 10, 100),
            meta("b.dcm", 20, 100),
            meta("c.dcm", 5, 100),
        ]));
        // non-candidate churn is invisible
        index.check_actuality(&listing);
        assert!(!index.check_actuality(&[
            meta("a.dcm", 10, 100),
            meta("b.dcm", 20, 100),
            meta("thumbs.db", 1, 999),
        ]));
    }

    #[test]
    fn test_update_is_noop_when_current() {
        let extractor = CannedExtractor(vec![("a.dcm", vec![(patient_tag(), "P1")])]);
        let listing = [meta("a.dcm", 10, 100)];
        let mut index = DirectoryIndex::new(PathBuf::from("/tree/d1"));
        index.fill(&listing, &extractor);
        let stamp = index.last_indexed;

        index.check_actuality(&listing);
        assert!(!index.update(&listing, &extractor));
        assert_eq!(index.last_indexed, stamp);
    }

    #[test]
    fn test_content_eq_ignores_record_order() {
        let extractor = CannedExtractor(vec![
            ("a.dcm", vec![(patient_tag(), "P1")]),
            ("b.dcm", vec![(patient_tag(), "P2")]),
        ]);
        let mut left = DirectoryIndex::new(PathBuf::from("/tree/d1"));
        left.fill(&[meta("a.dcm", 10, 100), meta("b.dcm", 20, 100)], &extractor);
        let mut right = DirectoryIndex::new(PathBuf::from("/tree/d1"));
        right.fill(&[meta("b.dcm", 20, 100), meta("a.dcm", 10, 100)], &extractor);

        assert!(left.content_eq(&right));
        assert!(right.content_eq(&left));

        right.records.pop();
        assert!(!left.content_eq(&right));
    }
}
