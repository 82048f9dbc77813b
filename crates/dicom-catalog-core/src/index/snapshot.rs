//! Persisted per-directory snapshots.
//!
//! Two JSON schema variants are maintained for external consumers: the
//! current layout and the legacy one it replaced. Each is a pure projection
//! of the record list behind the same `SnapshotSchema` interface, selected
//! by its explicit version tag. Both variants are written on every
//! directory update; loading prefers the current file and falls back to the
//! legacy one.

use crate::dicom::AttributeMap;
use crate::error::Error;
use crate::index::directory::{DirectoryIndex, FileRecord};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use tracing::warn;

pub const CURRENT_SNAPSHOT_FILE: &str = ".dicom-catalog.json";
pub const LEGACY_SNAPSHOT_FILE: &str = ".dicom-catalog.v1.json";

const CURRENT_VERSION: u32 = 2;
const LEGACY_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    Legacy,
    Current,
}

pub trait SnapshotSchema {
    fn version(&self) -> SchemaVersion;
    fn file_name(&self) -> &'static str;
    fn encode(&self, index: &DirectoryIndex) -> Result<String, Error>;
    fn decode(&self, raw: &str) -> Result<DirectoryIndex, Error>;
}

/// Load order: current first, legacy fallback.
const SCHEMAS: [&dyn SnapshotSchema; 2] = [&CurrentSchema, &LegacySchema];

/// Load a directory's persisted snapshot. `Ok(None)` when no snapshot file
/// exists; a snapshot that parses under neither schema is an error.
pub fn load(directory: &Path) -> Result<Option<DirectoryIndex>, Error> {
    let mut corrupt: Option<Error> = None;
    for schema in SCHEMAS {
        let path = directory.join(schema.file_name());
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        match schema.decode(&raw) {
            Ok(index) => return Ok(Some(index)),
            Err(err) => {
                warn!("Snapshot {} unreadable: {}", path.display(), err);
                corrupt = Some(err);
            }
        }
    }
    match corrupt {
        Some(err) => Err(err),
        None => Ok(None),
    }
}

/// Write both schema projections into the indexed directory.
pub fn save(index: &DirectoryIndex) -> Result<(), Error> {
    for schema in SCHEMAS {
        let path = index.directory_path.join(schema.file_name());
        fs::write(&path, schema.encode(index)?)?;
    }
    Ok(())
}

pub struct CurrentSchema;

#[derive(Serialize, Deserialize)]
struct CurrentSnapshot {
    schema: u32,
    directory: String,
    last_indexed: DateTime<Utc>,
    files: Vec<CurrentFile>,
}

#[derive(Serialize, Deserialize)]
struct CurrentFile {
    path: String,
    size: u64,
    modified: DateTime<Utc>,
    attributes: AttributeMap,
}

impl SnapshotSchema for CurrentSchema {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::Current
    }

    fn file_name(&self) -> &'static str {
        CURRENT_SNAPSHOT_FILE
    }

    fn encode(&self, index: &DirectoryIndex) -> Result<String, Error> {
        let snapshot = CurrentSnapshot {
            schema: CURRENT_VERSION,
            directory: index.directory_path.to_string_lossy().into_owned(),
            last_indexed: index.last_indexed,
            files: index
                .records
                .iter()
                .map(|record| CurrentFile {
                    path: record.path.to_string_lossy().into_owned(),
                    size: record.size,
                    modified: record.modified.into(),
                    attributes: record.attributes.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    fn decode(&self, raw: &str) -> Result<DirectoryIndex, Error> {
        let snapshot: CurrentSnapshot = serde_json::from_str(raw)?;
        if snapshot.schema != CURRENT_VERSION {
            return Err(Error::Snapshot(format!(
                "unsupported schema tag {}",
                snapshot.schema
            )));
        }
        Ok(DirectoryIndex {
            directory_path: snapshot.directory.into(),
            records: snapshot
                .files
                .into_iter()
                .map(|file| FileRecord {
                    path: file.path.into(),
                    size: file.size,
                    modified: file.modified.into(),
                    attributes: file.attributes,
                })
                .collect(),
            last_indexed: snapshot.last_indexed,
            needs_reindex: false,
        })
    }
}

pub struct LegacySchema;

#[derive(Serialize, Deserialize)]
struct LegacySnapshot {
    version: u32,
    dir: String,
    indexed_at: i64,
    entries: Vec<LegacyEntry>,
}

#[derive(Serialize, Deserialize)]
struct LegacyEntry {
    file: String,
    bytes: u64,
    mtime_s: u64,
    mtime_ns: u32,
    tags: Vec<LegacyTag>,
}

#[derive(Serialize, Deserialize)]
struct LegacyTag {
    key: String,
    value: String,
}

impl SnapshotSchema for LegacySchema {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::Legacy
    }

    fn file_name(&self) -> &'static str {
        LEGACY_SNAPSHOT_FILE
    }

    fn encode(&self, index: &DirectoryIndex) -> Result<String, Error> {
        let entries = index
            .records
            .iter()
            .map(|record| {
                let mtime = record
                    .modified
                    .duration_since(UNIX_EPOCH)
                    .map_err(|_| Error::Snapshot("pre-epoch modification time".to_string()))?;
                Ok(LegacyEntry {
                    file: record.path.to_string_lossy().into_owned(),
                    bytes: record.size,
                    mtime_s: mtime.as_secs(),
                    mtime_ns: mtime.subsec_nanos(),
                    tags: record
                        .attributes
                        .iter()
                        .map(|(tag, value)| LegacyTag {
                            key: tag.to_string(),
                            value: value.clone(),
                        })
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let snapshot = LegacySnapshot {
            version: LEGACY_VERSION,
            dir: index.directory_path.to_string_lossy().into_owned(),
            indexed_at: index.last_indexed.timestamp(),
            entries,
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    fn decode(&self, raw: &str) -> Result<DirectoryIndex, Error> {
        let snapshot: LegacySnapshot = serde_json::from_str(raw)?;
        if snapshot.version != LEGACY_VERSION {
            return Err(Error::Snapshot(format!(
                "unsupported version tag {}",
                snapshot.version
            )));
        }
        let records = snapshot
            .entries
            .into_iter()
            .map(|entry| {
                let mut attributes = AttributeMap::new();
                for tag in entry.tags {
                    let key = tag
                        .key
                        .parse()
                        .map_err(|e: String| Error::Snapshot(e))?;
                    attributes.insert(key, tag.value);
                }
                Ok(FileRecord {
                    path: entry.file.into(),
                    size: entry.bytes,
                    modified: UNIX_EPOCH + Duration::new(entry.mtime_s, entry.mtime_ns),
                    attributes,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(DirectoryIndex {
            directory_path: snapshot.dir.into(),
            records,
            last_indexed: Utc
                .timestamp_opt(snapshot.indexed_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
            needs_reindex: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::tags;
    use tempfile::tempdir;

    fn sample_index(dir: &Path) -> DirectoryIndex {
        let mut attributes = AttributeMap::new();
        attributes.insert(tags::PATIENT_ID, "P001".to_string());
        attributes.insert(tags::STUDY_INSTANCE_UID, "1.2.3".to_string());
        DirectoryIndex {
            directory_path: dir.to_path_buf(),
            records: vec![FileRecord {
                path: dir.join("a.dcm"),
                size: 42,
                modified: UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789),
                attributes,
            }],
            last_indexed: Utc.timestamp_opt(1_700_000_100, 0).single().unwrap(),
            needs_reindex: false,
        }
    }

    #[test]
    fn test_save_writes_both_variants_and_load_prefers_current() {
        let tmp = tempdir().unwrap();
        let index = sample_index(tmp.path());
        save(&index).unwrap();

        assert!(tmp.path().join(CURRENT_SNAPSHOT_FILE).exists());
        assert!(tmp.path().join(LEGACY_SNAPSHOT_FILE).exists());

        let loaded = load(tmp.path()).unwrap().unwrap();
        assert!(loaded.content_eq(&index));
        assert_eq!(loaded.records[0].modified, index.records[0].modified);
        assert_eq!(loaded.last_indexed, index.last_indexed);
        assert!(!loaded.needs_reindex);
    }

    #[test]
    fn test_legacy_fallback_when_current_missing() {
        let tmp = tempdir().unwrap();
        let index = sample_index(tmp.path());
        fs::write(
            tmp.path().join(LEGACY_SNAPSHOT_FILE),
            LegacySchema.encode(&index).unwrap(),
        )
        .unwrap();

        let loaded = load(tmp.path()).unwrap().unwrap();
        assert!(loaded.content_eq(&index));
        // nanosecond fingerprint survives the legacy layout too
        assert_eq!(loaded.records[0].modified, index.records[0].modified);
    }

    #[test]
    fn test_absent_snapshot_is_none() {
        let tmp = tempdir().unwrap();
        assert!(load(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_fatal() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join(CURRENT_SNAPSHOT_FILE), "{not json").unwrap();
        assert!(load(tmp.path()).is_err());
    }

    #[test]
    fn test_corrupt_current_falls_back_to_valid_legacy() {
        let tmp = tempdir().unwrap();
        let index = sample_index(tmp.path());
        fs::write(tmp.path().join(CURRENT_SNAPSHOT_FILE), "garbage").unwrap();
        fs::write(
            tmp.path().join(LEGACY_SNAPSHOT_FILE),
            LegacySchema.encode(&index).unwrap(),
        )
        .unwrap();

        let loaded = load(tmp.path()).unwrap().unwrap();
        assert!(loaded.content_eq(&index));
    }

    #[test]
    fn test_wrong_version_tag_rejected() {
        let raw = r#"{"schema":9,"directory":"/d","last_indexed":"2024-01-01T00:00:00Z","files":[]}"#;
        assert!(matches!(
            CurrentSchema.decode(raw),
            Err(Error::Snapshot(_))
        ));
    }

    #[test]
    fn test_schema_identity() {
        assert_eq!(CurrentSchema.version(), SchemaVersion::Current);
        assert_eq!(LegacySchema.version(), SchemaVersion::Legacy);
        assert_ne!(CurrentSchema.file_name(), LegacySchema.file_name());
    }
}
