//! Folds flat file records into the Patient→Study→Series→Instance tree.

use crate::dicom::tags;
use crate::dicom::Tag;
use crate::index::directory::FileRecord;
use ahash::{AHashMap, AHashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLevel {
    Patient,
    Study,
    Series,
    Instance,
}

impl fmt::Display for ClusterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClusterLevel::Patient => "Patient",
            ClusterLevel::Study => "Study",
            ClusterLevel::Series => "Series",
            ClusterLevel::Instance => "Instance",
        })
    }
}

/// One node of the hierarchy. `id` comes from the level's identifying
/// attribute, `description` from its human-readable attribute with the id as
/// fallback. Instance nodes have no children.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode {
    pub level: ClusterLevel,
    pub id: String,
    pub description: String,
    pub children: Vec<ClusterNode>,
}

impl ClusterNode {
    fn new(level: ClusterLevel, id: &str, description: &str) -> Self {
        Self {
            level,
            id: id.to_string(),
            description: if description.is_empty() {
                id.to_string()
            } else {
                description.to_string()
            },
            children: Vec::new(),
        }
    }
}

pub struct ClusterBuilder;

impl ClusterBuilder {
    /// Group records by PatientID, then StudyInstanceUID, then
    /// SeriesInstanceUID; series members become Instance leaves. Records
    /// missing an identifying attribute fall into an empty-id group rather
    /// than being dropped. Records identical across all four identifying
    /// tags collapse to a single instance even when their paths differ
    /// (the same image indexed from two directory mirrors).
    ///
    /// Pure: derives a fresh tree on every call, never persisted.
    pub fn build<'a, I>(records: I) -> Vec<ClusterNode>
    where
        I: IntoIterator<Item = &'a FileRecord>,
    {
        let mut seen: AHashSet<[&str; 4]> = AHashSet::new();
        let mut patients: AHashMap<&str, AHashMap<&str, AHashMap<&str, Vec<&FileRecord>>>> =
            AHashMap::new();

        let mut kept: Vec<&FileRecord> = Vec::new();
        for record in records {
            let identity = [
                attr(record, tags::PATIENT_ID),
                attr(record, tags::STUDY_INSTANCE_UID),
                attr(record, tags::SERIES_INSTANCE_UID),
                attr(record, tags::SOP_INSTANCE_UID),
            ];
            if !seen.insert(identity) {
                continue;
            }
            kept.push(record);
        }
        for record in &kept {
            patients
                .entry(attr(record, tags::PATIENT_ID))
                .or_default()
                .entry(attr(record, tags::STUDY_INSTANCE_UID))
                .or_default()
                .entry(attr(record, tags::SERIES_INSTANCE_UID))
                .or_default()
                .push(record);
        }

        let mut roots = Vec::with_capacity(patients.len());
        for (patient_id, studies) in sorted(patients) {
            let mut patient_records: Vec<&FileRecord> = Vec::new();
            let mut study_nodes = Vec::with_capacity(studies.len());

            for (study_id, series_map) in sorted(studies) {
                let mut study_records: Vec<&FileRecord> = Vec::new();
                let mut series_nodes = Vec::with_capacity(series_map.len());

                for (series_id, mut members) in sorted(series_map) {
                    members.sort_by(|a, b| instance_order(a).cmp(&instance_order(b)));
                    let mut series = ClusterNode::new(
                        ClusterLevel::Series,
                        series_id,
                        first_non_empty(&members, tags::SERIES_DESCRIPTION),
                    );
                    series.children = members
                        .iter()
                        .map(|record| {
                            ClusterNode::new(
                                ClusterLevel::Instance,
                                attr(record, tags::SOP_INSTANCE_UID),
                                attr(record, tags::INSTANCE_NUMBER),
                            )
                        })
                        .collect();
                    study_records.extend(members);
                    series_nodes.push(series);
                }

                let mut study = ClusterNode::new(
                    ClusterLevel::Study,
                    study_id,
                    first_non_empty(&study_records, tags::STUDY_DESCRIPTION),
                );
                study.children = series_nodes;
                patient_records.extend(study_records);
                study_nodes.push(study);
            }

            let mut patient = ClusterNode::new(
                ClusterLevel::Patient,
                patient_id,
                first_non_empty(&patient_records, tags::PATIENT_NAME),
            );
            patient.children = study_nodes;
            roots.push(patient);
        }
        roots
    }
}

fn attr(record: &FileRecord, tag: Tag) -> &str {
    record.attributes.get(&tag).map(String::as_str).unwrap_or("")
}

/// First non-empty value of `tag` across the group, in the group's order.
fn first_non_empty<'a>(records: &[&'a FileRecord], tag: Tag) -> &'a str {
    records
        .iter()
        .map(|record| attr(record, tag))
        .find(|value| !value.is_empty())
        .unwrap_or("")
}

/// Instances sort by numeric InstanceNumber when present, then by SOP UID.
fn instance_order<'a>(record: &'a FileRecord) -> (u32, &'a str) {
    let number = attr(record, tags::INSTANCE_NUMBER)
        .trim()
        .parse::<u32>()
        .unwrap_or(u32::MAX);
    (number, attr(record, tags::SOP_INSTANCE_UID))
}

fn sorted<K: Ord, V>(map: AHashMap<K, V>) -> Vec<(K, V)> {
    let mut entries: Vec<(K, V)> = map.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}
