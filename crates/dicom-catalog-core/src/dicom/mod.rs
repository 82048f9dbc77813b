pub mod part10;
pub mod tags;

pub use part10::PartTenExtractor;
pub use tags::{AttributeMap, Tag};

use std::path::Path;
use thiserror::Error;

/// Why a single file failed attribute extraction. Per-file failures are
/// transient: the file is skipped and the directory continues.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Malformed(String),
}

/// Parses one file's binary format into a tag→value map.
///
/// The catalog consumes this as a plain data producer; `PartTenExtractor` is
/// the bundled implementation, full toolkits can be plugged in at this seam.
pub trait AttributeExtractor {
    fn extract(&self, path: &Path) -> Result<AttributeMap, ExtractError>;
}

/// File-name eligibility check. DICOM files in the wild carry a .dcm, .dicom
/// or .ima extension, or none at all (media interchange layouts).
pub fn is_candidate(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty() && matches!(ext.to_ascii_lowercase().as_str(), "dcm" | "dicom" | "ima")
        }
        None => !name.is_empty(),
    }
}
