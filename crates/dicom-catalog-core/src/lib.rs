pub mod cluster;
pub mod config;
pub mod dicom;
pub mod error;
pub mod index;
pub mod progress;
pub mod scanner;

pub use cluster::{ClusterBuilder, ClusterLevel, ClusterNode};
pub use config::AppConfig;
pub use dicom::{AttributeExtractor, PartTenExtractor};
pub use error::Error;
pub use index::catalog::{CatalogIndex, IndexingReport};
pub use index::directory::{DirectoryIndex, FileRecord};
pub use progress::{ProgressSchedule, ProgressSink, SilentSink};
