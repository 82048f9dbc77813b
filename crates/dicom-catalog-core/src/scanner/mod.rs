mod walk;

pub use walk::{walk, DirListing, FileMeta};
