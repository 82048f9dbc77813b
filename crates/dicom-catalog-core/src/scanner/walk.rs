use glob::Pattern;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::error;
use walkdir::WalkDir;

/// Metadata of one file as seen during enumeration.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// One directory of the enumerated tree. Empty directories are included.
#[derive(Debug)]
pub struct DirListing {
    pub directory_path: PathBuf,
    pub files: Vec<FileMeta>,
    pub children: Vec<DirListing>,
}

impl DirListing {
    fn new(directory_path: PathBuf) -> Self {
        Self {
            directory_path,
            files: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Recursive enumeration of the tree rooted at `root`, filtering by glob
/// ignore patterns. Siblings are visited in file-name order, so the tree is
/// deterministic for a given filesystem state. Skips symlinks. Directories
/// that cannot be read due to permissions are logged and skipped.
pub fn walk(root: &Path, ignore_globs: &[String]) -> io::Result<DirListing> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        ));
    }

    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    // Open directories live on the stack; a directory is attached to its
    // parent once the walk has moved past its subtree.
    let mut stack: Vec<DirListing> = Vec::new();
    let mut it = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = it.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.io_error().map(|e| e.kind()) == Some(io::ErrorKind::PermissionDenied) {
                    error!("Access denied under {}: {}", root.display(), err);
                    continue;
                }
                return Err(err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("directory walk failed")));
            }
        };

        let path = entry.path();
        if ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
        {
            if entry.file_type().is_dir() {
                it.skip_current_dir();
            }
            continue;
        }

        // close finished directories until the top of the stack is an
        // ancestor of this entry
        loop {
            let top_is_ancestor = match stack.last() {
                Some(top) => path.starts_with(&top.directory_path),
                None => break,
            };
            if top_is_ancestor {
                break;
            }
            let done = match stack.pop() {
                Some(done) => done,
                None => break,
            };
            match stack.last_mut() {
                Some(parent) => parent.children.push(done),
                None => {
                    return Err(io::Error::other(format!(
                        "walker yielded {} outside {}",
                        path.display(),
                        root.display()
                    )))
                }
            }
        }

        if entry.file_type().is_dir() {
            stack.push(DirListing::new(path.to_path_buf()));
        } else if entry.file_type().is_file() {
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    error!("Error getting metadata for {}: {}", path.display(), err);
                    continue;
                }
            };
            let modified = metadata.modified()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            match stack.last_mut() {
                Some(dir) => dir.files.push(FileMeta {
                    name,
                    size: metadata.len(),
                    modified,
                }),
                None => {
                    return Err(io::Error::other(format!(
                        "file entry {} before its directory",
                        path.display()
                    )))
                }
            }
        }
        // other entry types (symlinks, sockets) are skipped
    }

    let mut current = match stack.pop() {
        Some(dir) => dir,
        None => {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("nothing enumerated under {}", root.display()),
            ))
        }
    };
    while let Some(mut parent) = stack.pop() {
        parent.children.push(current);
        current = parent;
    }
    Ok(current)
}
