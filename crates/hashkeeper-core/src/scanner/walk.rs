use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Error;
use crate::scanner::filter::NoiseFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub is_directory: bool,
    pub size: u64,
}

/// Depth-first traversal of `root`, lazily yielding directories and the files
/// `filter` accepts.
///
/// Failures are yielded as `Err` items rather than ending the iteration: an
/// unreadable directory becomes [`Error::DirectoryAccessDenied`] and its
/// subtree is skipped, an entry whose metadata cannot be read becomes
/// [`Error::Unreadable`]. Symlinks are followed and reported under the link's
/// own path; a link back to one of its ancestors is yielded as
/// [`Error::DirectoryAccessDenied`] and not descended. A dangling link is
/// [`Error::Unreadable`]. Siblings are visited in file-name order.
pub fn walk<'a>(
    root: &Path,
    filter: &'a NoiseFilter,
) -> impl Iterator<Item = Result<FileDescriptor, Error>> + 'a {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => return Some(Err(classify(err))),
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                return Some(Ok(FileDescriptor {
                    path: entry.into_path(),
                    is_directory: true,
                    size: 0,
                }));
            }
            if !file_type.is_file() {
                debug!("Skipping non-regular file {}", entry.path().display());
                return None;
            }
            if !filter.accepts(entry.path()) {
                debug!("Filtered out {}", entry.path().display());
                return None;
            }

            match entry.metadata() {
                Ok(metadata) => Some(Ok(FileDescriptor {
                    path: entry.into_path(),
                    is_directory: false,
                    size: metadata.len(),
                })),
                Err(err) => {
                    let path = entry.into_path();
                    warn!("Cannot stat {}: {}", path.display(), err);
                    Some(Err(Error::Unreadable {
                        path,
                        source: io::Error::from(err),
                    }))
                }
            }
        })
}

fn classify(err: walkdir::Error) -> Error {
    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
    let message = err.to_string();
    if err.loop_ancestor().is_some() || path.is_dir() {
        warn!("Skipping directory {}: {}", path.display(), message);
        Error::DirectoryAccessDenied { path, message }
    } else {
        warn!("Skipping entry {}: {}", path.display(), message);
        Error::Unreadable {
            path,
            source: io::Error::from(err),
        }
    }
}

/// Text after the last `.` of the file name. Empty when there is no dot or
/// the only dot starts the name (`.bashrc`).
pub fn extension_of(path: &Path) -> String {
    let Some(name) = path.file_name() else {
        return String::new();
    };
    let name = name.to_string_lossy();
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => name[idx + 1..].to_string(),
    }
}
