//! Expansion of a local file selection into what an upload has to create.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use dropmirror_common::{Error, RemotePath, Result};

/// One local file or folder with its place relative to the upload target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalItem {
    pub source: PathBuf,
    /// Path below the destination folder, always `/`-separated.
    pub target: RemotePath,
    pub size: u64,
}

/// Folders (parents before children) and files of a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSelection {
    pub folders: Vec<LocalItem>,
    pub files: Vec<LocalItem>,
}

impl LocalSelection {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Expand selected files and folders.
///
/// A selected file lands directly in the destination. A selected folder is
/// walked and recreated below the destination under its own name. Dot files
/// are skipped, and so are dot folders found inside a selected folder.
///
/// # Errors
/// - `Io` if a path cannot be read
/// - `InvalidInput` if a name is not valid UTF-8
pub fn expand_selection(paths: &[PathBuf]) -> Result<LocalSelection> {
    let mut selection = LocalSelection::default();

    for path in paths {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_dir() {
            let name = utf8_name(path)?;
            if !is_hidden(name) {
                selection.files.push(LocalItem {
                    source: path.clone(),
                    target: RemotePath::root().join(name)?,
                    size: metadata.len(),
                });
            }
            continue;
        }

        let root = std::fs::canonicalize(path)?;
        let base = root.parent().unwrap_or(&root).to_path_buf();

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden_entry(entry));

        for entry in walker {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let target = relative_target(&base, entry.path())?;
            let item = LocalItem {
                source: entry.path().to_path_buf(),
                target,
                size: entry.metadata().map_err(|e| Error::Io(e.into()))?.len(),
            };
            if entry.file_type().is_dir() {
                selection.folders.push(item);
            } else if entry.file_type().is_file() {
                selection.files.push(item);
            }
        }
    }

    Ok(selection)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_hidden_entry(entry: &DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(is_hidden)
}

fn utf8_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("{} has no UTF-8 name", path.display())))
}

/// Components of `path` below `base`, joined with `/` whatever the platform.
fn relative_target(base: &Path, path: &Path) -> Result<RemotePath> {
    let relative = path.strip_prefix(base).map_err(|_| {
        Error::InvalidInput(format!("{} is outside {}", path.display(), base.display()))
    })?;

    let components = relative
        .components()
        .map(|c| {
            c.as_os_str().to_str().map(str::to_string).ok_or_else(|| {
                Error::InvalidInput(format!("{} has no UTF-8 name", path.display()))
            })
        })
        .collect::<Result<Vec<String>>>()?;
    RemotePath::from_components(components)
}
