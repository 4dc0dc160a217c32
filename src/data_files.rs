use std::path::{Path, PathBuf};

use crate::errors::LoaderError;

/// Find `file_name` in `dir` plus every `<stem>_*.<ext>` sibling, e.g.
/// `security_roles.yaml` and `security_roles_billing.yaml`.
///
/// The primary file comes first, then the siblings in lexical order. A missing
/// directory yields no files.
pub fn discover(dir: &Path, file_name: &str) -> Result<Vec<PathBuf>, LoaderError> {
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "Data directory does not exist");
        return Ok(Vec::new());
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (file_name, None),
    };
    let prefix = format!("{stem}_");

    let mut files = Vec::new();
    let primary = dir.join(file_name);
    if primary.is_file() {
        files.push(primary);
    }

    let mut siblings: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            let ext_matches = match ext {
                Some(ext) => path.extension().map(|e| e == ext).unwrap_or(false),
                None => true,
            };
            name.starts_with(&prefix) && ext_matches
        })
        .collect();
    siblings.sort();
    files.extend(siblings);

    Ok(files)
}

/// Read every file into memory, in order.
pub fn read_all(paths: &[PathBuf]) -> Result<Vec<String>, LoaderError> {
    paths
        .iter()
        .map(|path| {
            std::fs::read_to_string(path).map_err(|source| LoaderError::FileLoad {
                path: path.display().to_string(),
                source,
            })
        })
        .collect()
}
