//! Writing step outputs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::traits::TransformError;

/// A fully transformed file waiting to be written.
#[derive(Debug, Clone)]
pub struct Pending {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl Pending {
    pub fn new(path: PathBuf, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path,
            contents: contents.into(),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write `contents` to the temporary sibling of `path`, creating parents.
fn stage(path: &Path, contents: &[u8]) -> Result<PathBuf, TransformError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TransformError::io(parent, e))?;
    }

    let tmp = tmp_path(path);
    fs::write(&tmp, contents).map_err(|e| TransformError::io(&tmp, e))?;
    Ok(tmp)
}

/// Write a file through a temporary sibling and rename it into place.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), TransformError> {
    let tmp = stage(path, contents)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        TransformError::io(path, e)
    })
}

/// Write every pending file, returning the written paths.
///
/// All temporary files are written before any is renamed, so a failure while
/// writing leaves the destination untouched. Only a failing rename can leave
/// a partial update behind.
pub fn write_all(pending: Vec<Pending>) -> Result<Vec<PathBuf>, TransformError> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(pending.len());
    for file in pending {
        match stage(&file.path, &file.contents) {
            Ok(tmp) => staged.push((tmp, file.path)),
            Err(e) => {
                for (tmp, _) in &staged {
                    let _ = fs::remove_file(tmp);
                }
                return Err(e);
            }
        }
    }

    let mut written = Vec::with_capacity(staged.len());
    let mut renames = staged.into_iter();
    while let Some((tmp, path)) = renames.next() {
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            for (rest, _) in renames {
                let _ = fs::remove_file(rest);
            }
            return Err(TransformError::io(&path, e));
        }
        written.push(path);
    }
    Ok(written)
}

/// `main.css` -> `main.css.map`.
pub(crate) fn with_map_suffix(path: &Path) -> PathBuf {
    let mut map = path.as_os_str().to_owned();
    map.push(".map");
    PathBuf::from(map)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Path of `target` relative to the directory `from`, both absolute.
pub(crate) fn relative_path(from: &Path, target: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let target: Vec<_> = target.components().collect();
    let common = from
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for part in &target[common..] {
        out.push(part);
    }
    out
}

/// Whether `dest` exists and was modified no earlier than `source`.
pub fn is_up_to_date(source: &Path, dest: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified());

    match (modified(source), modified(dest)) {
        (Ok(src), Ok(dst)) => dst >= src,
        _ => false,
    }
}

/// Read a source file.
pub(crate) fn read(path: &Path) -> Result<Vec<u8>, TransformError> {
    fs::read(path).map_err(|e| TransformError::io(path, e))
}

/// Read a source file as UTF-8 text.
pub(crate) fn read_to_string(path: &Path) -> Result<String, TransformError> {
    fs::read_to_string(path).map_err(|e| TransformError::io(path, e))
}
