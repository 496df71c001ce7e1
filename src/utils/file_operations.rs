use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileOperationError {
    #[error("Source does not exist: {0}")]
    SourceMissing(PathBuf),
    #[error("Target is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Cannot copy {0} into itself")]
    IntoItself(PathBuf),
    #[error("No free name for {0}")]
    NoFreeName(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Highest numbered "- Copy (n)" suffix tried before giving up
const MAX_COPY_SUFFIX: u32 = 1000;

pub trait FileOperations: Send + Sync {
    /// Copy a file or directory into `target_dir`. Returns the new path.
    fn copy_item(&self, source: &Path, target_dir: &Path) -> Result<PathBuf, FileOperationError>;
}

/// Copies on the local filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileOperations;

impl FileOperations for LocalFileOperations {
    fn copy_item(&self, source: &Path, target_dir: &Path) -> Result<PathBuf, FileOperationError> {
        if !source.exists() {
            return Err(FileOperationError::SourceMissing(source.to_path_buf()));
        }
        if !target_dir.is_dir() {
            return Err(FileOperationError::NotADirectory(target_dir.to_path_buf()));
        }
        if source.is_dir() && target_dir.starts_with(source) {
            return Err(FileOperationError::IntoItself(source.to_path_buf()));
        }

        let destination = free_destination(source, target_dir)?;
        if source.is_dir() {
            copy_dir_recursive(source, &destination)?;
        } else {
            fs::copy(source, &destination)?;
        }
        tracing::debug!(source = %source.display(), destination = %destination.display(), "Item copied");
        Ok(destination)
    }
}

/// `target_dir/name`, or the first free "name - Copy", "name - Copy (2)", ...
fn free_destination(source: &Path, target_dir: &Path) -> Result<PathBuf, FileOperationError> {
    let file_name = source
        .file_name()
        .ok_or_else(|| FileOperationError::SourceMissing(source.to_path_buf()))?;
    let candidate = target_dir.join(file_name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    // Directories and dotfiles keep their whole name as the stem
    let (stem, extension) = match (source.is_dir(), source.file_stem(), source.extension()) {
        (false, Some(stem), Some(extension)) => (
            stem.to_string_lossy().into_owned(),
            format!(".{}", extension.to_string_lossy()),
        ),
        _ => (file_name.to_string_lossy().into_owned(), String::new()),
    };

    (1..=MAX_COPY_SUFFIX)
        .map(|n| match n {
            1 => target_dir.join(format!("{stem} - Copy{extension}")),
            n => target_dir.join(format!("{stem} - Copy ({n}){extension}")),
        })
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| FileOperationError::NoFreeName(candidate))
}

fn copy_dir_recursive(source: &Path, destination: &Path) -> std::io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
