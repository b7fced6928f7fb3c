//! Filesystem helpers shared by the controllers.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::LifecycleError;
use crate::naming::staging_path;

/// Write `bytes` to `path` via a synced temporary sibling and a rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), LifecycleError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|error| LifecycleError::io(parent, error))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();
    if let Err(error) = result {
        let _ = fs::remove_file(&temp);
        return Err(LifecycleError::io(path, error));
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), LifecycleError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    atomic_write(path, &bytes)
}

/// Copy `source` to `target` through a staging file and verify the result.
///
/// Returns the number of bytes copied.
pub fn copy_verified(source: &Path, target: &Path) -> Result<u64, LifecycleError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|error| LifecycleError::io(parent, error))?;
    }
    let staging = staging_path(target);
    let expected = file_size(source).ok_or_else(|| {
        LifecycleError::io(source, std::io::Error::from(std::io::ErrorKind::NotFound))
    })?;

    let copied = (|| -> std::io::Result<u64> {
        fs::copy(source, &staging)?;
        let file = fs::File::open(&staging)?;
        file.sync_all()?;
        Ok(file.metadata()?.len())
    })();
    let copied = match copied {
        Ok(copied) => copied,
        Err(error) => {
            let _ = fs::remove_file(&staging);
            return Err(LifecycleError::io(target, error));
        }
    };
    if copied == 0 || copied != expected {
        let _ = fs::remove_file(&staging);
        return Err(LifecycleError::Backup {
            path: target.to_path_buf(),
            detail: format!("copy holds {copied} bytes, source holds {expected}"),
        });
    }
    if let Err(error) = fs::rename(&staging, target) {
        let _ = fs::remove_file(&staging);
        return Err(LifecycleError::io(target, error));
    }
    Ok(copied)
}

/// Move a file, falling back to copy and delete across filesystems.
pub fn move_file(source: &Path, target: &Path) -> Result<(), LifecycleError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|error| LifecycleError::io(parent, error))?;
    }
    if fs::rename(source, target).is_ok() {
        return Ok(());
    }
    copy_verified(source, target)?;
    fs::remove_file(source).map_err(|error| LifecycleError::io(source, error))
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(fs::Metadata::is_file)
        .map(|metadata| metadata.len())
}

pub fn remove_if_exists(path: &Path) -> Result<bool, LifecycleError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(LifecycleError::io(path, error)),
    }
}

/// Regular files under `root` whose basename satisfies `select`, sorted by path.
///
/// Symlinks and dot-directories are not followed.
pub fn collect_files(
    root: &Path,
    select: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>, LifecycleError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|error| LifecycleError::io(&dir, error))?;
        for entry in entries {
            let entry = entry.map_err(|error| LifecycleError::io(&dir, error))?;
            let file_type = entry
                .file_type()
                .map_err(|error| LifecycleError::io(entry.path(), error))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if file_type.is_dir() {
                if !name.starts_with('.') {
                    pending.push(entry.path());
                }
            } else if file_type.is_file() && select(&name) {
                found.push(entry.path());
            }
        }
    }
    found.sort();
    Ok(found)
}
