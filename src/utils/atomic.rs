//! Atomic file operations
//!
//! Collection files are rewritten wholesale on every mutation. To keep a
//! crash from leaving a truncated file behind, every rewrite follows the
//! same pattern:
//!
//! 1. Write to a temporary sibling file (`<name>.tmp`)
//! 2. Call sync_all() to flush to disk
//! 3. Rename the temp file over the final path (atomic on most filesystems)
//!
//! The final file is therefore either the old version or the new version,
//! never a partial one.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::base::StoreBase;

const TEMP_SUFFIX: &str = ".tmp";

/// Temp file used while rewriting `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Atomically replace `path` with `content`
pub fn atomic_write<P: AsRef<Path>>(base: &StoreBase, path: P, content: &[u8]) -> io::Result<()> {
    atomic_write_with(base, path, |writer| writer.write_all(content))
}

/// Atomically replace `path` with whatever `write_fn` produces
///
/// Parent folders are created with the base's folder permission and the
/// file with its file permission. On failure the temp file is removed and
/// the previous content of `path` is untouched.
pub fn atomic_write_with<P, F>(base: &StoreBase, path: P, write_fn: F) -> io::Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let path = path.as_ref();
    let temp_path = temp_path(path);

    base.create_parents(path)?;

    let result = (|| {
        let mut writer = BufWriter::new(base.create_file(&temp_path)?);
        write_fn(&mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Remove leftover temp files below `dir` (recursively)
///
/// Returns the number of files removed. A missing `dir` counts as clean.
pub fn cleanup_temp_files<P: AsRef<Path>>(dir: P) -> io::Result<usize> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(0);
    }

    let mut cleaned = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if entry.file_type()?.is_dir() {
            cleaned += cleanup_temp_files(&path)?;
        } else if path
            .file_name()
            .map(|name| name.to_string_lossy().ends_with(TEMP_SUFFIX))
            .unwrap_or(false)
        {
            fs::remove_file(&path)?;
            cleaned += 1;
        }
    }

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let base = StoreBase::new(temp_dir.path());
        let path = temp_dir.path().join("orders.json");

        atomic_write(&base, &path, b"[]").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let base = StoreBase::new(temp_dir.path());
        let path = temp_dir.path().join("orders.json");

        atomic_write(&base, &path, b"[1, 2, 3]").unwrap();
        atomic_write(&base, &path, b"[4]").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[4]");
    }

    #[test]
    fn test_failed_write_keeps_old_content() {
        let temp_dir = TempDir::new().unwrap();
        let base = StoreBase::new(temp_dir.path());
        let path = temp_dir.path().join("orders.json");
        atomic_write(&base, &path, b"old").unwrap();

        let result = atomic_write_with(&base, &path, |writer| {
            writer.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let base = StoreBase::new(temp_dir.path());
        let path = temp_dir.path().join("app").join("nested").join("orders.json");

        atomic_write(&base, &path, b"nested").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "nested");
    }

    #[test]
    fn test_temp_path_keeps_extension() {
        assert_eq!(
            temp_path(Path::new("/data/orders.v1.json")),
            PathBuf::from("/data/orders.v1.json.tmp")
        );
    }

    #[test]
    fn test_cleanup_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("app");
        fs::create_dir_all(&nested).unwrap();

        fs::write(temp_dir.path().join("a.json.tmp"), "temp1").unwrap();
        fs::write(nested.join("b.json.tmp"), "temp2").unwrap();
        fs::write(nested.join("keep.json"), "keep").unwrap();

        let cleaned = cleanup_temp_files(temp_dir.path()).unwrap();
        assert_eq!(cleaned, 2);

        assert!(!temp_dir.path().join("a.json.tmp").exists());
        assert!(!nested.join("b.json.tmp").exists());
        assert!(nested.join("keep.json").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(cleanup_temp_files(temp_dir.path().join("missing")).unwrap(), 0);
    }
}
