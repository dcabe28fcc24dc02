//! Folder layout and permissions shared by both stores
//!
//! ```text
//! <folder>/<namespace...>/<aggregateId>.json   event log (one JSON line per event)
//! <folder>/<namespace...>.json                 document collection (JSON array)
//! ```

use std::env;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::types::Namespace;

/// Permission for folders created by the stores
pub const DEFAULT_FOLDER_PERM: u32 = 0o777;

/// Permission for files created by the stores
pub const DEFAULT_FILE_PERM: u32 = 0o644;

/// Environment variable selecting the store root folder
pub const ENV_DIR: &str = "ES_FILESTORE_DIR";

/// Environment variable overriding the folder permission (octal)
pub const ENV_FOLDER_PERM: &str = "ES_FILESTORE_FOLDER_PERM";

/// Environment variable overriding the file permission (octal)
pub const ENV_FILE_PERM: &str = "ES_FILESTORE_FILE_PERM";

const DEFAULT_DIR: &str = "data";

/// Root folder plus the permissions used for everything created below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreBase {
    folder: PathBuf,
    folder_perm: u32,
    file_perm: u32,
}

impl StoreBase {
    /// Create a base rooted at `folder` with default permissions
    pub fn new<P: AsRef<Path>>(folder: P) -> Self {
        Self {
            folder: folder.as_ref().to_path_buf(),
            folder_perm: DEFAULT_FOLDER_PERM,
            file_perm: DEFAULT_FILE_PERM,
        }
    }

    /// Build a base from the environment
    ///
    /// `ES_FILESTORE_DIR` defaults to `data`; relative paths are resolved
    /// against the current directory. Unparsable permission values fall back
    /// to the defaults.
    pub fn from_env() -> Self {
        let current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let folder = match env::var(ENV_DIR) {
            Ok(path) if Path::new(&path).is_absolute() => PathBuf::from(path),
            Ok(path) => current_dir.join(path),
            Err(_) => current_dir.join(DEFAULT_DIR),
        };

        let folder_perm = parse_perm(ENV_FOLDER_PERM).unwrap_or(DEFAULT_FOLDER_PERM);
        let file_perm = parse_perm(ENV_FILE_PERM).unwrap_or(DEFAULT_FILE_PERM);

        Self::new(folder).with_permissions(folder_perm, file_perm)
    }

    /// Override folder and file permissions (Unix mode bits)
    pub fn with_permissions(mut self, folder_perm: u32, file_perm: u32) -> Self {
        self.folder_perm = folder_perm;
        self.file_perm = file_perm;
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn folder_perm(&self) -> u32 {
        self.folder_perm
    }

    pub fn file_perm(&self) -> u32 {
        self.file_perm
    }

    /// Folder holding the event logs of a namespace
    pub fn namespace_folder(&self, ns: &Namespace) -> PathBuf {
        ns.folder_in(&self.folder)
    }

    /// Event log of one aggregate
    pub fn aggregate_file(&self, ns: &Namespace, aggregate_id: Uuid) -> PathBuf {
        self.namespace_folder(ns).join(format!("{}.json", aggregate_id))
    }

    /// JSON array file of a namespace's document collection
    pub fn collection_file(&self, ns: &Namespace) -> PathBuf {
        let folder = self.namespace_folder(ns);
        let mut name = folder.into_os_string();
        name.push(".json");
        PathBuf::from(name)
    }

    /// Create `path` and its parents with the folder permission
    pub fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(self.folder_perm);
        }
        builder.create(path)
    }

    /// Create the parent folders of `file`
    pub fn create_parents(&self, file: &Path) -> io::Result<()> {
        match file.parent() {
            Some(parent) => self.create_dir_all(parent),
            None => Ok(()),
        }
    }

    /// Open `path` for appending, creating it with the file permission
    pub fn open_append(&self, path: &Path) -> io::Result<File> {
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        self.apply_file_perm(&mut options);
        options.open(path)
    }

    /// Create or truncate `path` for writing with the file permission
    pub fn create_file(&self, path: &Path) -> io::Result<File> {
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        self.apply_file_perm(&mut options);
        options.open(path)
    }

    /// Recursively delete `path`; a missing path is not an error
    pub fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        match fs::remove_dir_all(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    #[allow(unused_variables)]
    fn apply_file_perm(&self, options: &mut OpenOptions) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(self.file_perm);
        }
    }
}

impl Default for StoreBase {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Permission from an environment variable; an unparsable value is logged
fn parse_perm(var: &str) -> Option<u32> {
    let raw = env::var(var).ok()?;
    let perm = parse_octal(&raw);
    if perm.is_none() {
        warn!(var, value = %raw, "ignoring invalid permission, expected octal mode bits");
    }
    perm
}

fn parse_octal(raw: &str) -> Option<u32> {
    let digits = raw.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|perm| *perm <= 0o7777)
}
