use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use serde::Serialize;

use crate::error::TourError;
use crate::model::{CustomStyles, Project};
use crate::paths;

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Convert a name to a URL- and filename-safe slug.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    // Collapse multiple dashes
    let mut result = String::new();
    let mut last_dash = false;
    for c in slug.chars() {
        if c == '-' {
            if !last_dash && !result.is_empty() {
                result.push('-');
            }
            last_dash = true;
        } else {
            result.push(c);
            last_dash = false;
        }
    }
    while result.ends_with('-') {
        result.pop();
    }
    if result.is_empty() {
        "untitled".to_string()
    } else {
        result
    }
}

/// Per-file mutex map to serialize concurrent writes to the same path.
static FILE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Atomically write bytes to a file using write-to-temp-then-rename.
///
/// 1. Acquires a per-file mutex to prevent concurrent writes to the same path
/// 2. Writes data to a `.tmp` sibling file
/// 3. Calls `fsync` to flush to disk
/// 4. Renames the existing file to `.bak` (best-effort)
/// 5. Renames the `.tmp` file to the target path
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let lock = {
        let mut locks = FILE_LOCKS
            .lock()
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?;
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    };
    let _guard = lock
        .lock()
        .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Build sibling paths: foo.json → foo.json.tmp, foo.json.bak
    let file_name = path.file_name().unwrap_or_default();

    let mut tmp_name = OsString::from(file_name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(&tmp_name);

    let mut bak_name = OsString::from(file_name);
    bak_name.push(".bak");
    let bak_path = path.with_file_name(&bak_name);

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    // Backup existing file (best-effort, errors ignored)
    if path.exists() {
        let _ = fs::rename(path, &bak_path);
    }

    fs::rename(&tmp_path, path)?;

    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

// ── Key-value store ─────────────────────────────────────────────────

/// Local key-value store holding the authoring state. The project and the
/// style tree live under two independent keys.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One `<key>.json` file per entry in a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = paths::store_entry_path(&self.dir, key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        atomic_write(&paths::store_entry_path(&self.dir, key), value.as_bytes())
    }
}

/// In-memory store, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ── Save / Load ─────────────────────────────────────────────────────

pub fn save_project<S: KeyValueStore>(store: &mut S, project: &Project) -> Result<(), TourError> {
    let json = serde_json::to_string(project).map_err(StoreError::from)?;
    store.set(paths::PROJECT_KEY, &json)?;
    Ok(())
}

pub fn save_styles<S: KeyValueStore>(store: &mut S, styles: &CustomStyles) -> Result<(), TourError> {
    let json = serde_json::to_string(styles).map_err(StoreError::from)?;
    store.set(paths::STYLES_KEY, &json)?;
    Ok(())
}

/// Load the stored project, or `None` when the store has never been written.
/// A stored entry passes through the consistency passes on the way in.
pub fn load_project<S: KeyValueStore>(store: &S) -> Result<Option<Project>, TourError> {
    match store.get(paths::PROJECT_KEY)? {
        Some(json) => {
            let project = serde_json::from_str(&json).map_err(StoreError::from)?;
            Ok(Some(project))
        }
        None => Ok(None),
    }
}

/// Load the stored style tree. A missing or unreadable entry yields the
/// default theme; styles are cosmetic and never block opening a project.
pub fn load_styles<S: KeyValueStore>(store: &S) -> CustomStyles {
    match store.get(paths::STYLES_KEY) {
        Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
            log::warn!("Stored styles unreadable, using defaults: {e}");
            CustomStyles::default()
        }),
        Ok(None) => CustomStyles::default(),
        Err(e) => {
            log::warn!("Could not read stored styles, using defaults: {e}");
            CustomStyles::default()
        }
    }
}
