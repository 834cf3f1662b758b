use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::blocker::{EngineError, LimitStore};
use crate::config;

/// Package to daily-limit table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitsTable {
    limits: BTreeMap<String, u32>,
}

impl LimitsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, package: impl Into<String>, limit_minutes: u32) {
        self.limits.insert(package.into(), limit_minutes);
    }

    pub fn get(&self, package: &str) -> Option<u32> {
        self.limits.get(package).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.limits.iter().map(|(p, l)| (p.as_str(), *l))
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

impl FromIterator<(String, u32)> for LimitsTable {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self {
            limits: iter.into_iter().collect(),
        }
    }
}

impl LimitStore for LimitsTable {
    fn selected_packages(&self) -> Result<BTreeSet<String>, EngineError> {
        Ok(self.limits.keys().cloned().collect())
    }

    fn limit(&self, package: &str) -> Result<Option<u32>, EngineError> {
        Ok(self.get(package))
    }
}

/// Identifies one version of the file on disk
type FileStamp = (SystemTime, u64);

#[derive(Default)]
struct Cached {
    stamp: Option<FileStamp>,
    table: Option<LimitsTable>,
}

/// Limit store backed by the config file.
///
/// The file is re-read whenever its modification time or size changes, so
/// edits apply on the next tick. A file that fails to parse keeps the last
/// good table in place.
pub struct FileLimitStore {
    path: PathBuf,
    cache: Mutex<Cached>,
}

impl FileLimitStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(Cached::default()),
        }
    }

    /// Start from an already loaded table
    pub fn with_table(path: impl Into<PathBuf>, table: LimitsTable) -> Self {
        let path = path.into();
        let stamp = file_stamp(&path).ok();
        Self {
            path,
            cache: Mutex::new(Cached {
                stamp,
                table: Some(table),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current table, reloading it first if the file changed
    pub fn table(&self) -> Result<LimitsTable, EngineError> {
        let stamp = file_stamp(&self.path).map_err(|e| {
            EngineError::LimitStoreUnavailable(format!("{}: {}", self.path.display(), e))
        })?;

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| EngineError::LimitStoreUnavailable("cache lock poisoned".to_string()))?;

        if cache.stamp != Some(stamp) {
            cache.stamp = Some(stamp);
            match config::load_config(&self.path) {
                Ok(config) => {
                    let table = config.limits_table();
                    if cache.table.is_some() {
                        info!("Reloaded {} app limits from {}", table.len(), self.path.display());
                    } else {
                        debug!("Loaded {} app limits from {}", table.len(), self.path.display());
                    }
                    cache.table = Some(table);
                }
                Err(e) => {
                    warn!("Failed to reload limits, keeping previous ones: {:#}", e);
                }
            }
        }

        cache.table.clone().ok_or_else(|| {
            EngineError::LimitStoreUnavailable(format!(
                "no valid limits loaded from {}",
                self.path.display()
            ))
        })
    }
}

fn file_stamp(path: &Path) -> std::io::Result<FileStamp> {
    let metadata = std::fs::metadata(path)?;
    Ok((metadata.modified()?, metadata.len()))
}

impl LimitStore for FileLimitStore {
    fn selected_packages(&self) -> Result<BTreeSet<String>, EngineError> {
        self.table()?.selected_packages()
    }

    fn limit(&self, package: &str) -> Result<Option<u32>, EngineError> {
        Ok(self.table()?.get(package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CONFIG: &str = r#"
[[apps]]
package = "com.example.social"
limit_minutes = 30
"#;

    #[test]
    fn test_limits_table_as_store() {
        let mut table = LimitsTable::new();
        table.insert("com.example.social", 30);
        table.insert("com.example.video", 0);

        let selected = table.selected_packages().unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(table.limit("com.example.social").unwrap(), Some(30));
        assert_eq!(table.limit("com.example.video").unwrap(), Some(0));
        assert_eq!(table.limit("com.example.mail").unwrap(), None);
    }

    #[test]
    fn test_file_store_loads_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, CONFIG).unwrap();

        let store = FileLimitStore::new(&path);
        assert_eq!(store.limit("com.example.social").unwrap(), Some(30));
        assert!(store.selected_packages().unwrap().contains("com.example.social"));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLimitStore::new(dir.path().join("missing.toml"));

        let err = store.selected_packages().unwrap_err();
        assert!(matches!(err, EngineError::LimitStoreUnavailable(_)));
    }

    #[test]
    fn test_invalid_edit_keeps_last_good_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, CONFIG).unwrap();

        let store = FileLimitStore::new(&path);
        assert_eq!(store.limit("com.example.social").unwrap(), Some(30));

        fs::write(&path, "[[apps]]\npackage = \n").unwrap();
        assert_eq!(store.limit("com.example.social").unwrap(), Some(30));
    }

    #[test]
    fn test_invalid_file_without_previous_table_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "not toml at all [").unwrap();

        let store = FileLimitStore::new(&path);
        assert!(store.limit("com.example.social").is_err());
    }
}
