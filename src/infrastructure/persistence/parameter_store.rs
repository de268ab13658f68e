//! File-backed store for the last accepted parameter set.
//!
//! Three files live side by side:
//! - `<name>.json`: the current accepted set, rewritten atomically
//! - `<name>.history.jsonl`: every accepted set, one JSON object per line
//! - `<name>.pending.json`: an accepted set whose propagation has not succeeded yet

use crate::domain::optimization::parameter_set::ParameterSet;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

pub struct ParameterStore {
    file_path: PathBuf,
    write_lock: Mutex<()>,
}

impl ParameterStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn pending_path(&self) -> PathBuf {
        self.file_path.with_extension("pending.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.file_path.with_extension("history.jsonl")
    }

    /// Loads the last accepted set, or the built-in default when none was saved.
    pub fn load(&self) -> Result<ParameterSet> {
        Ok(read_json(&self.file_path)?.unwrap_or_default())
    }

    /// Atomically replaces the accepted set and appends it to the history.
    ///
    /// Readers never observe a partial record: the content goes to a temp file
    /// in the same directory which is then renamed over the target.
    pub fn save(&self, params: &ParameterSet) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Parameter store lock poisoned"))?;

        write_atomic(&self.file_path, params)?;
        info!(
            "Saved parameters to {:?} (source={}, score={:.4})",
            self.file_path, params.source, params.score
        );

        // History is best effort; the current record is already durable.
        if let Err(e) = self.append_history(params) {
            warn!("Failed to append parameter history: {:#}", e);
        }
        Ok(())
    }

    fn append_history(&self, params: &ParameterSet) -> Result<()> {
        let line = serde_json::to_string(params).context("Failed to serialize parameters")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())
            .context("Failed to open parameter history")?;
        writeln!(file, "{}", line).context("Failed to append parameter history")?;
        Ok(())
    }

    pub fn save_pending(&self, params: &ParameterSet) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Parameter store lock poisoned"))?;
        write_atomic(&self.pending_path(), params)?;
        warn!("Parameters parked in pending slot {:?}", self.pending_path());
        Ok(())
    }

    pub fn load_pending(&self) -> Result<Option<ParameterSet>> {
        read_json(&self.pending_path())
    }

    pub fn clear_pending(&self) -> Result<()> {
        let path = self.pending_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Cleared pending parameters {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

fn read_json(path: &Path) -> Result<Option<ParameterSet>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let params = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(params))
}

fn write_atomic(path: &Path, params: &ParameterSet) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).context("Failed to create parameter directory")?;
    }
    let content =
        serde_json::to_string_pretty(params).context("Failed to serialize parameters")?;

    let temp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&temp_path).context("Failed to create temp file")?;
        file.write_all(content.as_bytes())
            .context("Failed to write temp file")?;
        file.sync_all().context("Failed to sync temp file")?;
    }
    fs::rename(&temp_path, path).context("Failed to rename temp file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_test_store() -> (ParameterStore, PathBuf) {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!(
            "autotune_test_{}_{}_store",
            std::process::id(),
            unique_id
        ));
        fs::create_dir_all(&temp_dir).expect("Failed to create test temp dir");
        (
            ParameterStore::new(temp_dir.join("current_parameters.json")),
            temp_dir,
        )
    }

    fn sample() -> ParameterSet {
        let mut parameters = BTreeMap::new();
        parameters.insert("target_r".to_string(), 2.31);
        parameters.insert("swing_len".to_string(), 4.0);
        ParameterSet::new(parameters, "weekly_auto_optimization", 3.2)
    }

    #[test]
    fn test_load_before_save_returns_default() {
        let (store, temp_dir) = create_test_store();
        assert_eq!(store.load().unwrap(), ParameterSet::default());
        fs::remove_dir_all(temp_dir).ok();
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (store, temp_dir) = create_test_store();
        let params = sample();
        store.save(&params).unwrap();
        assert_eq!(store.load().unwrap(), params);
        assert!(!store.path().with_extension("tmp").exists());
        fs::remove_dir_all(temp_dir).ok();
    }

    #[test]
    fn test_history_is_append_only() {
        let (store, temp_dir) = create_test_store();
        store.save(&sample()).unwrap();
        store.save(&sample()).unwrap();
        let history = fs::read_to_string(store.history_path()).unwrap();
        assert_eq!(history.lines().count(), 2);
        fs::remove_dir_all(temp_dir).ok();
    }

    #[test]
    fn test_pending_slot_lifecycle() {
        let (store, temp_dir) = create_test_store();
        assert!(store.load_pending().unwrap().is_none());

        let params = sample();
        store.save_pending(&params).unwrap();
        assert_eq!(store.load_pending().unwrap(), Some(params));

        store.clear_pending().unwrap();
        assert!(store.load_pending().unwrap().is_none());
        // Clearing twice is fine.
        store.clear_pending().unwrap();
        fs::remove_dir_all(temp_dir).ok();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let (store, temp_dir) = create_test_store();
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_err());
        fs::remove_dir_all(temp_dir).ok();
    }
}
