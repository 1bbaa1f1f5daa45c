//! Sync mode persistence: a one-key TOML file.

use std::path::PathBuf;

use ledsync_core::{ModeStore, StoreError, SyncMode};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct ModeFile {
    mode: SyncMode,
}

pub struct FileModeStore {
    path: PathBuf,
}

impl FileModeStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ModeStore for FileModeStore {
    fn load(&mut self) -> Result<Option<SyncMode>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let s = std::fs::read_to_string(&self.path)?;
        let file: ModeFile =
            toml::from_str(&s).map_err(|e| StoreError::Invalid(e.to_string()))?;
        Ok(Some(file.mode))
    }

    fn save(&mut self, mode: SyncMode) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let s = toml::to_string(&ModeFile { mode })
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        std::fs::write(&self.path, s)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileModeStore::new(dir.path().join("mode.toml"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_then_load_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/mode.toml");
        FileModeStore::new(path.clone())
            .save(SyncMode::Host)
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim(),
            "mode = \"host\""
        );
        let mut reopened = FileModeStore::new(path);
        assert_eq!(reopened.load().unwrap(), Some(SyncMode::Host));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mode.toml");
        std::fs::write(&path, "mode = \"leader\"").unwrap();
        let mut store = FileModeStore::new(path);
        assert!(matches!(store.load(), Err(StoreError::Invalid(_))));
    }
}
