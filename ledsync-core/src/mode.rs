//! Persisted top-level sync policy and its storage seam.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Top-level behavior: stay alone, follow the first group found, or host a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Solo,
    Join,
    Host,
}

impl SyncMode {
    pub fn as_u8(self) -> u8 {
        match self {
            SyncMode::Solo => 0,
            SyncMode::Join => 1,
            SyncMode::Host => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SyncMode::Solo),
            1 => Some(SyncMode::Join),
            2 => Some(SyncMode::Host),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Solo => "solo",
            SyncMode::Join => "join",
            SyncMode::Host => "host",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown sync mode {0:?} (expected solo, join or host)")]
pub struct UnknownSyncMode(pub String);

impl FromStr for SyncMode {
    type Err = UnknownSyncMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solo" => Ok(SyncMode::Solo),
            "join" => Ok(SyncMode::Join),
            "host" => Ok(SyncMode::Host),
            _ => Err(UnknownSyncMode(s.to_string())),
        }
    }
}

/// Key-value persistence for the sync mode. Only the mode survives a restart.
pub trait ModeStore: Send {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&mut self) -> Result<Option<SyncMode>, StoreError>;
    fn save(&mut self, mode: SyncMode) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored mode is invalid: {0}")]
    Invalid(String),
}

/// Volatile store for tests and hosts that persist the mode themselves.
#[derive(Debug, Default)]
pub struct MemoryModeStore {
    mode: Option<SyncMode>,
}

impl MemoryModeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: SyncMode) -> Self {
        Self { mode: Some(mode) }
    }
}

impl ModeStore for MemoryModeStore {
    fn load(&mut self) -> Result<Option<SyncMode>, StoreError> {
        Ok(self.mode)
    }

    fn save(&mut self, mode: SyncMode) -> Result<(), StoreError> {
        self.mode = Some(mode);
        Ok(())
    }
}
