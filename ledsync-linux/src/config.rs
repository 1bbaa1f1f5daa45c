//! Load config from file and environment.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ledsync_core::SyncConfig;
use serde::Deserialize;

/// Daemon configuration. File: ~/.config/ledsync/config.toml or /etc/ledsync/config.toml.
/// Env overrides: LEDSYNC_PORT, LEDSYNC_SERIAL, LEDSYNC_STATE_PATH, LEDSYNC_TICK_MS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// UDP port shared by every device on the LAN (default 45680).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Interface address peers see us as. Auto-detected when unset.
    #[serde(default)]
    pub local_ip: Option<Ipv4Addr>,
    /// Provisioned serial number; device ID is random per run without one.
    #[serde(default)]
    pub serial: Option<String>,
    /// Where the sync mode is persisted.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Host loop period (default 20 ms).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Protocol timing.
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_port() -> u16 {
    45680
}
fn default_tick_ms() -> u64 {
    20
}
fn default_state_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(h) => PathBuf::from(h).join(".local/state/ledsync/mode.toml"),
        None => PathBuf::from("/var/lib/ledsync/mode.toml"),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            local_ip: None,
            serial: None,
            state_path: default_state_path(),
            tick_ms: default_tick_ms(),
            sync: SyncConfig::default(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_overrides(&mut c, |key| std::env::var(key).ok());
    c
}

/// Apply LEDSYNC_* overrides. Unparseable values are ignored.
pub fn apply_overrides(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(p) = var("LEDSYNC_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.port = p;
    }
    if let Some(s) = var("LEDSYNC_SERIAL") {
        c.serial = Some(s);
    }
    if let Some(p) = var("LEDSYNC_STATE_PATH") {
        c.state_path = PathBuf::from(p);
    }
    if let Some(t) = var("LEDSYNC_TICK_MS").and_then(|s| s.parse::<u64>().ok()) {
        if t > 0 {
            c.tick_ms = t;
        }
    }
}

pub fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/ledsync/config.toml"));
    }
    out.push(PathBuf::from("/etc/ledsync/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    read_file(&path)
}

fn read_file(path: &Path) -> Option<Config> {
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("failed to read {}: {}", path.display(), e);
            return None;
        }
    };
    match parse(&s) {
        Ok(c) => {
            tracing::info!("loaded config from {}", path.display());
            Some(c)
        }
        Err(e) => {
            tracing::warn!("ignoring invalid config {}: {}", path.display(), e);
            None
        }
    }
}
