use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::alerts::DEFAULT_THRESHOLDS;

const DEFAULT_POLL_SECONDS: u64 = 5;
const DEFAULT_ACTIVE_MINUTES: u64 = 60;
const DEFAULT_MAX_PROJECTS: usize = 10;
const DEFAULT_UI_REFRESH: Duration = Duration::from_secs(2);
const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_ALERT_TITLE: &str = "Claude Watch";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    pub schema_version: u32,
    pub alerts: AlertConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub sound: bool,
    pub voice: bool,
    pub thresholds: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub poll_interval: Duration,
    pub ui_refresh: Duration,
    pub active_window: Duration,
    pub max_projects: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            alerts: AlertConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: true,
            voice: true,
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_ALERT_TITLE.to_string(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECONDS),
            ui_refresh: DEFAULT_UI_REFRESH,
            active_window: Duration::from_secs(DEFAULT_ACTIVE_MINUTES * 60),
            max_projects: DEFAULT_MAX_PROJECTS,
        }
    }
}

impl WatchConfig {
    /// Read the config file, writing defaults on first run and persisting any
    /// normalization applied to an older or hand-edited file.
    pub fn load_or_init() -> Result<Self> {
        Self::load_or_init_at(&config_path())
    }

    fn load_or_init_at(path: &Path) -> Result<Self> {
        if !path.exists() {
            let fresh = Self::default();
            fresh.save_to(path)?;
            return Ok(fresh);
        }

        let raw = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        let mut cfg: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("{} is not a valid watch config", path.display()))?;
        if cfg.normalize_and_migrate() {
            cfg.save_to(path)?;
        }
        Ok(cfg)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
        }
        let mut body = serde_json::to_vec_pretty(self)?;
        body.push(b'\n');
        fs::write(path, body).with_context(|| format!("cannot write {}", path.display()))
    }

    /// Returns whether anything was rewritten.
    fn normalize_and_migrate(&mut self) -> bool {
        let migrated = self.schema_version < CONFIG_SCHEMA_VERSION;
        self.schema_version = self.schema_version.max(CONFIG_SCHEMA_VERSION);

        let title = match self.display.title.trim() {
            "" => DEFAULT_ALERT_TITLE.to_string(),
            trimmed => trimmed.to_string(),
        };
        let retitled = title != self.display.title;
        self.display.title = title;

        let thresholds_fixed = normalize_thresholds(&mut self.alerts.thresholds);
        migrated || retitled || thresholds_fixed
    }
}

/// Sort ascending, drop duplicates and values outside `1..=100`. An empty
/// result falls back to the defaults.
fn normalize_thresholds(thresholds: &mut Vec<u8>) -> bool {
    let mut normalized: Vec<u8> = thresholds
        .iter()
        .copied()
        .filter(|value| (1..=100).contains(value))
        .collect();
    normalized.sort_unstable();
    normalized.dedup();
    if normalized.is_empty() {
        normalized = DEFAULT_THRESHOLDS.to_vec();
    }

    if *thresholds != normalized {
        *thresholds = normalized;
        return true;
    }
    false
}

pub fn runtime_settings() -> RuntimeSettings {
    let defaults = RuntimeSettings::default();
    RuntimeSettings {
        poll_interval: Duration::from_secs(env_u64(
            "CLAUDE_WATCH_POLL_SECONDS",
            DEFAULT_POLL_SECONDS,
        )),
        active_window: Duration::from_secs(
            env_u64("CLAUDE_WATCH_ACTIVE_MINUTES", DEFAULT_ACTIVE_MINUTES).saturating_mul(60),
        ),
        max_projects: usize::try_from(env_u64(
            "CLAUDE_WATCH_MAX_PROJECTS",
            DEFAULT_MAX_PROJECTS as u64,
        ))
        .unwrap_or(DEFAULT_MAX_PROJECTS),
        ..defaults
    }
}

pub fn claude_home() -> PathBuf {
    if let Ok(custom) = env::var("CLAUDE_CONFIG_DIR") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
}

pub fn projects_path() -> PathBuf {
    claude_home().join("projects")
}

pub fn config_path() -> PathBuf {
    claude_home().join("context-watch-config.json")
}

pub fn lock_path() -> PathBuf {
    claude_home().join("context-watch.lock")
}

/// Positive integer from the environment; anything else means `default`.
fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name).map(|raw| raw.trim().parse::<u64>()) {
        Ok(Ok(value)) if value > 0 => value,
        _ => default,
    }
}
