use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persistent keys used by the auto-save configuration.
pub const KEY_ENABLED: &str = "AutoSave.enabled";
pub const KEY_INTERVAL: &str = "AutoSave.interval";
pub const KEY_TYPING_PAUSE: &str = "AutoSave.typingPause";

pub const DEFAULT_INTERVAL_SECONDS: u32 = 300;
pub const MIN_INTERVAL_SECONDS: u32 = 60;
pub const MAX_INTERVAL_SECONDS: u32 = 3600;

pub const DEFAULT_TYPING_PAUSE_SECONDS: u32 = 10;
pub const MIN_TYPING_PAUSE_SECONDS: u32 = 5;
pub const MAX_TYPING_PAUSE_SECONDS: u32 = 60;

/// 讀寫設定狀態時可能發生的錯誤。 / Errors raised while reading or writing configuration state.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write configuration {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 由宿主提供的鍵值設定存放介面。 / Host-provided key-value store for persistent settings.
pub trait ConfigStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError>;
}

/// Auto-save behaviour settings, sanitized to their legal ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval")]
    pub interval_seconds: u32,
    #[serde(default = "default_typing_pause")]
    pub typing_pause_seconds: u32,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u32 {
    DEFAULT_INTERVAL_SECONDS
}

fn default_typing_pause() -> u32 {
    DEFAULT_TYPING_PAUSE_SECONDS
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            typing_pause_seconds: DEFAULT_TYPING_PAUSE_SECONDS,
        }
    }
}

impl AutoSaveConfig {
    /// Clamps out-of-range values back to their defaults or bounds.
    pub fn sanitize(&mut self) {
        if self.interval_seconds < MIN_INTERVAL_SECONDS
            || self.interval_seconds > MAX_INTERVAL_SECONDS
        {
            self.interval_seconds = self
                .interval_seconds
                .clamp(MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS);
        }
        if self.typing_pause_seconds < MIN_TYPING_PAUSE_SECONDS
            || self.typing_pause_seconds > MAX_TYPING_PAUSE_SECONDS
        {
            self.typing_pause_seconds = self
                .typing_pause_seconds
                .clamp(MIN_TYPING_PAUSE_SECONDS, MAX_TYPING_PAUSE_SECONDS);
        }
    }

    /// 從存放區載入設定；缺少的鍵使用預設值。 / Loads the configuration from a store; absent keys fall back to defaults.
    pub fn load(store: &dyn ConfigStore) -> Self {
        let mut config = Self::default();
        if let Some(value) = store.get(KEY_ENABLED) {
            if let Ok(parsed) = value.parse::<bool>() {
                config.enabled = parsed;
            }
        }
        if let Some(value) = store.get(KEY_INTERVAL) {
            if let Ok(parsed) = value.parse::<u32>() {
                config.interval_seconds = parsed;
            }
        }
        if let Some(value) = store.get(KEY_TYPING_PAUSE) {
            if let Ok(parsed) = value.parse::<u32>() {
                config.typing_pause_seconds = parsed;
            }
        }
        config.sanitize();
        config
    }

    /// Writes all three keys back to the store.
    pub fn persist(&self, store: &mut dyn ConfigStore) -> Result<(), ConfigError> {
        store.set(KEY_ENABLED, &self.enabled.to_string())?;
        store.set(KEY_INTERVAL, &self.interval_seconds.to_string())?;
        store.set(KEY_TYPING_PAUSE, &self.typing_pause_seconds.to_string())?;
        Ok(())
    }
}

/// 以單一 JSON 物件儲存設定的檔案型存放區。 / File-backed `ConfigStore` holding a flat JSON object of string values.
#[derive(Debug)]
pub struct JsonConfigStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonConfigStore {
    /// Loads the store from disk; a missing file yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let payload = serde_json::to_string_pretty(&self.values).map_err(|source| {
            ConfigError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, payload.as_bytes()).map_err(|source| ConfigError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }
}

/// In-memory store for hosts that manage persistence themselves.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: BTreeMap<String, String>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
