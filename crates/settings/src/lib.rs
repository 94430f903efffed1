//! NeuroDraft 核心的持久化設定模組。 / Persistent configuration for the NeuroDraft core.

pub mod config;

pub use config::{
    AutoSaveConfig, ConfigError, ConfigStore, JsonConfigStore, MemoryConfigStore,
    DEFAULT_INTERVAL_SECONDS, DEFAULT_TYPING_PAUSE_SECONDS, KEY_ENABLED, KEY_INTERVAL,
    KEY_TYPING_PAUSE, MAX_INTERVAL_SECONDS, MAX_TYPING_PAUSE_SECONDS, MIN_INTERVAL_SECONDS,
    MIN_TYPING_PAUSE_SECONDS,
};
