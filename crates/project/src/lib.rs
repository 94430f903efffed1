//! NeuroDraft 的專案持久層：磁碟配置、中繼資料與檔名整理。 / Project persistence for NeuroDraft: on-disk layout, metadata and name hygiene.

pub mod metadata;
pub mod names;
pub mod store;
pub mod util;

pub use metadata::{
    ProjectMetadata, ProjectSettings, WordTargets, DEFAULT_BACKUP_COUNT,
    DEFAULT_PROJECT_WORD_TARGET,
};
pub use names::{is_unique, safe_filename, suggest_alternative, validate_display_name, NameError};
pub use store::{ProjectError, ProjectStore, CHAPTER_EXTENSIONS};
pub use util::write_atomic;
