//! NeuroDraft 的章節結構層：解析、備份與重新編號引擎。 / Chapter structure for NeuroDraft: parsing, backups and the renumbering engine that keeps filenames, headers and anchors in agreement.

pub mod backup;
pub mod parser;
pub mod update;

pub use backup::{create_backup, latest_backup, BACKUP_SUFFIX, MAX_BACKUPS};
pub use parser::{
    canonical_file_name, chapter_number_from_filename, parse_chapter, parse_chapter_text,
    scan_chapters, slug, subsection_anchor, ChapterInfo, ParseError, SubsectionInfo,
};
pub use update::{UpdateError, UpdateManager};
