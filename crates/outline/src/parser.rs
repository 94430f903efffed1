use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use neurodraft_project::CHAPTER_EXTENSIONS;

static CHAPTER_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#\s+(.+)$").expect("valid chapter header regex"));
static SUBSECTION_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^##\s+(.+)$").expect("valid subsection header regex"));
static FILENAME_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^chapter_(\d+)\.").expect("valid chapter filename regex"));
static CHAPTER_TITLE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Chapter\s+(\d+)\s*:\s*(.*)$").expect("valid title prefix regex"));
static SUBSECTION_TITLE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.(\d+)\s*:\s*(.*)$").expect("valid subsection prefix regex"));
static SLUG_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

/// One `##` header inside a chapter.
///
/// `number` is the canonical 1-based position in file order; `written` holds
/// the `N.M` pair literally present in the header text, if any, so callers
/// can reconstruct the anchor the file currently advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsectionInfo {
    pub chapter: u32,
    pub number: u32,
    pub title: String,
    pub anchor: String,
    pub line: usize,
    pub written: Option<(u32, u32)>,
}

impl SubsectionInfo {
    /// The anchor the file text currently encodes, when the header carries
    /// explicit numbering.
    pub fn written_anchor(&self) -> Option<String> {
        self.written
            .map(|(chapter, number)| subsection_anchor(chapter, number, &self.title))
    }
}

/// 單一章節檔案的解析結果。 / Parse result for one chapter file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub number: u32,
    pub title: String,
    pub subsections: Vec<SubsectionInfo>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("chapters directory not found: {0}")]
    MissingChaptersDir(PathBuf),
}

/// Chapter number encoded in a `chapter_NN.ext` filename.
pub fn chapter_number_from_filename(file_name: &str) -> Option<u32> {
    FILENAME_NUMBER
        .captures(file_name)
        .and_then(|cap| cap[1].parse().ok())
}

/// Canonical filename for a chapter number: `chapter_NN.md`, zero-padded
/// to width 2.
pub fn canonical_file_name(number: u32) -> String {
    format!("chapter_{number:02}.md")
}

/// Lowercases and reduces a title to `[a-z0-9-]`, collapsing every other
/// run to a single `-` and trimming the ends.
pub fn slug(title: &str) -> String {
    let lowered = title.to_lowercase();
    let dashed = SLUG_INVALID.replace_all(&lowered, "-");
    dashed.trim_matches('-').to_string()
}

/// Stable cross-reference identifier for a subsection.
pub fn subsection_anchor(chapter: u32, number: u32, title: &str) -> String {
    format!("{chapter}-{number}-{}", slug(title))
}

/// Strips a canonical `Chapter N:` prefix from a chapter header, returning
/// the number found (if any) and the bare title. Keeps header rewrites
/// idempotent.
pub fn strip_chapter_prefix(raw: &str) -> (Option<u32>, String) {
    if let Some(cap) = CHAPTER_TITLE_PREFIX.captures(raw) {
        let number = cap[1].parse().ok();
        let title = cap[2].trim().to_string();
        if !title.is_empty() {
            return (number, title);
        }
    }
    (None, raw.trim().to_string())
}

/// Strips a canonical `N.M:` prefix from a subsection header.
pub fn strip_subsection_prefix(raw: &str) -> (Option<(u32, u32)>, String) {
    if let Some(cap) = SUBSECTION_TITLE_PREFIX.captures(raw) {
        let chapter = cap[1].parse().ok();
        let number = cap[2].parse().ok();
        let title = cap[3].trim().to_string();
        if let (Some(chapter), Some(number)) = (chapter, number) {
            if !title.is_empty() {
                return (Some((chapter, number)), title);
            }
        }
    }
    (None, raw.trim().to_string())
}

/// Parses chapter structure out of text. Headers whose text trims to
/// nothing are ignored; a missing `#` header falls back to the filename
/// stem; subsection numbering is positional regardless of what the header
/// text claims.
pub fn parse_chapter_text(file_name: &str, content: &str) -> ChapterInfo {
    let number = chapter_number_from_filename(file_name).unwrap_or(1);
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);

    let mut title: Option<String> = None;
    let mut subsections = Vec::new();
    for (line_index, line) in content.lines().enumerate() {
        if let Some(cap) = SUBSECTION_HEADER.captures(line) {
            let raw = cap[1].trim();
            if raw.is_empty() {
                continue;
            }
            let (written, sub_title) = strip_subsection_prefix(raw);
            let position = subsections.len() as u32 + 1;
            subsections.push(SubsectionInfo {
                chapter: number,
                number: position,
                anchor: subsection_anchor(number, position, &sub_title),
                title: sub_title,
                line: line_index,
                written,
            });
        } else if title.is_none() {
            if let Some(cap) = CHAPTER_HEADER.captures(line) {
                let raw = cap[1].trim();
                if !raw.is_empty() {
                    let (_, bare) = strip_chapter_prefix(raw);
                    title = Some(bare);
                }
            }
        }
    }

    ChapterInfo {
        path: PathBuf::new(),
        file_name: file_name.to_string(),
        number,
        title: title.unwrap_or_else(|| stem.to_string()),
        subsections,
    }
}

/// Reads and parses one chapter file.
pub fn parse_chapter(path: &Path) -> Result<ChapterInfo, ParseError> {
    let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let mut info = parse_chapter_text(file_name, &content);
    info.path = path.to_path_buf();
    Ok(info)
}

/// Parses every chapter file under `chapters_dir`, sorted by chapter
/// number with filename as the tie-break.
pub fn scan_chapters(chapters_dir: &Path) -> Result<Vec<ChapterInfo>, ParseError> {
    let entries = fs::read_dir(chapters_dir).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ParseError::MissingChaptersDir(chapters_dir.to_path_buf())
        } else {
            ParseError::Io {
                path: chapters_dir.to_path_buf(),
                source,
            }
        }
    })?;

    let mut chapters = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ParseError::Io {
            path: chapters_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_chapter_file = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| CHAPTER_EXTENSIONS.contains(&ext));
        if !is_chapter_file {
            continue;
        }
        chapters.push(parse_chapter(&path)?);
    }
    chapters.sort_by(|a, b| {
        a.number
            .cmp(&b.number)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    Ok(chapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_chapter_text() {
        let content = "# Chapter 2: The Storm\n\nBody.\n\n## 2.1: Landfall\n\nMore.\n\n## 2.2: Aftermath\n";
        let info = parse_chapter_text("chapter_02.md", content);
        assert_eq!(info.number, 2);
        assert_eq!(info.title, "The Storm");
        assert_eq!(info.subsections.len(), 2);
        assert_eq!(info.subsections[0].title, "Landfall");
        assert_eq!(info.subsections[0].written, Some((2, 1)));
        assert_eq!(info.subsections[0].anchor, "2-1-landfall");
        assert_eq!(info.subsections[1].line, 8);
    }

    #[test]
    fn unnumbered_headers_get_positional_numbers() {
        let content = "# Dawn\n\n## Scene one\n## Scene two\n";
        let info = parse_chapter_text("chapter_01.md", content);
        assert_eq!(info.title, "Dawn");
        assert_eq!(info.subsections[0].anchor, "1-1-scene-one");
        assert_eq!(info.subsections[1].anchor, "1-2-scene-two");
        assert_eq!(info.subsections[0].written, None);
    }

    #[test]
    fn missing_header_falls_back_to_the_stem() {
        let info = parse_chapter_text("chapter_03.md", "just prose\n");
        assert_eq!(info.title, "chapter_03");
        assert!(info.subsections.is_empty());
    }

    #[test]
    fn filename_number_defaults_to_one() {
        let info = parse_chapter_text("notes.md", "# Notes\n");
        assert_eq!(info.number, 1);
        assert_eq!(chapter_number_from_filename("chapter_07.txt"), Some(7));
        assert_eq!(chapter_number_from_filename("chapter_.md"), None);
    }

    #[test]
    fn crlf_content_parses_with_clean_titles() {
        let content = "# Chapter 1: A\r\n\r\n## 1.1: First\r\n";
        let info = parse_chapter_text("chapter_01.md", content);
        assert_eq!(info.title, "A");
        assert_eq!(info.subsections[0].title, "First");
    }

    #[test]
    fn blank_headers_are_ignored() {
        let content = "#   \n# Real Title\n##  \n## Kept\n";
        let info = parse_chapter_text("chapter_01.md", content);
        assert_eq!(info.title, "Real Title");
        assert_eq!(info.subsections.len(), 1);
        assert_eq!(info.subsections[0].title, "Kept");
    }

    #[test]
    fn slugs_are_lowercase_dashed_and_trimmed() {
        assert_eq!(slug("  The Storm!! Returns  "), "the-storm-returns");
        assert_eq!(slug("Épée & dagger"), "p-e-dagger");
        assert_eq!(slug("***"), "");
        assert_eq!(subsection_anchor(3, 2, "A Quiet Morning"), "3-2-a-quiet-morning");
    }

    #[test]
    fn canonical_names_are_zero_padded() {
        assert_eq!(canonical_file_name(3), "chapter_03.md");
        assert_eq!(canonical_file_name(12), "chapter_12.md");
    }

    #[test]
    fn prefix_stripping_is_idempotent() {
        let (n, t) = strip_chapter_prefix("Chapter 4: Night");
        assert_eq!((n, t.as_str()), (Some(4), "Night"));
        let (n2, t2) = strip_chapter_prefix(&t);
        assert_eq!((n2, t2.as_str()), (None, "Night"));

        let (w, s) = strip_subsection_prefix("2.3: Duel");
        assert_eq!((w, s.as_str()), (Some((2, 3)), "Duel"));
        assert_eq!(strip_subsection_prefix("Duel").1, "Duel");
    }
}
