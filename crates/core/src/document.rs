use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::session::EditorSession;

/// 表示文件目前使用的行尾樣式。 / Represents the current line ending style for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    Cr,
}

impl LineEnding {
    /// 回傳序列化文字時使用的行尾字串。 / Returns the literal string representation used when serialising text.
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
        }
    }
}

/// 文件載入或儲存時可能發生的錯誤。 / Errors that can occur while loading or saving a document.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("chapter file is not valid UTF-8")]
    InvalidUtf8,
    #[error("document has no associated path")]
    NoPath,
}

/// 代表單一章節文字檔的記憶體模型。 / In-memory representation of a single chapter text file.
#[derive(Debug, Clone)]
pub struct Document {
    path: Option<PathBuf>,
    contents: String,
    line_ending: LineEnding,
    is_dirty: bool,
}

impl Document {
    /// 建立一個空內容且尚未儲存的文件。 / Creates an unsaved document with empty contents.
    pub fn new() -> Self {
        Self {
            path: None,
            contents: String::new(),
            line_ending: LineEnding::Lf,
            is_dirty: false,
        }
    }

    /// 從磁碟載入文件並將行尾內部正規化為 `\n`。 / Loads a document from disk, normalising newlines to `\n` internally.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path_ref = path.as_ref();
        let mut file = File::open(path_ref)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let text = String::from_utf8(bytes).map_err(|_| DocumentError::InvalidUtf8)?;
        let line_ending = detect_line_ending(&text);
        let contents = normalize_newlines(&text);

        Ok(Self {
            path: Some(path_ref.to_path_buf()),
            contents,
            line_ending,
            is_dirty: false,
        })
    }

    /// 將文件儲存至現有路徑；若尚未指定路徑則失敗。 / Saves to the current path; fails if no path is set.
    pub fn save(&mut self) -> Result<(), DocumentError> {
        let path = self.path.clone().ok_or(DocumentError::NoPath)?;
        self.save_as(path)
    }

    /// 將文件另存為新路徑並更新相關中繼資料。 / Saves the document to a new path, updating the associated metadata.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path_ref = path.as_ref();
        let encoded = self.contents.replace('\n', self.line_ending.as_str());

        // 先寫入暫存檔再重新命名，避免出現部分寫入的情況。 / Use a temporary file plus rename to guard against partial writes.
        let tmp_path = path_ref.with_extension("tmp_neurodraft");
        {
            let mut tmp_file = File::create(&tmp_path)?;
            tmp_file.write_all(encoded.as_bytes())?;
            tmp_file.sync_all()?;
        }
        fs::rename(&tmp_path, path_ref)?;

        self.path = Some(path_ref.to_path_buf());
        self.is_dirty = false;
        Ok(())
    }

    /// 取得目前文件內容（行尾已正規化為 `\n`）。 / Returns the current contents, normalised to `\n` line endings.
    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// 以新文字取代記憶體內容並標記文件為已修改。 / Replaces the in-memory contents, marking the document as dirty.
    pub fn set_contents(&mut self, text: impl Into<String>) {
        self.contents = normalize_newlines(&text.into());
        self.is_dirty = true;
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    pub fn set_line_ending(&mut self, ending: LineEnding) {
        if self.line_ending != ending {
            self.line_ending = ending;
            self.is_dirty = true;
        }
    }

    /// 判斷文件是否仍有未儲存變更。 / Returns whether the document has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// 將文件標記為已修改。 / Marks the document as having unsaved changes.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// 取得文件所屬的檔案路徑（若存在）。 / Retrieves the associated path if the document is linked to one.
    pub fn doc_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Word count over whitespace-separated tokens, for target tracking.
    pub fn word_count(&self) -> usize {
        self.contents.split_whitespace().count()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSession for Document {
    fn load_from_path(&mut self, path: &Path) -> Result<(), DocumentError> {
        *self = Document::open(path)?;
        Ok(())
    }

    fn save_to_path(&mut self, path: &Path) -> Result<(), DocumentError> {
        self.save_as(path)
    }

    fn content(&self) -> String {
        self.contents.clone()
    }

    fn has_unsaved_changes(&self) -> bool {
        self.is_dirty
    }

    fn path(&self) -> Option<PathBuf> {
        self.path.clone()
    }

    fn set_path(&mut self, path: PathBuf) {
        self.path = Some(path);
    }
}

/// 掃描原始文字找到第一個換行記號以推斷行尾偏好。 / Scans the raw text for the first newline sentinel to infer the preferred line ending.
fn detect_line_ending(text: &str) -> LineEnding {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\r' => {
                if idx + 1 < bytes.len() && bytes[idx + 1] == b'\n' {
                    return LineEnding::CrLf;
                }
                return LineEnding::Cr;
            }
            b'\n' => return LineEnding::Lf,
            _ => {
                idx += 1;
                continue;
            }
        }
    }
    LineEnding::Lf
}

fn normalize_newlines(input: &str) -> String {
    // 將 CRLF 與 CR 轉成 LF，簡化記憶體儲存。 / Convert CRLF and CR sequences to LF for internal storage simplicity.
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                result.push('\n');
            }
            _ => result.push(ch),
        }
    }
    result
}
