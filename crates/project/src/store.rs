use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::metadata::ProjectMetadata;
use crate::util::write_atomic;

/// Chapter file extensions the store recognizes.
pub const CHAPTER_EXTENSIONS: [&str; 2] = ["md", "txt"];

const METADATA_FILE: &str = "project.json";
const HASHTAG_INDEX: &str = "index.json";
const SUBTREES: [&str; 4] = ["chapters", "characters", "research", "corkboard"];
const HASHTAG_DIR: &str = ".hashtags";
const SEED_HASHTAGS: [&str; 5] = ["#character", "#plot", "#research", "#scene", "#todo"];
const SEED_CHAPTER: &str = "# Chapter 1\n\nBegin your story here...\n";

/// 專案儲存相關的錯誤。 / Errors raised by project persistence.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("a project already exists at {0}")]
    AlreadyExists(PathBuf),
    #[error("project file not found: {0}")]
    NotFound(PathBuf),
    #[error("malformed project file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("project IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no project is open")]
    NoProject,
}

impl ProjectError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 專案的磁碟配置與中繼資料；所有寫入皆為原子提交。 / On-disk project layout plus the in-memory copy of its metadata:
///
/// ```text
/// <project>/
///   project.json
///   chapters/chapter_NN.md
///   characters/  research/  corkboard/
///   .hashtags/index.json
/// ```
///
/// Writes go through a temp-then-rename commit, so a failed save leaves the
/// previous files intact. `modified` moves forward on every commit.
#[derive(Debug, Default)]
pub struct ProjectStore {
    root: Option<PathBuf>,
    metadata: Option<ProjectMetadata>,
    hashtags: BTreeSet<String>,
    modified: bool,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the full project skeleton at `root`: the four subtrees, the
    /// hashtag index with its seed tags, default metadata and a starter
    /// `chapters/chapter_01.md`. Fails if `root` already holds a project.
    pub fn create_project(
        &mut self,
        root: impl AsRef<Path>,
        name: &str,
    ) -> Result<(), ProjectError> {
        let root = root.as_ref().to_path_buf();
        if root.join(METADATA_FILE).exists() {
            return Err(ProjectError::AlreadyExists(root));
        }
        for subtree in SUBTREES {
            let dir = root.join(subtree);
            fs::create_dir_all(&dir).map_err(|e| ProjectError::io(&dir, e))?;
        }
        let hashtag_dir = root.join(HASHTAG_DIR);
        fs::create_dir_all(&hashtag_dir).map_err(|e| ProjectError::io(&hashtag_dir, e))?;

        let first_chapter = root.join("chapters").join("chapter_01.md");
        fs::write(&first_chapter, SEED_CHAPTER).map_err(|e| ProjectError::io(&first_chapter, e))?;

        self.root = Some(root);
        self.metadata = Some(ProjectMetadata::new(name));
        self.hashtags = SEED_HASHTAGS.iter().map(|tag| tag.to_string()).collect();
        self.modified = false;
        self.write_metadata()?;
        self.write_hashtag_index()?;
        tracing::info!(name, "created project");
        Ok(())
    }

    /// Opens a project from its `project.json` path and returns the project
    /// name. Loads the hashtag index when one is present.
    pub fn open_project(&mut self, metadata_path: impl AsRef<Path>) -> Result<String, ProjectError> {
        let metadata_path = metadata_path.as_ref().to_path_buf();
        let contents = match fs::read_to_string(&metadata_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ProjectError::NotFound(metadata_path));
            }
            Err(err) => return Err(ProjectError::io(&metadata_path, err)),
        };
        let metadata: ProjectMetadata =
            serde_json::from_str(&contents).map_err(|err| ProjectError::Malformed {
                path: metadata_path.clone(),
                reason: err.to_string(),
            })?;
        let root = metadata_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ProjectError::Malformed {
                path: metadata_path.clone(),
                reason: "project file has no parent directory".to_string(),
            })?;

        self.hashtags = read_hashtag_index(&root)?;
        let name = metadata.name.clone();
        self.root = Some(root);
        self.metadata = Some(metadata);
        self.modified = false;
        tracing::info!(name, "opened project");
        Ok(name)
    }

    /// Commits metadata and the hashtag index, advancing `modified`.
    pub fn save_project(&mut self) -> Result<(), ProjectError> {
        if let Some(metadata) = self.metadata.as_mut() {
            metadata.touch();
        } else {
            return Err(ProjectError::NoProject);
        }
        self.write_metadata()?;
        self.write_hashtag_index()?;
        self.modified = false;
        Ok(())
    }

    /// Closes the project, committing first when there are pending changes.
    pub fn close_project(&mut self) -> Result<(), ProjectError> {
        if self.root.is_some() && self.modified {
            self.save_project()?;
        }
        self.root = None;
        self.metadata = None;
        self.hashtags.clear();
        self.modified = false;
        Ok(())
    }

    /// A path is a project root when the metadata file and the load-bearing
    /// subtrees are all present.
    pub fn is_valid(path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        path.join(METADATA_FILE).is_file()
            && path.join("chapters").is_dir()
            && path.join("characters").is_dir()
            && path.join("corkboard").is_dir()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.name.as_str())
    }

    pub fn metadata(&self) -> Option<&ProjectMetadata> {
        self.metadata.as_ref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn chapters_dir(&self) -> Result<PathBuf, ProjectError> {
        Ok(self.require_root()?.join("chapters"))
    }

    pub fn characters_dir(&self) -> Result<PathBuf, ProjectError> {
        Ok(self.require_root()?.join("characters"))
    }

    /// Chapter stems in lexicographic order, filtered to the recognized
    /// extensions. Lexicographic order on zero-padded stems IS chapter
    /// order.
    pub fn list_chapters(&self) -> Result<Vec<String>, ProjectError> {
        let dir = self.chapters_dir()?;
        Self::list_stems(&dir)
    }

    /// Character sheet stems in lexicographic order.
    pub fn list_characters(&self) -> Result<Vec<String>, ProjectError> {
        let dir = self.characters_dir()?;
        Self::list_stems(&dir)
    }

    fn list_stems(dir: &Path) -> Result<Vec<String>, ProjectError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ProjectError::io(dir, err)),
        };
        let mut stems = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ProjectError::io(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let has_known_extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| CHAPTER_EXTENSIONS.contains(&ext));
            if !has_known_extension {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }

    pub fn project_word_target(&self) -> Option<u32> {
        self.metadata.as_ref().map(|m| m.word_targets.project)
    }

    pub fn set_project_word_target(&mut self, target: u32) -> Result<(), ProjectError> {
        let metadata = self.metadata.as_mut().ok_or(ProjectError::NoProject)?;
        metadata.word_targets.project = target;
        self.modified = true;
        Ok(())
    }

    pub fn chapter_word_target(&self, stem: &str) -> Option<u32> {
        self.metadata
            .as_ref()
            .and_then(|m| m.word_targets.chapters.get(stem).copied())
    }

    pub fn set_chapter_word_target(&mut self, stem: &str, target: u32) -> Result<(), ProjectError> {
        let metadata = self.metadata.as_mut().ok_or(ProjectError::NoProject)?;
        metadata
            .word_targets
            .chapters
            .insert(stem.to_string(), target);
        self.modified = true;
        Ok(())
    }

    /// All hashtags in lexicographic order.
    pub fn hashtags(&self) -> Vec<String> {
        self.hashtags.iter().cloned().collect()
    }

    /// Adds a hashtag; duplicates are a no-op that leaves the project
    /// unmodified.
    pub fn add_hashtag(&mut self, tag: &str) {
        if self.hashtags.insert(tag.to_string()) {
            self.modified = true;
        }
    }

    pub fn remove_hashtag(&mut self, tag: &str) {
        if self.hashtags.remove(tag) {
            self.modified = true;
        }
    }

    fn require_root(&self) -> Result<&Path, ProjectError> {
        self.root.as_deref().ok_or(ProjectError::NoProject)
    }

    fn write_metadata(&self) -> Result<(), ProjectError> {
        let root = self.require_root()?;
        let metadata = self.metadata.as_ref().ok_or(ProjectError::NoProject)?;
        let path = root.join(METADATA_FILE);
        let json = serde_json::to_vec_pretty(metadata).map_err(|err| ProjectError::Malformed {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        write_atomic(&path, &json).map_err(|e| ProjectError::io(&path, e))
    }

    fn write_hashtag_index(&self) -> Result<(), ProjectError> {
        let root = self.require_root()?;
        let path = root.join(HASHTAG_DIR).join(HASHTAG_INDEX);
        let tags: Vec<&String> = self.hashtags.iter().collect();
        let json = serde_json::to_vec_pretty(&tags).map_err(|err| ProjectError::Malformed {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        write_atomic(&path, &json).map_err(|e| ProjectError::io(&path, e))
    }
}

fn read_hashtag_index(root: &Path) -> Result<BTreeSet<String>, ProjectError> {
    let path = root.join(HASHTAG_DIR).join(HASHTAG_INDEX);
    match fs::read_to_string(&path) {
        Ok(contents) => {
            let tags: Vec<String> =
                serde_json::from_str(&contents).map_err(|err| ProjectError::Malformed {
                    path: path.clone(),
                    reason: err.to_string(),
                })?;
            Ok(tags.into_iter().collect())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(err) => Err(ProjectError::io(&path, err)),
    }
}
