use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use neurodraft_core::events::{Event, EventBus};
use neurodraft_project::names::{self, NameError};
use neurodraft_project::write_atomic;

use crate::backup::create_backup;
use crate::parser::{
    self, canonical_file_name, scan_chapters, strip_subsection_prefix, subsection_anchor,
    ChapterInfo, ParseError,
};

const RENAME_STAGING_SUFFIX: &str = ".renumber_tmp";

/// 章節結構操作的錯誤型別。 / Errors raised by structural chapter operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("name conflict: {0}")]
    NameConflict(String),
    #[error("chapter {0} not found")]
    ChapterNotFound(u32),
    #[error("index {index} out of range (len {len})")]
    InvalidIndex { index: usize, len: usize },
    #[error("invalid name: {0}")]
    Validation(#[from] NameError),
}

impl UpdateError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// One planned file rename inside a renumber pass.
#[derive(Debug)]
struct RenamePlan {
    from: PathBuf,
    to: PathBuf,
}

/// 章節重新編號與改名的一致性引擎；唯一允許改動章節檔名的元件。 / Restores the chapter invariants after structural changes: contiguous chapter numbers, contiguous subsection numbers, filenames and headers in agreement, cross-references following their anchors.
///
/// Holds a per-project cache of the latest scan; `move_chapter` reorders
/// that cache and renumbering consumes it, so a reorder survives until it
/// is committed to disk. Any committed mutation refreshes the cache.
pub struct UpdateManager {
    bus: Rc<EventBus>,
    cache: HashMap<PathBuf, Vec<ChapterInfo>>,
}

impl UpdateManager {
    pub fn new(bus: Rc<EventBus>) -> Self {
        Self {
            bus,
            cache: HashMap::new(),
        }
    }

    /// Rescans the project's chapters directory, replacing any cached scan.
    pub fn analyze_project(&mut self, project: &Path) -> Result<&[ChapterInfo], UpdateError> {
        let chapters = scan_chapters(&chapters_dir(project)).map_err(|e| self.fail(e.into()))?;
        tracing::debug!(project = %project.display(), count = chapters.len(), "analyzed project");
        let cached = self.cache.entry(project.to_path_buf()).or_default();
        *cached = chapters;
        Ok(cached)
    }

    /// The cached scan for a project, if any.
    pub fn chapters(&self, project: &Path) -> Option<&[ChapterInfo]> {
        self.cache.get(project).map(Vec::as_slice)
    }

    /// Restores `1..K` chapter numbering over the cached order (scanning
    /// first when nothing is cached). For every chapter whose number or
    /// filename must change: backup, rename to the canonical
    /// `chapter_NN.md`, rewrite the `#` header, renumber its subsections.
    /// All renames complete before any header rewrite; renames are staged
    /// through temporary siblings so rotations cannot collide.
    pub fn renumber_chapters(&mut self, project: &Path) -> Result<(), UpdateError> {
        self.ensure_scanned(project)?;
        let chapters = self.cache.get(project).cloned().unwrap_or_default();
        if chapters.is_empty() {
            return Ok(());
        }
        let dir = chapters_dir(project);

        // Plan: position i gets number i+1 and the canonical filename.
        let mut plans: Vec<RenamePlan> = Vec::new();
        let mut touched: Vec<(PathBuf, u32, String)> = Vec::new();
        let mut backups: Vec<PathBuf> = Vec::new();
        for (index, chapter) in chapters.iter().enumerate() {
            let target = index as u32 + 1;
            let final_path = dir.join(canonical_file_name(target));
            if chapter.number != target || chapter.path != final_path {
                touched.push((final_path.clone(), target, chapter.title.clone()));
                backups.push(chapter.path.clone());
                if chapter.path != final_path {
                    plans.push(RenamePlan {
                        from: chapter.path.clone(),
                        to: final_path,
                    });
                }
            }
        }
        if touched.is_empty() {
            self.bus.emit(Event::NumberingUpdated {
                project: project.to_path_buf(),
            });
            return Ok(());
        }

        // A final target held by a file outside the rename set cannot be
        // displaced; detect it before touching the filesystem.
        let sources: HashSet<&PathBuf> = plans.iter().map(|plan| &plan.from).collect();
        for plan in &plans {
            if plan.to.exists() && !sources.contains(&plan.to) {
                return Err(self.fail(UpdateError::NameConflict(plan.to.display().to_string())));
            }
        }

        for path in &backups {
            create_backup(path).map_err(|e| self.fail(UpdateError::io(path, e)))?;
        }

        // Two-phase rename: everything moves aside, then into place.
        for plan in &plans {
            let staged = staging_path(&plan.to);
            fs::rename(&plan.from, &staged).map_err(|e| self.fail(UpdateError::io(&plan.from, e)))?;
        }
        for plan in &plans {
            let staged = staging_path(&plan.to);
            fs::rename(&staged, &plan.to).map_err(|e| self.fail(UpdateError::io(&plan.to, e)))?;
            tracing::debug!(from = %plan.from.display(), to = %plan.to.display(), "renamed chapter file");
            self.bus.emit(Event::PathChanged {
                old: plan.from.clone(),
                new: plan.to.clone(),
            });
        }

        // Rewrites only begin once every rename has landed. Anchor
        // changes accumulate across all touched files so swapped
        // chapters substitute against each other correctly.
        let mut anchor_changes: Vec<(String, String)> = Vec::new();
        for (path, number, title) in &touched {
            rewrite_chapter_header(path, *number, title)
                .map_err(|e| self.fail(UpdateError::io(path, e)))?;
            anchor_changes.extend(self.renumber_subsections_in_file(path, *number)?);
        }
        self.apply_anchor_changes(project, &anchor_changes)?;

        self.analyze_project(project)?;
        self.bus.emit(Event::NumberingUpdated {
            project: project.to_path_buf(),
        });
        Ok(())
    }

    /// Rewrites every `##` header of one chapter to the canonical
    /// `## N.M: <title>` form, numbering positionally, and follows any
    /// anchor change through the rest of the project.
    pub fn renumber_subsections(
        &mut self,
        project: &Path,
        chapter_number: u32,
    ) -> Result<(), UpdateError> {
        self.ensure_scanned(project)?;
        let path = self
            .chapter_path(project, chapter_number)
            .ok_or_else(|| self.fail(UpdateError::ChapterNotFound(chapter_number)))?;
        let changes = self.renumber_subsections_in_file(&path, chapter_number)?;
        self.apply_anchor_changes(project, &changes)?;
        self.analyze_project(project)?;
        Ok(())
    }

    /// Reorders the cached chapter list and renumbers. `from`/`to` are
    /// 0-based positions in the current order.
    pub fn move_chapter(
        &mut self,
        project: &Path,
        from: usize,
        to: usize,
    ) -> Result<(), UpdateError> {
        self.ensure_scanned(project)?;
        let len = self.cache.get(project).map_or(0, Vec::len);
        for index in [from, to] {
            if index >= len {
                return Err(self.fail(UpdateError::InvalidIndex { index, len }));
            }
        }
        if from == to {
            return Ok(());
        }
        if let Some(chapters) = self.cache.get_mut(project) {
            let chapter = chapters.remove(from);
            chapters.insert(to, chapter);
        }
        self.renumber_chapters(project)?;
        self.bus.emit(Event::ChapterMoved {
            project: project.to_path_buf(),
            from,
            to,
        });
        Ok(())
    }

    /// Gives a chapter a new display name: validates it, refuses a name
    /// another chapter already uses, then rewrites the header in place. The
    /// filename never changes here, it is a pure function of the number.
    pub fn rename_chapter(
        &mut self,
        project: &Path,
        chapter_number: u32,
        new_name: &str,
    ) -> Result<(), UpdateError> {
        let trimmed = names::validate_display_name(new_name)
            .map_err(|e| self.fail(e.into()))?
            .to_string();
        self.ensure_scanned(project)?;
        let path = self
            .chapter_path(project, chapter_number)
            .ok_or_else(|| self.fail(UpdateError::ChapterNotFound(chapter_number)))?;

        let siblings: Vec<String> = self
            .cache
            .get(project)
            .map(|chapters| {
                chapters
                    .iter()
                    .filter(|c| c.number != chapter_number)
                    .map(|c| c.title.clone())
                    .collect()
            })
            .unwrap_or_default();
        if !names::is_unique(&trimmed, &siblings) {
            return Err(self.fail(UpdateError::NameConflict(trimmed)));
        }

        create_backup(&path).map_err(|e| self.fail(UpdateError::io(&path, e)))?;
        rewrite_chapter_header(&path, chapter_number, &trimmed)
            .map_err(|e| self.fail(UpdateError::io(&path, e)))?;
        let changes = self.renumber_subsections_in_file(&path, chapter_number)?;
        self.apply_anchor_changes(project, &changes)?;
        self.analyze_project(project)?;
        self.bus.emit(Event::NumberingUpdated {
            project: project.to_path_buf(),
        });
        Ok(())
    }

    /// Retitles one subsection (1-based within its chapter) and updates
    /// every cross-reference to its anchor.
    pub fn rename_subsection(
        &mut self,
        project: &Path,
        chapter_number: u32,
        subsection_number: u32,
        new_title: &str,
    ) -> Result<(), UpdateError> {
        let trimmed = names::validate_display_name(new_title)
            .map_err(|e| self.fail(e.into()))?
            .to_string();
        self.ensure_scanned(project)?;
        let path = self
            .chapter_path(project, chapter_number)
            .ok_or_else(|| self.fail(UpdateError::ChapterNotFound(chapter_number)))?;

        let info = parser::parse_chapter(&path).map_err(|e| self.fail(e.into()))?;
        let position = subsection_number.checked_sub(1).map(|n| n as usize);
        let subsection = position
            .and_then(|p| info.subsections.get(p))
            .ok_or_else(|| {
                self.fail(UpdateError::InvalidIndex {
                    index: subsection_number as usize,
                    len: info.subsections.len(),
                })
            })?;
        let old_anchor = subsection
            .written_anchor()
            .unwrap_or_else(|| subsection.anchor.clone());
        let line = subsection.line;

        create_backup(&path).map_err(|e| self.fail(UpdateError::io(&path, e)))?;
        rewrite_line(&path, line, |_| {
            format!("## {chapter_number}.{subsection_number}: {trimmed}")
        })
        .map_err(|e| self.fail(UpdateError::io(&path, e)))?;

        let new_anchor = subsection_anchor(chapter_number, subsection_number, &trimmed);
        if old_anchor != new_anchor {
            self.update_cross_references(project, &old_anchor, &new_anchor)?;
        }
        self.analyze_project(project)?;
        self.bus.emit(Event::NumberingUpdated {
            project: project.to_path_buf(),
        });
        Ok(())
    }

    /// Reorders subsection blocks inside one chapter (0-based positions),
    /// then renumbers them. A block runs from its `##` header to its last
    /// non-blank line; one blank line separates blocks in the rebuilt file.
    pub fn move_subsection(
        &mut self,
        project: &Path,
        chapter_number: u32,
        from: usize,
        to: usize,
    ) -> Result<(), UpdateError> {
        self.ensure_scanned(project)?;
        let path = self
            .chapter_path(project, chapter_number)
            .ok_or_else(|| self.fail(UpdateError::ChapterNotFound(chapter_number)))?;

        let content = fs::read_to_string(&path).map_err(|e| self.fail(UpdateError::io(&path, e)))?;
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let header_lines: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| is_subsection_header(line))
            .map(|(index, _)| index)
            .collect();
        let len = header_lines.len();
        for index in [from, to] {
            if index >= len {
                return Err(self.fail(UpdateError::InvalidIndex { index, len }));
            }
        }
        if from == to {
            return Ok(());
        }

        let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
        // A block's trailing blank lines are separators, not content; they
        // stay behind so the gap between blocks survives the reorder.
        let block_end = |block: usize| header_lines.get(block + 1).copied().unwrap_or(lines.len());
        let mut blocks: Vec<String> = (0..len)
            .map(|block| {
                let mut body = &lines[header_lines[block]..block_end(block)];
                while body.len() > 1 && body[body.len() - 1].trim().is_empty() {
                    body = &body[..body.len() - 1];
                }
                let mut text = body.concat();
                if !text.ends_with('\n') {
                    text.push_str(newline);
                }
                text
            })
            .collect();
        let prefix: String = lines[..header_lines[0]].concat();
        let moved = blocks.remove(from);
        blocks.insert(to, moved);

        create_backup(&path).map_err(|e| self.fail(UpdateError::io(&path, e)))?;
        let mut rebuilt = prefix;
        for (index, block) in blocks.iter().enumerate() {
            if index > 0 {
                rebuilt.push_str(newline);
            }
            rebuilt.push_str(block);
        }
        write_atomic(&path, rebuilt.as_bytes()).map_err(|e| self.fail(UpdateError::io(&path, e)))?;

        let changes = self.renumber_subsections_in_file(&path, chapter_number)?;
        self.apply_anchor_changes(project, &changes)?;
        self.analyze_project(project)?;
        self.bus.emit(Event::NumberingUpdated {
            project: project.to_path_buf(),
        });
        Ok(())
    }

    /// Replaces every occurrence of `old_anchor` across the project's
    /// chapter files, returning how many were substituted.
    pub fn update_cross_references(
        &mut self,
        project: &Path,
        old_anchor: &str,
        new_anchor: &str,
    ) -> Result<usize, UpdateError> {
        if old_anchor == new_anchor || old_anchor.is_empty() {
            return Ok(0);
        }
        let change = (old_anchor.to_string(), new_anchor.to_string());
        self.apply_anchor_changes(project, std::slice::from_ref(&change))
    }

    /// Chapter files mentioning an anchor, with occurrence counts.
    pub fn find_cross_references(
        &self,
        project: &Path,
        anchor: &str,
    ) -> Result<Vec<(PathBuf, usize)>, UpdateError> {
        let mut found = Vec::new();
        for path in chapter_files(project).map_err(|e| self.fail(e.into()))? {
            let content =
                fs::read_to_string(&path).map_err(|e| self.fail(UpdateError::io(&path, e)))?;
            let count = content.matches(anchor).count();
            if count > 0 {
                found.push((path, count));
            }
        }
        Ok(found)
    }

    /// Whether a display name is free among the project's chapters.
    pub fn is_name_available(&mut self, project: &Path, name: &str) -> Result<bool, UpdateError> {
        self.ensure_scanned(project)?;
        let titles = self.chapter_titles(project);
        Ok(names::is_unique(name, &titles))
    }

    /// A free variation of `base` among the project's chapter names.
    pub fn suggest_chapter_name(
        &mut self,
        project: &Path,
        base: &str,
    ) -> Result<String, UpdateError> {
        self.ensure_scanned(project)?;
        let titles = self.chapter_titles(project);
        Ok(names::suggest_alternative(base, &titles))
    }

    fn chapter_titles(&self, project: &Path) -> Vec<String> {
        self.cache
            .get(project)
            .map(|chapters| chapters.iter().map(|c| c.title.clone()).collect())
            .unwrap_or_default()
    }

    fn chapter_path(&self, project: &Path, chapter_number: u32) -> Option<PathBuf> {
        self.cache.get(project).and_then(|chapters| {
            chapters
                .iter()
                .find(|c| c.number == chapter_number)
                .map(|c| c.path.clone())
        })
    }

    fn ensure_scanned(&mut self, project: &Path) -> Result<(), UpdateError> {
        if !self.cache.contains_key(project) {
            self.analyze_project(project)?;
        }
        Ok(())
    }

    /// Canonicalizes `##` headers in one file and returns the anchor
    /// changes it caused. The caller applies them in one pass and
    /// refreshes the cache afterwards.
    fn renumber_subsections_in_file(
        &mut self,
        path: &Path,
        chapter_number: u32,
    ) -> Result<Vec<(String, String)>, UpdateError> {
        let content = fs::read_to_string(path).map_err(|e| self.fail(UpdateError::io(path, e)))?;
        let mut lines: Vec<String> = content
            .split_inclusive('\n')
            .map(ToString::to_string)
            .collect();

        let mut position = 0u32;
        let mut anchor_changes: Vec<(String, String)> = Vec::new();
        for line in lines.iter_mut() {
            let (body, ending) = body_and_ending(line);
            let Some(raw) = subsection_header_text(body) else {
                continue;
            };
            let (written, title) = strip_subsection_prefix(raw);
            position += 1;
            let new_anchor = subsection_anchor(chapter_number, position, &title);
            if let Some((old_chapter, old_number)) = written {
                let old_anchor = subsection_anchor(old_chapter, old_number, &title);
                if old_anchor != new_anchor {
                    anchor_changes.push((old_anchor, new_anchor));
                }
            }
            *line = format!("## {chapter_number}.{position}: {title}{ending}");
        }
        if position == 0 {
            return Ok(Vec::new());
        }

        write_atomic(path, lines.concat().as_bytes())
            .map_err(|e| self.fail(UpdateError::io(path, e)))?;
        Ok(anchor_changes)
    }

    /// Applies a set of anchor changes as one simultaneous mapping.
    ///
    /// Swapped anchors overlap as old/new pairs, so replacing them one
    /// after another would re-replace references the previous pair just
    /// rewrote. Each old anchor goes through a placeholder first; the
    /// placeholders then resolve to the new anchors in a second pass.
    fn apply_anchor_changes(
        &mut self,
        project: &Path,
        changes: &[(String, String)],
    ) -> Result<usize, UpdateError> {
        if changes.is_empty() {
            return Ok(0);
        }
        let placeholder = |index: usize| format!("\u{0}{index}\u{0}");
        let mut substituted = 0;
        for path in chapter_files(project).map_err(|e| self.fail(e.into()))? {
            let content =
                fs::read_to_string(&path).map_err(|e| self.fail(UpdateError::io(&path, e)))?;
            let mut updated = content;
            let mut count = 0;
            for (index, (old_anchor, _)) in changes.iter().enumerate() {
                count += updated.matches(old_anchor.as_str()).count();
                updated = updated.replace(old_anchor.as_str(), &placeholder(index));
            }
            if count == 0 {
                continue;
            }
            for (index, (_, new_anchor)) in changes.iter().enumerate() {
                updated = updated.replace(&placeholder(index), new_anchor.as_str());
            }
            write_atomic(&path, updated.as_bytes())
                .map_err(|e| self.fail(UpdateError::io(&path, e)))?;
            substituted += count;
        }
        if substituted > 0 {
            tracing::debug!(changed = changes.len(), substituted, "updated cross-references");
        }
        Ok(substituted)
    }

    /// Reports a failure on the bus before it propagates to the caller.
    fn fail(&self, err: UpdateError) -> UpdateError {
        tracing::warn!(error = %err, "structural update failed");
        self.bus.emit(Event::UpdateError {
            reason: err.to_string(),
        });
        err
    }
}

fn chapters_dir(project: &Path) -> PathBuf {
    project.join("chapters")
}

fn staging_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(RENAME_STAGING_SUFFIX);
    PathBuf::from(name)
}

fn chapter_files(project: &Path) -> Result<Vec<PathBuf>, ParseError> {
    Ok(scan_chapters(&chapters_dir(project))?
        .into_iter()
        .map(|chapter| chapter.path)
        .collect())
}

fn body_and_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Replaces one physical line's text, keeping its original terminator.
fn rewrite_line(
    path: &Path,
    line_index: usize,
    replace: impl FnOnce(&str) -> String,
) -> io::Result<()> {
    let content = fs::read_to_string(path)?;
    let mut lines: Vec<String> = content
        .split_inclusive('\n')
        .map(ToString::to_string)
        .collect();
    if let Some(line) = lines.get_mut(line_index) {
        let (body, ending) = body_and_ending(line);
        *line = format!("{}{ending}", replace(body));
    }
    write_atomic(path, lines.concat().as_bytes())
}

fn is_subsection_header(line: &str) -> bool {
    subsection_header_text(body_and_ending(line).0).is_some()
}

fn subsection_header_text(body: &str) -> Option<&str> {
    let rest = body.strip_prefix("##")?;
    if rest.starts_with('#') {
        return None;
    }
    let trimmed = rest.trim();
    (!trimmed.is_empty() && rest.starts_with(char::is_whitespace)).then_some(trimmed)
}

/// Rewrites the first non-empty `#` header to `# Chapter N: <title>`,
/// leaving every other byte alone. Headerless files stay headerless.
fn rewrite_chapter_header(path: &Path, number: u32, title: &str) -> io::Result<()> {
    let content = fs::read_to_string(path)?;
    let mut lines: Vec<String> = content
        .split_inclusive('\n')
        .map(ToString::to_string)
        .collect();
    for line in lines.iter_mut() {
        let (body, ending) = body_and_ending(line);
        let Some(rest) = body.strip_prefix('#') else {
            continue;
        };
        if rest.starts_with('#') || !rest.starts_with(char::is_whitespace) {
            continue;
        }
        if rest.trim().is_empty() {
            continue;
        }
        *line = format!("# Chapter {number}: {title}{ending}");
        return write_atomic(path, lines.concat().as_bytes());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurodraft_core::events::EventRecorder;
    use std::fs;
    use tempfile::tempdir;

    fn project_with(chapters: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempdir().unwrap();
        let root = tmp.path().join("book");
        fs::create_dir_all(root.join("chapters")).unwrap();
        for (name, content) in chapters {
            fs::write(root.join("chapters").join(name), content).unwrap();
        }
        (tmp, root)
    }

    #[test]
    fn renumber_closes_gaps_and_rewrites_headers() {
        let (_tmp, root) = project_with(&[
            ("chapter_01.md", "# Chapter 1: A\n\nBody.\n"),
            ("chapter_03.md", "# Chapter 3: C\n\n## 3.1: Scene\n"),
        ]);
        let bus = EventBus::new();
        let mut manager = UpdateManager::new(Rc::clone(&bus));
        manager.renumber_chapters(&root).unwrap();

        let chapters = root.join("chapters");
        assert!(chapters.join("chapter_02.md").exists());
        assert!(!chapters.join("chapter_03.md").exists());
        let second = fs::read_to_string(chapters.join("chapter_02.md")).unwrap();
        assert!(second.starts_with("# Chapter 2: C\n"));
        assert!(second.contains("## 2.1: Scene\n"));
    }

    #[test]
    fn renumber_is_idempotent() {
        let (_tmp, root) = project_with(&[
            ("chapter_01.md", "# Chapter 1: A\n\n## Scene\n"),
            ("chapter_04.md", "# Chapter 4: D\n"),
        ]);
        let bus = EventBus::new();
        let mut manager = UpdateManager::new(Rc::clone(&bus));
        manager.renumber_chapters(&root).unwrap();

        let snapshot = |root: &Path| -> Vec<(String, String)> {
            let mut files: Vec<(String, String)> = fs::read_dir(root.join("chapters"))
                .unwrap()
                .map(|e| e.unwrap().path())
                .filter(|p| p.extension().map_or(false, |ext| ext == "md"))
                .map(|p| {
                    (
                        p.file_name().unwrap().to_string_lossy().into_owned(),
                        fs::read_to_string(&p).unwrap(),
                    )
                })
                .collect();
            files.sort();
            files
        };
        let first = snapshot(&root);
        manager.renumber_chapters(&root).unwrap();
        assert_eq!(first, snapshot(&root));
    }

    #[test]
    fn renumber_preserves_untouched_bytes() {
        let body = "# Chapter 2: Alone\n\nSome  spaced   prose.\r\nTrailing line";
        let (_tmp, root) = project_with(&[("chapter_02.md", body)]);
        let bus = EventBus::new();
        let mut manager = UpdateManager::new(Rc::clone(&bus));
        manager.renumber_chapters(&root).unwrap();

        let rewritten =
            fs::read_to_string(root.join("chapters").join("chapter_01.md")).unwrap();
        assert_eq!(
            rewritten,
            "# Chapter 1: Alone\n\nSome  spaced   prose.\r\nTrailing line"
        );
    }

    #[test]
    fn headerless_files_do_not_gain_a_header() {
        let (_tmp, root) = project_with(&[("chapter_02.md", "plain notes\nno header\n")]);
        let bus = EventBus::new();
        let mut manager = UpdateManager::new(Rc::clone(&bus));
        manager.renumber_chapters(&root).unwrap();

        let content = fs::read_to_string(root.join("chapters").join("chapter_01.md")).unwrap();
        assert_eq!(content, "plain notes\nno header\n");
    }

    #[test]
    fn renumber_emits_path_changes_then_numbering_updated() {
        let (_tmp, root) = project_with(&[("chapter_05.md", "# Chapter 5: E\n")]);
        let bus = EventBus::new();
        let recorder = EventRecorder::new();
        recorder.attach(&bus);
        let mut manager = UpdateManager::new(Rc::clone(&bus));
        manager.renumber_chapters(&root).unwrap();

        let events = recorder.events();
        let path_changed = events
            .iter()
            .position(|e| matches!(e, Event::PathChanged { .. }))
            .unwrap();
        let numbering = events
            .iter()
            .position(|e| matches!(e, Event::NumberingUpdated { .. }))
            .unwrap();
        assert!(path_changed < numbering);
    }

    #[test]
    fn rename_chapter_keeps_the_filename() {
        let (_tmp, root) = project_with(&[("chapter_01.md", "# Chapter 1: Old\n\nBody.\n")]);
        let bus = EventBus::new();
        let mut manager = UpdateManager::new(Rc::clone(&bus));
        manager.rename_chapter(&root, 1, "New Name").unwrap();

        let content = fs::read_to_string(root.join("chapters").join("chapter_01.md")).unwrap();
        assert_eq!(content, "# Chapter 1: New Name\n\nBody.\n");
        assert!(root
            .join("chapters")
            .join("chapter_01.md.neurodraft_backup")
            .exists());
    }

    #[test]
    fn rename_chapter_rejects_blank_names() {
        let (_tmp, root) = project_with(&[("chapter_01.md", "# Chapter 1: A\n")]);
        let bus = EventBus::new();
        let mut manager = UpdateManager::new(Rc::clone(&bus));
        assert!(matches!(
            manager.rename_chapter(&root, 1, "   "),
            Err(UpdateError::Validation(NameError::Empty))
        ));
    }

    #[test]
    fn rename_subsection_updates_cross_references() {
        let (_tmp, root) = project_with(&[
            (
                "chapter_01.md",
                "# Chapter 1: A\n\n## 1.1: Duel\n\nBody.\n",
            ),
            (
                "chapter_02.md",
                "# Chapter 2: B\n\nSee [the duel](#1-1-duel) again.\n",
            ),
        ]);
        let bus = EventBus::new();
        let mut manager = UpdateManager::new(Rc::clone(&bus));
        manager.rename_subsection(&root, 1, 1, "Final Duel").unwrap();

        let first = fs::read_to_string(root.join("chapters").join("chapter_01.md")).unwrap();
        assert!(first.contains("## 1.1: Final Duel\n"));
        let second = fs::read_to_string(root.join("chapters").join("chapter_02.md")).unwrap();
        assert!(second.contains("#1-1-final-duel"));
        assert!(!second.contains("#1-1-duel)"));
    }

    #[test]
    fn move_subsection_reorders_blocks_and_renumbers() {
        let content = "# Chapter 1: A\n\nIntro.\n\n## 1.1: First\n\nalpha\n\n## 1.2: Second\n\nbeta\n";
        let (_tmp, root) = project_with(&[("chapter_01.md", content)]);
        let bus = EventBus::new();
        let mut manager = UpdateManager::new(Rc::clone(&bus));
        manager.move_subsection(&root, 1, 0, 1).unwrap();

        let rewritten =
            fs::read_to_string(root.join("chapters").join("chapter_01.md")).unwrap();
        assert_eq!(
            rewritten,
            "# Chapter 1: A\n\nIntro.\n\n## 1.1: Second\n\nbeta\n\n## 1.2: First\n\nalpha\n"
        );
    }

    #[test]
    fn swapped_same_title_subsections_keep_references_distinct() {
        let content = "# Chapter 1: A\n\n## 1.1: Scene\n\nfirst block, see #1-2-scene\n\n\
                       ## 1.2: Scene\n\nsecond block, see #1-1-scene\n";
        let (_tmp, root) = project_with(&[("chapter_01.md", content)]);
        let bus = EventBus::new();
        let mut manager = UpdateManager::new(Rc::clone(&bus));
        manager.move_subsection(&root, 1, 0, 1).unwrap();

        let rewritten =
            fs::read_to_string(root.join("chapters").join("chapter_01.md")).unwrap();
        assert_eq!(
            rewritten,
            "# Chapter 1: A\n\n## 1.1: Scene\n\nsecond block, see #1-2-scene\n\n\
             ## 1.2: Scene\n\nfirst block, see #1-1-scene\n"
        );
    }

    #[test]
    fn find_cross_references_counts_occurrences() {
        let (_tmp, root) = project_with(&[
            ("chapter_01.md", "# Chapter 1: A\n\n## 1.1: Duel\n"),
            ("chapter_02.md", "# Chapter 2: B\n\n#1-1-duel and #1-1-duel\n"),
        ]);
        let bus = EventBus::new();
        let manager = UpdateManager::new(Rc::clone(&bus));
        let found = manager.find_cross_references(&root, "1-1-duel").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, 2);
        assert!(found[0].0.ends_with("chapter_02.md"));
    }
}
