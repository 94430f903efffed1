use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use crate::autosave::AutoSaveController;
use crate::document::DocumentError;
use crate::events::{Event, EventBus, SubscriberId};

/// 宿主編輯器需提供給核心的能力集合。 / Capability set the host editor widget exposes to the core.
///
/// Any rich-text view that can load, persist and report dirtiness will
/// do.
pub trait EditorSession {
    /// Replaces the content from disk and clears the dirty flag.
    fn load_from_path(&mut self, path: &Path) -> Result<(), DocumentError>;
    /// Writes the current content atomically, clears the dirty flag and
    /// adopts `path` as the session's path.
    fn save_to_path(&mut self, path: &Path) -> Result<(), DocumentError>;
    fn content(&self) -> String;
    fn has_unsaved_changes(&self) -> bool;
    fn path(&self) -> Option<PathBuf>;
    fn set_path(&mut self, path: PathBuf);
}

pub type SharedSession = Rc<RefCell<dyn EditorSession>>;

/// Registry-assigned identity of an open session. Stable for the whole
/// session lifetime, including across path changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

/// An open session together with its identity.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub session: SharedSession,
}

impl SessionHandle {
    /// Two handles are the same session iff they share identity.
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.session, &other.session)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

/// 工作階段註冊表的錯誤型別。 / Error type for registry operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
    #[error("failed to save {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
    #[error("no session is open for {0}")]
    NotOpen(PathBuf),
    #[error("a session is already open for {0}")]
    AlreadyOpen(PathBuf),
}

/// Resolution of the save/discard prompt the host shows for a dirty close.
/// A cancelled prompt simply never reaches the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    Save,
    Discard,
}

/// 路徑對應開啟工作階段的註冊表；每條路徑至多一個工作階段。 / Maps absolute paths to open editor sessions.
///
/// The session's path always equals its key. The registry holds the only
/// owning reference; the auto-save controller tracks sessions through
/// `Weak` handles it receives at registration.
pub struct SessionRegistry {
    sessions: HashMap<PathBuf, SessionHandle>,
    bus: Rc<EventBus>,
    autosave: Option<Rc<RefCell<AutoSaveController>>>,
    next_id: u64,
}

impl SessionRegistry {
    pub fn new(bus: Rc<EventBus>) -> Self {
        Self {
            sessions: HashMap::new(),
            bus,
            autosave: None,
            next_id: 1,
        }
    }

    /// Connects the auto-save controller so sessions are tracked from the
    /// moment they open.
    pub fn attach_autosave(&mut self, controller: Rc<RefCell<AutoSaveController>>) {
        self.autosave = Some(controller);
    }

    /// Opens the session for `path`, constructing one through `make` only
    /// when the path is not already mapped. An existing session is returned
    /// as-is, without reloading.
    pub fn open(
        &mut self,
        path: impl AsRef<Path>,
        make: impl FnOnce() -> SharedSession,
    ) -> Result<SessionHandle, SessionError> {
        let path = path.as_ref().to_path_buf();
        if let Some(existing) = self.sessions.get(&path) {
            return Ok(existing.clone());
        }

        let session = make();
        session
            .borrow_mut()
            .load_from_path(&path)
            .map_err(|source| SessionError::Load {
                path: path.clone(),
                source,
            })?;
        session.borrow_mut().set_path(path.clone());

        let id = SessionId(self.next_id);
        self.next_id += 1;
        let handle = SessionHandle {
            id,
            session: Rc::clone(&session),
        };
        self.sessions.insert(path.clone(), handle.clone());
        tracing::debug!(path = %path.display(), "registered editor session");

        if let Some(controller) = &self.autosave {
            controller
                .borrow_mut()
                .register(id, path.clone(), Rc::downgrade(&session));
        }
        self.bus.emit(Event::SessionOpened { path });
        Ok(handle)
    }

    /// Looks up the session for a path without opening one.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<SessionHandle> {
        self.sessions.get(path.as_ref()).cloned()
    }

    /// Closes the session for `path` with the host-resolved action. A failed
    /// save leaves the session open so the host can retry or discard.
    pub fn close(&mut self, path: impl AsRef<Path>, action: CloseAction) -> Result<(), SessionError> {
        let path = path.as_ref().to_path_buf();
        let handle = self
            .sessions
            .get(&path)
            .cloned()
            .ok_or_else(|| SessionError::NotOpen(path.clone()))?;

        if action == CloseAction::Save && handle.session.borrow().has_unsaved_changes() {
            handle
                .session
                .borrow_mut()
                .save_to_path(&path)
                .map_err(|source| SessionError::Save {
                    path: path.clone(),
                    source,
                })?;
        }

        if let Some(controller) = &self.autosave {
            controller.borrow_mut().unregister(handle.id);
        }
        self.sessions.remove(&path);
        self.bus.emit(Event::SessionClosed { path });
        self.bus.emit(Event::SessionDestroyed { session: handle.id });
        Ok(())
    }

    /// Atomically rebinds a session from `old` to `new` and updates the
    /// session's own path plus the auto-save index.
    pub fn rename_path(&mut self, old: &Path, new: PathBuf) -> Result<(), SessionError> {
        if self.sessions.contains_key(&new) {
            return Err(SessionError::AlreadyOpen(new));
        }
        let handle = self
            .sessions
            .remove(old)
            .ok_or_else(|| SessionError::NotOpen(old.to_path_buf()))?;

        handle.session.borrow_mut().set_path(new.clone());
        if let Some(controller) = &self.autosave {
            controller.borrow_mut().update_path(handle.id, new.clone());
        }
        self.sessions.insert(new, handle);
        Ok(())
    }

    /// Sessions whose in-memory content differs from the last persisted copy.
    pub fn dirty_sessions(&self) -> Vec<SessionHandle> {
        self.sessions
            .values()
            .filter(|handle| handle.session.borrow().has_unsaved_changes())
            .cloned()
            .collect()
    }

    pub fn open_paths(&self) -> Vec<PathBuf> {
        self.sessions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Routes `PathChanged` bus events (emitted by the update manager after
    /// a chapter rename) into `rename_path`. Paths without an open session
    /// are ignored.
    pub fn subscribe_path_changes(registry: &Rc<RefCell<Self>>, bus: &EventBus) -> SubscriberId {
        let weak = Rc::downgrade(registry);
        bus.subscribe(move |event| {
            if let Event::PathChanged { old, new } = event {
                if let Some(registry) = weak.upgrade() {
                    let result = registry.borrow_mut().rename_path(old, new.clone());
                    if let Err(err) = result {
                        if !matches!(err, SessionError::NotOpen(_)) {
                            tracing::warn!(error = %err, "path change could not be applied");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::events::EventRecorder;
    use std::fs;

    fn make_document() -> SharedSession {
        Rc::new(RefCell::new(Document::new()))
    }

    fn seeded_registry() -> (Rc<EventBus>, SessionRegistry, EventRecorder) {
        let bus = EventBus::new();
        let recorder = EventRecorder::new();
        recorder.attach(&bus);
        let registry = SessionRegistry::new(Rc::clone(&bus));
        (bus, registry, recorder)
    }

    #[test]
    fn opening_twice_returns_the_same_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapter_01.md");
        fs::write(&path, "# Chapter 1: Dawn\n").unwrap();

        let (_bus, mut registry, recorder) = seeded_registry();
        let first = registry.open(&path, make_document).unwrap();
        let second = registry.open(&path, make_document).unwrap();

        assert!(first.same_session(&second));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            recorder.count_matching(|e| matches!(e, Event::SessionOpened { .. })),
            1
        );
    }

    #[test]
    fn open_fails_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.md");

        let (_bus, mut registry, _recorder) = seeded_registry();
        let result = registry.open(&path, make_document);
        assert!(matches!(result, Err(SessionError::Load { .. })));
        assert!(registry.is_empty());
    }

    /// Opens a fresh path while keeping a typed handle to the document so
    /// tests can edit through the concrete type.
    fn open_with_document(
        registry: &mut SessionRegistry,
        path: &Path,
    ) -> (SessionHandle, Rc<RefCell<Document>>) {
        let doc = Rc::new(RefCell::new(Document::new()));
        let for_registry: SharedSession = Rc::<RefCell<Document>>::clone(&doc);
        let handle = registry.open(path, move || for_registry).unwrap();
        (handle, doc)
    }

    #[test]
    fn close_with_save_persists_dirty_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapter_01.md");
        fs::write(&path, "# Chapter 1: Dawn\n").unwrap();

        let (_bus, mut registry, recorder) = seeded_registry();
        let (_handle, doc) = open_with_document(&mut registry, &path);
        doc.borrow_mut()
            .set_contents("# Chapter 1: Dawn\n\nMore text.\n");

        registry.close(&path, CloseAction::Save).unwrap();
        assert!(registry.is_empty());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# Chapter 1: Dawn\n\nMore text.\n"
        );
        assert_eq!(
            recorder.count_matching(|e| matches!(e, Event::SessionClosed { .. })),
            1
        );
        assert_eq!(
            recorder.count_matching(|e| matches!(e, Event::SessionDestroyed { .. })),
            1
        );
    }

    #[test]
    fn close_with_discard_keeps_disk_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapter_01.md");
        fs::write(&path, "# Chapter 1: Dawn\n").unwrap();

        let (_bus, mut registry, _recorder) = seeded_registry();
        let (_handle, doc) = open_with_document(&mut registry, &path);
        doc.borrow_mut().set_contents("forget me\n");

        registry.close(&path, CloseAction::Discard).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# Chapter 1: Dawn\n");
    }

    #[test]
    fn rename_path_rebinds_the_key_and_session() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("chapter_02.md");
        let new = dir.path().join("chapter_01.md");
        fs::write(&old, "# Chapter 2: Storm\n").unwrap();

        let (_bus, mut registry, _recorder) = seeded_registry();
        let handle = registry.open(&old, make_document).unwrap();
        registry.rename_path(&old, new.clone()).unwrap();

        assert!(registry.get(&old).is_none());
        let rebound = registry.get(&new).unwrap();
        assert!(handle.same_session(&rebound));
        assert_eq!(rebound.session.borrow().path().as_deref(), Some(new.as_path()));
    }

    #[test]
    fn path_changed_events_rebind_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("chapter_03.md");
        let new = dir.path().join("chapter_02.md");
        fs::write(&old, "# Chapter 3: Calm\n").unwrap();

        let bus = EventBus::new();
        let registry = Rc::new(RefCell::new(SessionRegistry::new(Rc::clone(&bus))));
        SessionRegistry::subscribe_path_changes(&registry, &bus);

        registry.borrow_mut().open(&old, make_document).unwrap();
        bus.emit(Event::PathChanged {
            old: old.clone(),
            new: new.clone(),
        });

        assert!(registry.borrow().get(&old).is_none());
        assert!(registry.borrow().get(&new).is_some());
    }

    #[test]
    fn dirty_enumeration_only_reports_modified_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let clean = dir.path().join("chapter_01.md");
        let dirty = dir.path().join("chapter_02.md");
        fs::write(&clean, "# Chapter 1: A\n").unwrap();
        fs::write(&dirty, "# Chapter 2: B\n").unwrap();

        let (_bus, mut registry, _recorder) = seeded_registry();
        open_with_document(&mut registry, &clean);
        let (handle, doc) = open_with_document(&mut registry, &dirty);
        assert!(registry.dirty_sessions().is_empty());

        doc.borrow_mut().set_contents("# Chapter 2: B\n\nEdit.\n");
        let dirty_now = registry.dirty_sessions();
        assert_eq!(dirty_now.len(), 1);
        assert!(dirty_now[0].same_session(&handle));
    }
}
