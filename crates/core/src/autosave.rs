use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use neurodraft_settings::{
    AutoSaveConfig, ConfigStore, MAX_INTERVAL_SECONDS, MAX_TYPING_PAUSE_SECONDS,
    MIN_INTERVAL_SECONDS, MIN_TYPING_PAUSE_SECONDS,
};

use crate::clock::Clock;
use crate::events::{Event, EventBus, SubscriberId};
use crate::session::{EditorSession, SessionId};

/// Tracking state for one registered session. The controller never owns the
/// session; the registry does.
#[derive(Debug)]
struct TrackedSession {
    session: Weak<RefCell<dyn EditorSession>>,
    path: PathBuf,
    last_saved: Option<Instant>,
    has_unsaved_changes: bool,
}

/// 針對開啟中的工作階段提供閒置防抖與週期性的儲存排程。 / Idle-debounced and periodic save scheduling for open sessions.
///
/// Two deadlines drive the controller, both serviced by `tick()` from the
/// host's event loop:
/// - a one-shot debounce deadline reset to `typing_pause_seconds` after
///   every modification, covering the common save-after-typing case;
/// - a recurring periodic deadline every `interval_seconds` as a liveness
///   fallback when modification events stop arriving.
pub struct AutoSaveController {
    clock: Rc<dyn Clock>,
    bus: Rc<EventBus>,
    store: Box<dyn ConfigStore>,
    config: AutoSaveConfig,
    tracked: HashMap<SessionId, TrackedSession>,
    registration_order: Vec<SessionId>,
    debounce_deadline: Option<Instant>,
    next_periodic: Option<Instant>,
    last_auto_save: Option<Instant>,
}

impl AutoSaveController {
    /// Builds the controller, loading its configuration from the store and
    /// arming the periodic deadline when enabled.
    pub fn new(store: Box<dyn ConfigStore>, clock: Rc<dyn Clock>, bus: Rc<EventBus>) -> Self {
        let config = AutoSaveConfig::load(store.as_ref());
        let next_periodic = config
            .enabled
            .then(|| clock.now() + Duration::from_secs(u64::from(config.interval_seconds)));
        Self {
            clock,
            bus,
            store,
            config,
            tracked: HashMap::new(),
            registration_order: Vec::new(),
            debounce_deadline: None,
            next_periodic,
            last_auto_save: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn interval_seconds(&self) -> u32 {
        self.config.interval_seconds
    }

    pub fn typing_pause_seconds(&self) -> u32 {
        self.config.typing_pause_seconds
    }

    /// Enables or disables both timers. Disabling cancels armed deadlines;
    /// re-enabling arms only the periodic deadline, it never saves
    /// immediately.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        if enabled {
            self.next_periodic = Some(self.clock.now() + self.interval());
            self.emit_status("Auto-save enabled");
        } else {
            self.debounce_deadline = None;
            self.next_periodic = None;
            self.emit_status("Auto-save disabled");
        }
        self.persist_config();
    }

    /// Updates the periodic interval. Out-of-range values are rejected with
    /// a warning, matching the configuration bounds (60..=3600 seconds).
    pub fn set_interval_seconds(&mut self, seconds: u32) {
        if !(MIN_INTERVAL_SECONDS..=MAX_INTERVAL_SECONDS).contains(&seconds) {
            tracing::warn!(seconds, "auto-save interval out of range");
            return;
        }
        self.config.interval_seconds = seconds;
        if self.config.enabled {
            self.next_periodic = Some(self.clock.now() + self.interval());
        }
        self.persist_config();
        self.emit_status(&format!("Auto-save interval set to {seconds} seconds"));
    }

    /// Updates the typing-pause window (5..=60 seconds). An armed debounce
    /// deadline keeps its original expiry; the next modification uses the
    /// new value.
    pub fn set_typing_pause_seconds(&mut self, seconds: u32) {
        if !(MIN_TYPING_PAUSE_SECONDS..=MAX_TYPING_PAUSE_SECONDS).contains(&seconds) {
            tracing::warn!(seconds, "typing pause out of range");
            return;
        }
        self.config.typing_pause_seconds = seconds;
        self.persist_config();
        self.emit_status(&format!("Typing pause set to {seconds} seconds"));
    }

    /// Starts tracking a session at its current path.
    pub fn register(
        &mut self,
        id: SessionId,
        path: PathBuf,
        session: Weak<RefCell<dyn EditorSession>>,
    ) {
        tracing::debug!(path = %path.display(), "registered session for auto-save");
        self.tracked.insert(
            id,
            TrackedSession {
                session,
                path,
                last_saved: None,
                has_unsaved_changes: false,
            },
        );
        self.registration_order.push(id);
    }

    /// Stops tracking a session. Safe to call twice; the destruction event
    /// and an explicit close both funnel here.
    pub fn unregister(&mut self, id: SessionId) {
        if self.tracked.remove(&id).is_some() {
            self.registration_order.retain(|existing| *existing != id);
            tracing::debug!(?id, "unregistered session from auto-save");
        }
    }

    /// Follows a rename performed by the update manager or the registry.
    pub fn update_path(&mut self, id: SessionId, new_path: PathBuf) {
        if let Some(entry) = self.tracked.get_mut(&id) {
            tracing::debug!(path = %new_path.display(), "updated auto-save path");
            entry.path = new_path;
        }
    }

    /// Marks a session dirty and resets the debounce deadline.
    pub fn note_modified(&mut self, id: SessionId) {
        if let Some(entry) = self.tracked.get_mut(&id) {
            entry.has_unsaved_changes = true;
            if self.config.enabled {
                self.debounce_deadline = Some(self.clock.now() + self.typing_pause());
            }
        }
    }

    /// Services expired deadlines. The host calls this from its event loop;
    /// nothing happens while the controller is disabled.
    pub fn tick(&mut self) {
        if !self.config.enabled {
            return;
        }
        let now = self.clock.now();
        if self
            .debounce_deadline
            .map_or(false, |deadline| now >= deadline)
        {
            self.debounce_deadline = None;
            self.save_modified();
        }
        if self.next_periodic.map_or(false, |deadline| now >= deadline) {
            self.next_periodic = Some(now + self.interval());
            self.save_modified();
        }
    }

    /// Saves every dirty session to its current path, in registration
    /// order. Failures leave the dirty flag set so the next deadline
    /// retries implicitly.
    pub fn save_modified(&mut self) -> usize {
        let mut saved = 0;
        for id in self.registration_order.clone() {
            let needs_save = self
                .tracked
                .get(&id)
                .map_or(false, |entry| entry.has_unsaved_changes);
            if needs_save && self.save_session(id) {
                saved += 1;
            }
        }
        if saved > 0 {
            self.last_auto_save = Some(self.clock.now());
            self.bus.emit(Event::AutosaveCompleted { files_saved: saved });
            self.emit_status(&format!("Saved {saved} files"));
        }
        saved
    }

    /// Final safety net on shutdown: saves every registered session whether
    /// dirty or not, reporting per-file outcomes, and never blocks the
    /// shutdown itself. Also flushes the configuration.
    pub fn save_all_on_exit(&mut self) -> usize {
        let mut saved = 0;
        for id in self.registration_order.clone() {
            if self.save_session(id) {
                saved += 1;
            }
        }
        self.emit_status(&format!("Exit: Saved {saved} files"));
        self.persist_config();
        saved
    }

    /// Number of tracked sessions with unsaved changes.
    pub fn modified_count(&self) -> usize {
        self.tracked
            .values()
            .filter(|entry| entry.has_unsaved_changes)
            .count()
    }

    /// Paths of tracked sessions with unsaved changes, registration order.
    pub fn modified_files(&self) -> Vec<PathBuf> {
        self.registration_order
            .iter()
            .filter_map(|id| self.tracked.get(id))
            .filter(|entry| entry.has_unsaved_changes)
            .map(|entry| entry.path.clone())
            .collect()
    }

    pub fn last_auto_save(&self) -> Option<Instant> {
        self.last_auto_save
    }

    /// Subscribes the controller to the modification and destruction events
    /// its entries depend on.
    pub fn subscribe(controller: &Rc<RefCell<Self>>, bus: &EventBus) -> SubscriberId {
        let weak = Rc::downgrade(controller);
        bus.subscribe(move |event| match event {
            Event::SessionModified { session } => {
                if let Some(controller) = weak.upgrade() {
                    controller.borrow_mut().note_modified(*session);
                }
            }
            Event::SessionDestroyed { session } => {
                if let Some(controller) = weak.upgrade() {
                    controller.borrow_mut().unregister(*session);
                }
            }
            _ => {}
        })
    }

    fn save_session(&mut self, id: SessionId) -> bool {
        let (weak, path) = match self.tracked.get(&id) {
            Some(entry) => (entry.session.clone(), entry.path.clone()),
            None => return false,
        };
        let Some(session) = weak.upgrade() else {
            // Owner dropped the session without a destruction event; the
            // stale entry goes away now.
            self.unregister(id);
            return false;
        };

        let outcome = session.borrow_mut().save_to_path(&path);
        match outcome {
            Ok(()) => {
                if let Some(entry) = self.tracked.get_mut(&id) {
                    entry.has_unsaved_changes = false;
                    entry.last_saved = Some(self.clock.now());
                }
                true
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "auto-save failed");
                self.bus.emit(Event::AutosaveFailed {
                    path,
                    reason: err.to_string(),
                });
                false
            }
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.config.interval_seconds))
    }

    fn typing_pause(&self) -> Duration {
        Duration::from_secs(u64::from(self.config.typing_pause_seconds))
    }

    fn persist_config(&mut self) {
        if let Err(err) = self.config.persist(self.store.as_mut()) {
            tracing::warn!(error = %err, "failed to persist auto-save settings");
        }
    }

    fn emit_status(&self, text: &str) {
        self.bus.emit(Event::Status {
            text: text.to_string(),
        });
    }
}
