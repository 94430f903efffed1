//! NeuroDraft 核心：文件、編輯工作階段、事件與自動儲存。 / NeuroDraft core: documents, editor sessions, events and auto-save.
//!
//! Everything here runs on a single thread. Components talk through the
//! [`events::EventBus`]; time-driven behaviour goes through the
//! [`clock::Clock`] trait so hosts and tests control it.

pub mod autosave;
pub mod clock;
pub mod document;
pub mod events;
pub mod session;

pub use autosave::AutoSaveController;
pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{Document, DocumentError, LineEnding};
pub use events::{Event, EventBus, EventRecorder, SubscriberId};
pub use session::{
    CloseAction, EditorSession, SessionError, SessionHandle, SessionId, SessionRegistry,
    SharedSession,
};
