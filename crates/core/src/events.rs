use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::session::SessionId;

/// 核心元件之間交換的型別化通知。 / Typed notifications exchanged between the core components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SessionOpened {
        path: PathBuf,
    },
    SessionClosed {
        path: PathBuf,
    },
    SessionModified {
        session: SessionId,
    },
    SessionDestroyed {
        session: SessionId,
    },
    PathChanged {
        old: PathBuf,
        new: PathBuf,
    },
    AutosaveCompleted {
        files_saved: usize,
    },
    AutosaveFailed {
        path: PathBuf,
        reason: String,
    },
    NumberingUpdated {
        project: PathBuf,
    },
    ChapterMoved {
        project: PathBuf,
        from: usize,
        to: usize,
    },
    UpdateError {
        reason: String,
    },
    Status {
        text: String,
    },
}

/// Handle returned by `EventBus::subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscriber = Box<dyn Fn(&Event)>;

/// 單執行緒同步事件匯流排；發佈時依訂閱順序逐一呼叫訂閱者。 / Synchronous, ordered event delivery on the host's single logical thread.
///
/// Events emitted while an operation runs are handed to every subscriber
/// before the emitting call returns. Subscribing or unsubscribing from
/// inside a subscriber is not supported.
pub struct EventBus {
    subscribers: RefCell<Vec<(SubscriberId, Subscriber)>>,
    next_id: RefCell<u64>,
}

impl EventBus {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            subscribers: RefCell::new(Vec::new()),
            next_id: RefCell::new(1),
        })
    }

    /// Registers a subscriber closure; delivery order follows registration order.
    pub fn subscribe(&self, callback: impl Fn(&Event) + 'static) -> SubscriberId {
        let mut next = self.next_id.borrow_mut();
        let id = SubscriberId(*next);
        *next += 1;
        self.subscribers.borrow_mut().push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers
            .borrow_mut()
            .retain(|(existing, _)| *existing != id);
    }

    /// Delivers the event to every subscriber, in order, before returning.
    pub fn emit(&self, event: Event) {
        let subscribers = self.subscribers.borrow();
        for (_, callback) in subscribers.iter() {
            callback(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.borrow().len())
            .finish()
    }
}

/// 錄下所有事件，供測試與狀態列使用。 / Captures every event it sees; handy in tests and status bars.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Rc<RefCell<Vec<Event>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the recorder to a bus and returns the subscription handle.
    pub fn attach(&self, bus: &EventBus) -> SubscriberId {
        let events = Rc::clone(&self.events);
        bus.subscribe(move |event| events.borrow_mut().push(event.clone()))
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn count_matching(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| predicate(e)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&order);
        bus.subscribe(move |_| first.borrow_mut().push("first"));
        let second = Rc::clone(&order);
        bus.subscribe(move |_| second.borrow_mut().push("second"));

        bus.emit(Event::Status {
            text: "ready".into(),
        });
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let recorder = EventRecorder::new();
        let id = recorder.attach(&bus);

        bus.emit(Event::AutosaveCompleted { files_saved: 1 });
        bus.unsubscribe(id);
        bus.emit(Event::AutosaveCompleted { files_saved: 2 });

        assert_eq!(
            recorder.events(),
            vec![Event::AutosaveCompleted { files_saved: 1 }]
        );
    }

    #[test]
    fn nested_emit_is_allowed() {
        let bus = EventBus::new();
        let recorder = EventRecorder::new();
        recorder.attach(&bus);

        let inner = Rc::clone(&bus);
        bus.subscribe(move |event| {
            if matches!(event, Event::SessionOpened { .. }) {
                inner.emit(Event::Status {
                    text: "opened".into(),
                });
            }
        });

        bus.emit(Event::SessionOpened {
            path: PathBuf::from("/tmp/chapter_01.md"),
        });
        assert_eq!(recorder.count_matching(|e| matches!(e, Event::Status { .. })), 1);
    }
}
