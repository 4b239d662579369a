//! Presentation seam.
//!
//! The controller never draws anything itself. It describes what changed
//! through [`PresentationSink`] and the front-end decides how it looks.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use scribe_core::Role;

/// Handle of one entry in the transcript
pub type EntryId = u64;

/// Receives presentation changes from the controller.
///
/// Content is already rendered and sanitized. `update_entry` is called from
/// the reveal timer task, so implementations must be cheap and must not
/// block on the controller.
pub trait PresentationSink: Send + Sync {
    fn append_message(&self, role: Role, content: &str, timestamp: DateTime<Local>) -> EntryId;

    /// Start an empty assistant entry that will be filled by reveals.
    fn begin_assistant(&self) -> EntryId;

    fn update_entry(&self, id: EntryId, content: &str);

    fn remove_entry(&self, id: EntryId);

    /// Failure notice, styled like an assistant reply by default.
    fn append_notice(&self, content: &str, timestamp: DateTime<Local>) -> EntryId {
        self.append_message(Role::Assistant, content, timestamp)
    }

    fn set_input_enabled(&self, enabled: bool);

    /// Show or hide the waiting indicator.
    fn set_waiting(&self, waiting: bool);

    /// Remove every entry.
    fn clear(&self);

    fn focus_input(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub role: Role,
    pub content: String,
    pub notice: bool,
}

/// Everything a [`MemorySink`] was told, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Appended(EntryId),
    Began(EntryId),
    Updated(EntryId, String),
    Removed(EntryId),
    InputEnabled(bool),
    Waiting(bool),
    Cleared,
    Focused,
}

#[derive(Debug, Default)]
struct Transcript {
    next_id: EntryId,
    entries: Vec<Entry>,
    events: Vec<SinkEvent>,
    input_enabled: bool,
    waiting: bool,
}

impl Transcript {
    fn push(&mut self, role: Role, content: &str, notice: bool) -> EntryId {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(Entry {
            id,
            role,
            content: content.to_string(),
            notice,
        });
        id
    }
}

/// In-memory transcript, used by headless front-ends and tests.
#[derive(Debug)]
pub struct MemorySink {
    inner: Mutex<Transcript>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Transcript {
                input_enabled: true,
                ..Transcript::default()
            }),
        }
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.inner.lock().entries.clone()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.inner.lock().events.clone()
    }

    pub fn last_entry(&self) -> Option<Entry> {
        self.inner.lock().entries.last().cloned()
    }

    pub fn input_enabled(&self) -> bool {
        self.inner.lock().input_enabled
    }

    pub fn is_waiting(&self) -> bool {
        self.inner.lock().waiting
    }

    /// Content pushed by every `update_entry` for `id`, oldest first.
    pub fn updates(&self, id: EntryId) -> Vec<String> {
        self.inner
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Updated(entry, content) if *entry == id => Some(content.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationSink for MemorySink {
    fn append_message(&self, role: Role, content: &str, _timestamp: DateTime<Local>) -> EntryId {
        let mut inner = self.inner.lock();
        let id = inner.push(role, content, false);
        inner.events.push(SinkEvent::Appended(id));
        id
    }

    fn begin_assistant(&self) -> EntryId {
        let mut inner = self.inner.lock();
        let id = inner.push(Role::Assistant, "", false);
        inner.events.push(SinkEvent::Began(id));
        id
    }

    fn update_entry(&self, id: EntryId, content: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.iter_mut().find(|e| e.id == id) {
            entry.content = content.to_string();
        }
        inner.events.push(SinkEvent::Updated(id, content.to_string()));
    }

    fn remove_entry(&self, id: EntryId) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|e| e.id != id);
        inner.events.push(SinkEvent::Removed(id));
    }

    fn append_notice(&self, content: &str, _timestamp: DateTime<Local>) -> EntryId {
        let mut inner = self.inner.lock();
        let id = inner.push(Role::Assistant, content, true);
        inner.events.push(SinkEvent::Appended(id));
        id
    }

    fn set_input_enabled(&self, enabled: bool) {
        let mut inner = self.inner.lock();
        inner.input_enabled = enabled;
        inner.events.push(SinkEvent::InputEnabled(enabled));
    }

    fn set_waiting(&self, waiting: bool) {
        let mut inner = self.inner.lock();
        inner.waiting = waiting;
        inner.events.push(SinkEvent::Waiting(waiting));
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.events.push(SinkEvent::Cleared);
    }

    fn focus_input(&self) {
        self.inner.lock().events.push(SinkEvent::Focused);
    }
}
