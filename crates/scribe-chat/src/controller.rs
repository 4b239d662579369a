//! Session controller.
//!
//! Owns the conversation history and the in-flight flag, drives one
//! exchange at a time from submit to commit or failure, and is the only
//! writer of the persisted session.
//!
//! ```text
//! Idle --submit--> Sending --headers ok--> Streaming --end--> Committed --> Idle
//!                     |                        |
//!                     +--error--> Failed <-----+--error / empty--> Idle
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::StreamExt;
use parking_lot::Mutex;
use scribe_core::{ConversationHistory, Role, StreamEvent};
use scribe_observability::{create_exchange_span, create_session_span, new_exchange_id};
use scribe_session::{LoadOutcome, SessionStore};
use scribe_stream::{ChatBackend, PlaybackScheduler, RevealTarget};
use tracing::{info, warn, Instrument};

use crate::clipboard::ClipboardWriter;
use crate::error::{ChatError, Result};
use crate::exchange::{Exchange, ExchangeOutcome, ExchangeStatus};
use crate::presentation::{EntryId, PresentationSink};
use crate::render::MessageRenderer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Delay between two revealed characters
    pub reveal_interval: Duration,
    pub system_prompt: Option<String>,
    /// First assistant message of a fresh conversation
    pub greeting: Option<String>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            reveal_interval: Duration::from_millis(20),
            system_prompt: None,
            greeting: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Sending,
    Streaming,
    Committed,
    Failed,
    /// A history-replacing command (restore, new, delete) is running
    Resetting,
}

/// Puts the controller back to idle when the operation ends or is dropped.
struct InFlight<'a> {
    state: &'a Mutex<ControllerState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.state.lock() = ControllerState::Idle;
    }
}

/// Renders the displayed prefix into the placeholder entry on every tick.
struct EntryReveal {
    sink: Arc<dyn PresentationSink>,
    renderer: Arc<dyn MessageRenderer>,
    entry: EntryId,
}

impl RevealTarget for EntryReveal {
    fn reveal(&self, displayed: &str) {
        self.sink
            .update_entry(self.entry, &self.renderer.present(displayed));
    }
}

pub struct SessionController {
    backend: Arc<dyn ChatBackend>,
    session: SessionStore,
    sink: Arc<dyn PresentationSink>,
    renderer: Arc<dyn MessageRenderer>,
    settings: ControllerSettings,
    history: Mutex<ConversationHistory>,
    state: Mutex<ControllerState>,
}

impl SessionController {
    /// Starts from the initial conversation; call [`restore`] to pick up a
    /// persisted session.
    ///
    /// [`restore`]: SessionController::restore
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        session: SessionStore,
        sink: Arc<dyn PresentationSink>,
        renderer: Arc<dyn MessageRenderer>,
        settings: ControllerSettings,
    ) -> Self {
        let history = ConversationHistory::initial(
            settings.system_prompt.as_deref(),
            settings.greeting.as_deref(),
        );
        Self {
            backend,
            session,
            sink,
            renderer,
            settings,
            history: Mutex::new(history),
            state: Mutex::new(ControllerState::Idle),
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn history(&self) -> ConversationHistory {
        self.history.lock().clone()
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.state() != ControllerState::Idle
    }

    /// Run one exchange.
    ///
    /// Empty input and submissions while another operation is running are
    /// rejected with an error. Everything after acceptance ends in an
    /// [`ExchangeOutcome`]; transport failures and empty replies are shown
    /// as a notice and never persisted.
    pub async fn submit(&self, text: &str) -> Result<ExchangeOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyInput);
        }
        let _in_flight = self.try_begin(ControllerState::Sending)?;

        let sent = {
            let mut history = self.history.lock();
            history.push_user(text);
            history.snapshot()
        };
        let exchange_id = new_exchange_id();
        let span = create_exchange_span(&exchange_id, sent.len());
        let mut exchange = Exchange::new(exchange_id, sent);

        self.sink
            .append_message(Role::User, &self.renderer.present(text), Local::now());
        self.sink.set_input_enabled(false);
        self.sink.set_waiting(true);

        let outcome = async {
            info!("exchange started");
            let result = self.stream_reply(&mut exchange).await;
            self.finish(&mut exchange, result).await
        }
        .instrument(span)
        .await;

        self.sink.set_input_enabled(true);
        self.sink.focus_input();
        Ok(outcome)
    }

    async fn stream_reply(&self, exchange: &mut Exchange) -> Result<String> {
        let opened = self.backend.open_stream(exchange.sent_messages()).await;
        self.sink.set_waiting(false);
        let mut stream = opened?;

        self.set_state(ControllerState::Streaming);
        exchange.advance(ExchangeStatus::Streaming);

        let entry = self.sink.begin_assistant();
        let scheduler = PlaybackScheduler::new(
            self.settings.reveal_interval,
            Arc::new(EntryReveal {
                sink: Arc::clone(&self.sink),
                renderer: Arc::clone(&self.renderer),
                entry,
            }),
        );

        while let Some(event) = stream.next().await {
            match event {
                Ok(StreamEvent::TextDelta { text }) => scheduler.on_delta(&text),
                Ok(StreamEvent::StreamEnd) => break,
                Ok(StreamEvent::Ignore) => {}
                Err(e) => {
                    scheduler.cancel();
                    self.sink.remove_entry(entry);
                    return Err(e.into());
                }
            }
        }

        let response = scheduler.on_stream_end();
        if response.is_empty() {
            self.sink.remove_entry(entry);
            return Err(ChatError::EmptyResponse);
        }
        Ok(response)
    }

    async fn finish(&self, exchange: &mut Exchange, result: Result<String>) -> ExchangeOutcome {
        match result {
            Ok(response) => {
                self.set_state(ControllerState::Committed);
                exchange.advance(ExchangeStatus::Complete);

                let snapshot = {
                    let mut history = self.history.lock();
                    history.push_assistant(response.clone());
                    history.clone()
                };
                if let Err(e) = self.session.save(&snapshot).await {
                    warn!(error = %e, "failed to persist session");
                }

                info!(chars = response.chars().count(), "exchange committed");
                ExchangeOutcome::Committed { response }
            }
            Err(err) => {
                self.set_state(ControllerState::Failed);
                exchange.advance(ExchangeStatus::Failed);

                let message = err.user_message();
                warn!(error = %err, "exchange failed");
                self.sink.append_notice(
                    &self.renderer.present(&format!("Error: {}", message)),
                    Local::now(),
                );
                ExchangeOutcome::Failed { message }
            }
        }
    }

    /// Load the persisted session and render it.
    ///
    /// Missing, expired and corrupted sessions start from the initial
    /// conversation. A storage error also resets the view before it is
    /// returned.
    pub async fn restore(&self) -> Result<LoadOutcome> {
        let _in_flight = self.try_begin(ControllerState::Resetting)?;

        async {
            let outcome = match self.session.load().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "failed to read stored session, starting fresh");
                    self.show(self.initial_history());
                    return Err(e.into());
                }
            };

            let mut history = match &outcome {
                LoadOutcome::Loaded(history) => history.clone(),
                _ => self.initial_history(),
            };
            if let Some(prompt) = &self.settings.system_prompt {
                history.ensure_system(prompt);
            }

            info!(messages = history.len(), fresh = outcome.needs_reset(), "session restored");
            self.show(history);
            Ok(outcome)
        }
        .instrument(create_session_span("restore"))
        .await
    }

    /// Archive the persisted history and start over.
    pub async fn new_session(&self) -> Result<()> {
        let _in_flight = self.try_begin(ControllerState::Resetting)?;

        async {
            let archived = self.session.archive().await?;
            let history = self.initial_history();
            self.session.save(&history).await?;
            self.show(history);
            info!(archived, "new session started");
            Ok(())
        }
        .instrument(create_session_span("new"))
        .await
    }

    /// Forget the persisted session. The archive is kept.
    pub async fn delete_session(&self) -> Result<()> {
        let _in_flight = self.try_begin(ControllerState::Resetting)?;

        async {
            let deleted = self.session.delete().await;
            self.show(self.initial_history());
            deleted?;
            info!("session deleted");
            Ok(())
        }
        .instrument(create_session_span("delete"))
        .await
    }

    /// Copy the `index`-th assistant response (1-based, newest when `None`).
    pub fn copy_response(
        &self,
        index: Option<usize>,
        clipboard: &dyn ClipboardWriter,
    ) -> Result<String> {
        let text = {
            let history = self.history.lock();
            let responses: Vec<&str> = history
                .assistant_responses()
                .map(|m| m.content.as_str())
                .collect();
            let picked = match index {
                Some(n) => n.checked_sub(1).and_then(|i| responses.get(i)),
                None => responses.last(),
            };
            picked
                .map(|s| s.to_string())
                .ok_or(ChatError::NoSuchResponse(index.unwrap_or(0)))?
        };

        clipboard.write_text(&text)?;
        info!(chars = text.chars().count(), "response copied");
        Ok(text)
    }

    fn initial_history(&self) -> ConversationHistory {
        ConversationHistory::initial(
            self.settings.system_prompt.as_deref(),
            self.settings.greeting.as_deref(),
        )
    }

    /// Replace the history and redraw the transcript from it.
    fn show(&self, history: ConversationHistory) {
        self.sink.clear();
        for message in history.visible() {
            self.sink.append_message(
                message.role,
                &self.renderer.present(&message.content),
                Local::now(),
            );
        }
        self.history.lock().replace(history);
        self.sink.focus_input();
    }

    fn try_begin(&self, next: ControllerState) -> Result<InFlight<'_>> {
        let mut state = self.state.lock();
        if *state != ControllerState::Idle {
            info!(state = ?*state, "rejected while busy");
            return Err(ChatError::Busy);
        }
        *state = next;
        Ok(InFlight { state: &self.state })
    }

    fn set_state(&self, next: ControllerState) {
        let mut state = self.state.lock();
        info!(from = ?*state, to = ?next, "controller state");
        *state = next;
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("endpoint", &self.backend.endpoint())
            .field("state", &self.state())
            .field("messages", &self.history.lock().len())
            .field("settings", &self.settings)
            .finish()
    }
}
