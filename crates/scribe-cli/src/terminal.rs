use std::io::{self, Write};

use chrono::{DateTime, Local};
use colored::Colorize;
use parking_lot::Mutex;
use scribe_chat::{EntryId, PresentationSink};
use scribe_core::Role;

/// Prints the transcript to stdout as it changes.
///
/// A terminal cannot rewrite earlier lines, so the entry being revealed is
/// printed incrementally: each update prints only what was not printed yet.
pub struct TerminalSink {
    state: Mutex<TerminalState>,
    show_timestamps: bool,
}

#[derive(Default)]
struct TerminalState {
    next_id: EntryId,
    /// Entry currently being revealed and what has been printed of it
    active: Option<(EntryId, String)>,
    waiting: bool,
}

impl TerminalSink {
    pub fn new(show_timestamps: bool) -> Self {
        Self {
            state: Mutex::new(TerminalState::default()),
            show_timestamps,
        }
    }

    fn label(&self, role: Role, timestamp: DateTime<Local>) -> String {
        let name = match role {
            Role::User => "You:".cyan().bold(),
            Role::Assistant => "Assistant:".green().bold(),
            Role::System => "System:".dimmed(),
        };
        if self.show_timestamps {
            format!("{} {}", timestamp.format("%H:%M").to_string().dimmed(), name)
        } else {
            name.to_string()
        }
    }
}

impl TerminalState {
    fn next(&mut self) -> EntryId {
        self.next_id += 1;
        self.next_id
    }

    /// End the line of the entry being revealed
    fn close_active(&mut self, out: &mut impl Write) {
        if self.active.take().is_some() {
            let _ = writeln!(out);
        }
    }

    fn clear_waiting(&mut self, out: &mut impl Write) {
        if self.waiting {
            let _ = write!(out, "\r\x1b[2K");
            self.waiting = false;
        }
    }
}

impl PresentationSink for TerminalSink {
    fn append_message(&self, role: Role, content: &str, timestamp: DateTime<Local>) -> EntryId {
        let mut state = self.state.lock();
        let mut out = io::stdout().lock();
        state.clear_waiting(&mut out);
        state.close_active(&mut out);
        let _ = writeln!(out, "{} {}", self.label(role, timestamp), content);
        let _ = out.flush();
        state.next()
    }

    fn begin_assistant(&self) -> EntryId {
        let mut state = self.state.lock();
        let mut out = io::stdout().lock();
        state.clear_waiting(&mut out);
        state.close_active(&mut out);
        let _ = write!(out, "{} ", self.label(Role::Assistant, Local::now()));
        let _ = out.flush();
        let id = state.next();
        state.active = Some((id, String::new()));
        id
    }

    fn update_entry(&self, id: EntryId, content: &str) {
        let mut state = self.state.lock();
        let mut out = io::stdout().lock();
        if let Some((active, printed)) = state.active.as_mut() {
            if *active != id {
                return;
            }
            match content.strip_prefix(printed.as_str()) {
                Some(rest) => {
                    let _ = write!(out, "{}", rest);
                }
                // rendering changed what was already printed
                None => {
                    let _ = write!(out, "\n{}", content);
                }
            }
            *printed = content.to_string();
            let _ = out.flush();
        }
    }

    fn remove_entry(&self, id: EntryId) {
        let mut state = self.state.lock();
        if matches!(state.active, Some((active, _)) if active == id) {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", " [discarded]".dimmed());
            state.active = None;
        }
    }

    fn append_notice(&self, content: &str, timestamp: DateTime<Local>) -> EntryId {
        let mut state = self.state.lock();
        let mut out = io::stdout().lock();
        state.clear_waiting(&mut out);
        state.close_active(&mut out);
        let _ = writeln!(
            out,
            "{} {}",
            self.label(Role::Assistant, timestamp),
            format!("❌ {}", content).red()
        );
        let _ = out.flush();
        state.next()
    }

    fn set_input_enabled(&self, enabled: bool) {
        if enabled {
            let mut state = self.state.lock();
            let mut out = io::stdout().lock();
            state.close_active(&mut out);
            let _ = out.flush();
        }
    }

    fn set_waiting(&self, waiting: bool) {
        let mut state = self.state.lock();
        let mut out = io::stdout().lock();
        if waiting {
            let _ = write!(out, "{}", "⏳ waiting for reply...".dimmed());
            state.waiting = true;
        } else {
            state.clear_waiting(&mut out);
        }
        let _ = out.flush();
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        let mut out = io::stdout().lock();
        state.clear_waiting(&mut out);
        state.close_active(&mut out);
        let _ = writeln!(out, "{}", "─".repeat(50).dimmed());
        let _ = out.flush();
    }

    fn focus_input(&self) {}
}
