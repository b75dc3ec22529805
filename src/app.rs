use anyhow::Result;

use crate::actions::Action;
use crate::browser::TabId;
use crate::error::SessionError;
use crate::messaging::SessionStatus;
use crate::session::{StartOutcome, StateView};

pub const HELP: &str = "start | stop | state | focus | open [--loading] <url> | switch <id> | navigate [--loading] <url> | close | tabs | busy <n> | quit";

/// What the popup last saw. Display only; the tab's recorder is the source of truth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingView {
    pub is_recording: bool,
    pub pre_navigation: bool,
    pub session_id: Option<String>,
}

/// Main application state
pub struct App {
    /// Cached session view
    pub view: RecordingView,
    /// Current message to display (info or error)
    pub message: Option<String>,
    /// Pending action queue
    pub pending_actions: Vec<Action>,
}

impl App {
    pub fn new() -> Self {
        Self {
            view: RecordingView::default(),
            message: None,
            pending_actions: vec![Action::RefreshState],
        }
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::Input(line) => self.handle_input(&line),
            Action::FocusGained => {
                self.pending_actions.push(Action::RefreshState);
                Ok(false)
            }
            Action::Quit => Ok(true),
            other => {
                self.pending_actions.push(other);
                Ok(false)
            }
        }
    }

    fn handle_input(&mut self, line: &str) -> Result<bool> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(false);
        };
        let rest: Vec<&str> = words.collect();

        // Clear the previous message on any new command
        self.message = None;

        match command {
            "q" | "quit" | "exit" => return Ok(true),
            "start" => self.pending_actions.push(Action::StartRecording),
            "stop" => self.pending_actions.push(Action::StopRecording),
            "state" => self.pending_actions.push(Action::RefreshState),
            "focus" => return self.handle_action(Action::FocusGained),
            "tabs" => self.pending_actions.push(Action::ListTabs),
            "close" => self.pending_actions.push(Action::CloseTab),
            "open" | "navigate" => match parse_page_args(&rest) {
                Some((url, loading)) if command == "open" => {
                    self.pending_actions.push(Action::OpenTab { url, loading })
                }
                Some((url, loading)) => self.pending_actions.push(Action::Navigate { url, loading }),
                None => self.message = Some(format!("Usage: {} [--loading] <url>", command)),
            },
            "switch" => match rest.first().and_then(|id| id.parse().ok()) {
                Some(id) => self.pending_actions.push(Action::SwitchTab(TabId(id))),
                None => self.message = Some("Usage: switch <id>".to_string()),
            },
            "busy" => match rest.first().and_then(|n| n.parse().ok()) {
                Some(n) => self.pending_actions.push(Action::SimulateBusy(n)),
                None => self.message = Some("Usage: busy <n>".to_string()),
            },
            "help" | "?" => self.message = Some(HELP.to_string()),
            other => self.message = Some(format!("Unknown command '{}'. {}", other, HELP)),
        }
        Ok(false)
    }

    pub fn apply_started(&mut self, outcome: &StartOutcome) {
        self.view = RecordingView {
            is_recording: true,
            pre_navigation: outcome.pre_navigation,
            session_id: Some(outcome.session_id.clone()),
        };
        self.message = Some(if outcome.pre_navigation {
            "Recording armed; it begins after the next navigation".to_string()
        } else {
            "Recording started".to_string()
        });
    }

    pub fn apply_stopped(&mut self) {
        self.view = RecordingView::default();
        self.message = Some("Recording stopped".to_string());
    }

    /// Re-synchronize the cached view with the tab's answer. The tab wins on
    /// every field; a known id is kept only when the tab reports none.
    pub fn apply_state(&mut self, state: StateView) {
        if !state.is_recording {
            self.view = RecordingView::default();
            return;
        }

        let session_id = state.session_id.or_else(|| self.view.session_id.take());
        self.view = RecordingView {
            is_recording: true,
            pre_navigation: state.status == SessionStatus::PreNavigationArmed,
            session_id,
        };
    }

    pub fn apply_error(&mut self, err: &SessionError) {
        self.message = Some(match err {
            SessionError::NoActiveTab => "No active tab found".to_string(),
            other => other.to_string(),
        });
    }

    /// One-line status for the console
    pub fn status_line(&self) -> String {
        let state = match (self.view.is_recording, self.view.pre_navigation) {
            (false, _) => "○ idle".to_string(),
            (true, true) => "◌ armed".to_string(),
            (true, false) => "● recording".to_string(),
        };
        let session = self
            .view
            .session_id
            .as_deref()
            .map(|id| format!(" ({})", id))
            .unwrap_or_default();

        match &self.message {
            Some(msg) => format!("{}{} │ {}", state, session, msg),
            None => format!("{}{}", state, session),
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_page_args(args: &[&str]) -> Option<(String, bool)> {
    match args {
        ["--loading", url] => Some((url.to_string(), true)),
        [url] => Some((url.to_string(), false)),
        _ => None,
    }
}
