//! The in-tab recorder: sole owner of a tab's recording session.
//!
//! A fresh [`Recorder`] is built each time the script is injected and is only
//! reachable through [`Recorder::handle_message`], driven by its scope task.

mod scope;

pub use scope::{RecorderScope, ScopeHandle};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::messaging::{Command, SessionStatus, StartResponse, StateResponse, StopResponse};

/// Authoritative state of one recording session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
}

/// Per-tab recording state machine
#[derive(Debug)]
pub struct Recorder {
    session: Option<SessionRecord>,
    /// Whether the page has a document to capture yet
    document_ready: bool,
    /// Whether the session already crossed a navigation boundary
    carried: bool,
}

impl Recorder {
    pub fn new(document_ready: bool) -> Self {
        Self {
            session: None,
            document_ready,
            carried: false,
        }
    }

    /// Boot on a new page with a session carried over from before navigation
    pub fn resume(mut record: SessionRecord, document_ready: bool) -> Self {
        if document_ready && record.status == SessionStatus::PreNavigationArmed {
            record.status = SessionStatus::Recording;
            info!(session_id = %record.session_id, "armed session now recording");
        }
        Self {
            session: Some(record),
            document_ready,
            carried: true,
        }
    }

    pub fn session(&self) -> Option<&SessionRecord> {
        self.session.as_ref()
    }

    /// Entry point for raw messages arriving from other contexts
    pub fn handle_message(&mut self, payload: Value) -> Value {
        let command: Command = match serde_json::from_value(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "ignoring unrecognized message");
                return json!({ "success": false, "error": format!("unrecognized message: {}", e) });
            }
        };

        let reply = match command {
            Command::StartRecording { session_id } => serde_json::to_value(self.start(session_id)),
            Command::StopRecording => serde_json::to_value(self.stop()),
            Command::GetRecordingState => serde_json::to_value(self.state()),
        };

        reply.unwrap_or_else(|e| json!({ "success": false, "error": e.to_string() }))
    }

    pub fn start(&mut self, session_id: String) -> StartResponse {
        if session_id.is_empty() {
            return StartResponse {
                success: false,
                pre_navigation: None,
                error: Some("missing session id".to_string()),
            };
        }

        // At most one session per tab; a second start leaves the first untouched
        if let Some(existing) = &self.session {
            warn!(
                active = %existing.session_id,
                rejected = %session_id,
                "start ignored, session already active"
            );
            return StartResponse {
                success: false,
                pre_navigation: None,
                error: Some(format!("session {} already active", existing.session_id)),
            };
        }

        let status = if self.document_ready {
            SessionStatus::Recording
        } else {
            SessionStatus::PreNavigationArmed
        };

        info!(session_id = %session_id, status = ?status, "session started");
        self.carried = false;
        self.session = Some(SessionRecord {
            session_id,
            status,
            started_at: Utc::now(),
        });

        StartResponse {
            success: true,
            pre_navigation: Some(status == SessionStatus::PreNavigationArmed),
            error: None,
        }
    }

    pub fn stop(&mut self) -> StopResponse {
        match self.session.take() {
            Some(record) => info!(session_id = %record.session_id, "session stopped"),
            None => debug!("stop with no active session"),
        }
        StopResponse {
            success: true,
            error: None,
        }
    }

    pub fn state(&self) -> StateResponse {
        let status = self
            .session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(SessionStatus::Idle);

        StateResponse {
            is_recording: status.is_engaged(),
            status: Some(status),
            session_id: self.session.as_ref().map(|s| s.session_id.clone()),
            started_at: self.session.as_ref().map(|s| s.started_at),
        }
    }

    /// Tear down for navigation or close. Only an armed session is handed back,
    /// and only once: a session still armed after one boundary ends here.
    pub fn unload(&mut self) -> Option<SessionRecord> {
        match self.session.take() {
            Some(record) if record.status == SessionStatus::PreNavigationArmed && !self.carried => {
                Some(record)
            }
            Some(record) if record.status == SessionStatus::PreNavigationArmed => {
                info!(
                    session_id = %record.session_id,
                    "armed session dropped, second boundary without a document"
                );
                None
            }
            Some(record) => {
                debug!(session_id = %record.session_id, "session ended by page teardown");
                None
            }
            None => None,
        }
    }
}
