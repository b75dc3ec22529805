use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a recording session as held by the in-tab recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionStatus {
    /// No session
    #[default]
    Idle,
    /// Start was requested before there was a document to capture
    PreNavigationArmed,
    /// Capturing interactions
    Recording,
}

impl SessionStatus {
    /// Collapse to the boolean the popup shows. Armed sessions count as engaged.
    pub fn is_engaged(self) -> bool {
        !matches!(self, SessionStatus::Idle)
    }
}

/// Command envelope sent to the in-tab recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    StartRecording { session_id: String },
    StopRecording,
    GetRecordingState,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::StartRecording { .. } => "START_RECORDING",
            Command::StopRecording => "STOP_RECORDING",
            Command::GetRecordingState => "GET_RECORDING_STATE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_navigation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub is_recording: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}
