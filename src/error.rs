//! Error taxonomy for the recording-session protocol.

use thiserror::Error;

use crate::browser::TabId;

/// Failure delivering one command to a tab's recorder
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No recorder script is listening in the tab
    #[error("no recorder listening in tab {0}")]
    NoReceiver(TabId),

    /// Any other delivery fault, including timeouts and unreadable replies
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure resolving the tab the user is looking at
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TabError {
    #[error("no active tab found")]
    NoActiveTab,

    #[error("tab query failed after {attempts} attempt(s): {message}")]
    TabQuery { attempts: u32, message: String },
}

/// The recorder could not be placed into a tab
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not inject recorder into tab {tab}: {message}")]
pub struct InjectionError {
    pub tab: TabId,
    /// The page is one the browser never lets scripts into
    pub restricted: bool,
    pub message: String,
}

/// Errors surfaced by the session coordinator's start and stop operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no active tab found")]
    NoActiveTab,

    #[error("tab query failed after {attempts} attempt(s): {message}")]
    TabQuery { attempts: u32, message: String },

    #[error("failed to start recording: {0}")]
    RecordingStartFailed(String),

    #[error("failed to stop recording: {0}")]
    RecordingStopFailed(String),
}

impl From<TabError> for SessionError {
    fn from(err: TabError) -> Self {
        match err {
            TabError::NoActiveTab => SessionError::NoActiveTab,
            TabError::TabQuery { attempts, message } => SessionError::TabQuery { attempts, message },
        }
    }
}
