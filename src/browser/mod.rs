mod faults;
mod runtime;

pub use faults::{FaultClassifier, FaultKind};
pub use runtime::{BrowserHandle, BrowserRuntime, RuntimeOptions};

use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier the browser assigns to a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tab as reported by the tab-query API at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabHandle {
    /// Tab ID
    pub id: TabId,
    /// Whether the tab was the live, focused tab when queried
    pub active: bool,
    /// URL loaded in the tab
    pub url: String,
}

/// Pages the browser never lets an extension script into
static RE_RESTRICTED_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^((chrome|edge|about|chrome-extension|moz-extension|view-source):|https://chrome\.google\.com/webstore)").unwrap()
});

/// Document loaded in a tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    /// Whether a capturable document exists yet
    pub ready: bool,
}

impl Page {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ready: true,
        }
    }

    /// A page whose document has not been created yet
    pub fn loading(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ready: false,
        }
    }

    pub fn is_restricted(&self) -> bool {
        RE_RESTRICTED_URL.is_match(&self.url)
    }
}

/// Failure signalled by the extension runtime, carrying the raw `lastError` message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeFault {
    pub message: String,
}

impl RuntimeFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn no_receiver() -> Self {
        Self::new("Could not establish connection. Receiving end does not exist.")
    }

    pub fn no_tab(tab: TabId) -> Self {
        Self::new(format!("No tab with id: {}.", tab))
    }

    pub fn kind(&self) -> FaultKind {
        FaultClassifier::classify(&self.message)
    }
}

/// Tab-query API of the extension runtime
#[async_trait]
pub trait TabQuery: Send + Sync {
    /// Query the active tab in the current window; `Ok(None)` when nothing matched
    async fn query_active_tab(&self) -> Result<Option<TabHandle>, RuntimeFault>;
}

/// Script-injection API of the extension runtime
#[async_trait]
pub trait ScriptInjector: Send + Sync {
    async fn execute_script(&self, tab: TabId, file: &str) -> Result<(), RuntimeFault>;
}

/// Inter-context messaging primitive: one JSON payload out, one JSON payload back
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_message(&self, tab: TabId, payload: Value) -> Result<Value, RuntimeFault>;
}
