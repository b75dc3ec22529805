use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of failure reported by the browser's extension runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FaultKind {
    /// Tab strip is mid-transition; the query may succeed if retried
    TabBusy,
    /// The recorder script is already resident in the tab
    AlreadyInjected,
    /// Nothing is listening for messages in the target tab
    NoReceiver,
    /// The page refuses script injection (browser-internal or store pages)
    Restricted,
    /// Anything else
    #[default]
    Other,
}

/// Compiled regex patterns for fault detection
static RE_TAB_BUSY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(cannot be (edited|queried) right now|dragging a tab|tab strip is busy)").unwrap()
});

static RE_ALREADY_INJECTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(has already been declared|already injected|duplicate (declaration|script))").unwrap()
});

static RE_NO_RECEIVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(receiving end does not exist|could not establish connection)").unwrap()
});

static RE_RESTRICTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(cannot access (contents of|a (chrome|edge|about)[:\w/-]* ?url)|cannot be scripted|extensions gallery cannot)").unwrap()
});

/// Classifier for raw runtime fault messages
pub struct FaultClassifier;

impl FaultClassifier {
    /// Classify a runtime fault message
    pub fn classify(message: &str) -> FaultKind {
        // Priority order: AlreadyInjected > NoReceiver > Restricted > TabBusy > Other
        if RE_ALREADY_INJECTED.is_match(message) {
            return FaultKind::AlreadyInjected;
        }

        if RE_NO_RECEIVER.is_match(message) {
            return FaultKind::NoReceiver;
        }

        if RE_RESTRICTED.is_match(message) {
            return FaultKind::Restricted;
        }

        if RE_TAB_BUSY.is_match(message) {
            return FaultKind::TabBusy;
        }

        FaultKind::Other
    }
}
