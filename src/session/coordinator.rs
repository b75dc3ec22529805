use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::injector::RecorderInjector;
use super::resolver::TabResolver;
use crate::browser::{BrowserHandle, MessageTransport, ScriptInjector, TabQuery};
use crate::config::Config;
use crate::error::{ChannelError, SessionError};
use crate::messaging::{
    Command, MessageChannel, SessionStatus, StartResponse, StateResponse, StopResponse,
};

/// Result of a successful start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub success: bool,
    /// Armed, capture begins after the next navigation in the tab
    pub pre_navigation: bool,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOutcome {
    pub success: bool,
}

/// What the active tab's recorder reported. `status` and `session_id` let the
/// popup tell an armed session from a capturing one, and one session from another.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    pub is_recording: bool,
    pub status: SessionStatus,
    pub session_id: Option<String>,
}

impl StateView {
    pub fn not_recording() -> Self {
        Self::default()
    }
}

impl From<StateResponse> for StateView {
    fn from(state: StateResponse) -> Self {
        // Older recorders only report the boolean
        let status = state.status.unwrap_or(if state.is_recording {
            SessionStatus::Recording
        } else {
            SessionStatus::Idle
        });
        Self {
            is_recording: state.is_recording,
            status,
            session_id: state.session_id,
        }
    }
}

/// Coordinator wired to the in-process browser runtime
pub type BrowserCoordinator = SessionCoordinator<BrowserHandle, BrowserHandle, BrowserHandle>;

/// Drives recording sessions in whichever tab is active.
///
/// Holds no session state between calls. Every operation re-resolves the tab
/// and asks the tab's recorder, which owns the session.
pub struct SessionCoordinator<Q, I, T> {
    resolver: TabResolver<Q>,
    injector: RecorderInjector<I>,
    channel: MessageChannel<T>,
}

impl BrowserCoordinator {
    pub fn for_browser(browser: BrowserHandle, config: &Config) -> Self {
        Self::new(browser.clone(), browser.clone(), browser, config)
    }
}

impl<Q, I, T> SessionCoordinator<Q, I, T>
where
    Q: TabQuery,
    I: ScriptInjector,
    T: MessageTransport,
{
    pub fn new(query: Q, injector: I, transport: T, config: &Config) -> Self {
        Self {
            resolver: TabResolver::new(query, config.retry_policy()),
            injector: RecorderInjector::new(
                injector,
                config.recorder_script.clone(),
                config.settle_delay(),
            ),
            channel: MessageChannel::new(transport),
        }
    }

    /// Start a session in the active tab
    pub async fn start(&self) -> Result<StartOutcome, SessionError> {
        let tab = self.resolver.resolve_active_tab().await?;
        let session_id = generate_session_id();
        info!(tab = %tab.id, session_id = %session_id, "starting recording");

        // Best effort: whether the start command gets an answer is what counts
        if let Err(e) = self.injector.ensure_injected(tab.id).await {
            warn!(
                error = %e,
                restricted = e.restricted,
                "recorder injection failed, sending start anyway"
            );
        }
        self.injector.settle().await;

        let command = Command::StartRecording {
            session_id: session_id.clone(),
        };
        let reply: StartResponse = self
            .channel
            .send(tab.id, &command)
            .await
            .map_err(|e| SessionError::RecordingStartFailed(e.to_string()))?;

        if !reply.success {
            let reason = reply
                .error
                .unwrap_or_else(|| "recorder rejected start".to_string());
            return Err(SessionError::RecordingStartFailed(reason));
        }

        let pre_navigation = reply.pre_navigation.unwrap_or(false);
        if pre_navigation {
            info!(session_id = %session_id, "session armed until next navigation");
        }

        Ok(StartOutcome {
            success: true,
            pre_navigation,
            session_id,
        })
    }

    /// Stop whatever session the active tab holds. Not retried; on failure the
    /// caller should re-query.
    pub async fn stop(&self) -> Result<StopOutcome, SessionError> {
        let tab = self.resolver.resolve_active_tab().await?;
        info!(tab = %tab.id, "stopping recording");

        let reply: StopResponse = self
            .channel
            .send(tab.id, &Command::StopRecording)
            .await
            .map_err(|e| SessionError::RecordingStopFailed(e.to_string()))?;

        if !reply.success {
            let reason = reply
                .error
                .unwrap_or_else(|| "recorder rejected stop".to_string());
            return Err(SessionError::RecordingStopFailed(reason));
        }

        Ok(StopOutcome { success: true })
    }

    /// Ask the active tab whether it is recording. Never fails: anything that
    /// prevents an answer reads as not recording.
    pub async fn query_state(&self) -> StateView {
        let tab = match self.resolver.resolve_active_tab().await {
            Ok(tab) => tab,
            Err(e) => {
                debug!(error = %e, "no tab to query");
                return StateView::not_recording();
            }
        };

        let reply: Result<StateResponse, _> =
            self.channel.send(tab.id, &Command::GetRecordingState).await;

        match reply {
            Ok(state) => StateView::from(state),
            Err(ChannelError::NoReceiver(_)) => {
                debug!(tab = %tab.id, "no recorder in tab");
                StateView::not_recording()
            }
            Err(e) => {
                warn!(tab = %tab.id, error = %e, "state query failed");
                StateView::not_recording()
            }
        }
    }
}

/// Time-ordered id with a random suffix; collisions are not guarded against
pub fn generate_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("rec_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserRuntime, Page, RuntimeOptions, TabId};
    use serde_json::json;

    const BUSY: &str = "Tabs cannot be queried right now (user may be dragging a tab).";

    fn setup() -> (BrowserHandle, BrowserCoordinator) {
        let config = Config::default();
        let browser = BrowserRuntime::spawn(RuntimeOptions::from(&config));
        let coordinator = BrowserCoordinator::for_browser(browser.clone(), &config);
        (browser, coordinator)
    }

    /// Read the recorder's full state straight from the tab
    async fn recorder_state(browser: &BrowserHandle, tab: TabId) -> StateResponse {
        let reply = browser
            .send_message(tab, json!({ "type": "GET_RECORDING_STATE" }))
            .await
            .unwrap();
        serde_json::from_value(reply).unwrap()
    }

    #[test]
    fn test_session_ids_are_distinct() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert!(a.starts_with("rec_"));
        assert_ne!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_on_fresh_tab() {
        let (browser, coordinator) = setup();
        browser.open_tab(Page::new("https://example.com/app")).await.unwrap();

        let outcome = coordinator.start().await.unwrap();
        assert!(outcome.success);
        assert!(!outcome.pre_navigation);
        assert!(outcome.session_id.starts_with("rec_"));

        assert!(coordinator.query_state().await.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_stop_reads_not_recording() {
        let (browser, coordinator) = setup();
        browser.open_tab(Page::new("https://example.com/app")).await.unwrap();

        for _ in 0..3 {
            coordinator.start().await.unwrap();
            assert!(coordinator.query_state().await.is_recording);

            let stopped = coordinator.stop().await.unwrap();
            assert!(stopped.success);
            assert!(!coordinator.query_state().await.is_recording);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_without_recorder_is_not_recording() {
        let (browser, coordinator) = setup();
        assert!(!coordinator.query_state().await.is_recording);

        browser.open_tab(Page::new("https://example.com")).await.unwrap();
        assert!(!coordinator.query_state().await.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_without_tab_is_no_active_tab() {
        let (_browser, coordinator) = setup();
        assert_eq!(coordinator.start().await.unwrap_err(), SessionError::NoActiveTab);
        assert_eq!(coordinator.stop().await.unwrap_err(), SessionError::NoActiveTab);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_before_document_arms() {
        let (browser, coordinator) = setup();
        let tab = browser
            .open_tab(Page::loading("https://example.com/checkout"))
            .await
            .unwrap();

        let outcome = coordinator.start().await.unwrap();
        assert!(outcome.success);
        assert!(outcome.pre_navigation);

        // Armed reads as engaged
        let view = coordinator.query_state().await;
        assert!(view.is_recording);
        assert_eq!(view.status, SessionStatus::PreNavigationArmed);

        browser
            .navigate(tab, Page::new("https://example.com/checkout"))
            .await
            .unwrap();

        let state = recorder_state(&browser, tab).await;
        assert_eq!(state.status, Some(SessionStatus::Recording));
        assert_eq!(state.session_id, Some(outcome.session_id));
        assert!(coordinator.query_state().await.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumed_session_visible_right_after_navigation() {
        let (browser, coordinator) = setup();
        let tab = browser
            .open_tab(Page::loading("https://example.com/login"))
            .await
            .unwrap();
        let outcome = coordinator.start().await.unwrap();
        assert!(outcome.pre_navigation);

        browser
            .navigate(tab, Page::new("https://example.com/home"))
            .await
            .unwrap();

        // Query and start agree on the session straight after the page loads
        let view = coordinator.query_state().await;
        assert!(view.is_recording);
        assert_eq!(view.status, SessionStatus::Recording);
        assert_eq!(view.session_id.as_deref(), Some(outcome.session_id.as_str()));

        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(err, SessionError::RecordingStartFailed(msg) if msg.contains("already active")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_reports_status_and_session() {
        let (browser, coordinator) = setup();
        assert_eq!(coordinator.query_state().await, StateView::not_recording());

        browser.open_tab(Page::new("https://example.com")).await.unwrap();
        let outcome = coordinator.start().await.unwrap();

        let view = coordinator.query_state().await;
        assert_eq!(view.status, SessionStatus::Recording);
        assert_eq!(view.session_id, Some(outcome.session_id));

        coordinator.stop().await.unwrap();
        let view = coordinator.query_state().await;
        assert_eq!(view.status, SessionStatus::Idle);
        assert_eq!(view.session_id, None);
    }

    #[test]
    fn test_state_view_from_boolean_only_reply() {
        let view = StateView::from(StateResponse {
            is_recording: true,
            status: None,
            session_id: None,
            started_at: None,
        });
        assert_eq!(view.status, SessionStatus::Recording);

        let view: StateView = serde_json::from_value::<StateResponse>(json!({ "isRecording": false }))
            .unwrap()
            .into();
        assert_eq!(view, StateView::not_recording());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_session_ends_on_navigation() {
        let (browser, coordinator) = setup();
        let tab = browser.open_tab(Page::new("https://example.com/a")).await.unwrap();

        coordinator.start().await.unwrap();
        browser.navigate(tab, Page::new("https://example.com/b")).await.unwrap();

        assert!(!coordinator.query_state().await.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_keeps_first_session() {
        let (browser, coordinator) = setup();
        let tab = browser.open_tab(Page::new("https://example.com")).await.unwrap();

        let first = coordinator.start().await.unwrap();
        let second = coordinator.start().await;
        assert!(matches!(second, Err(SessionError::RecordingStartFailed(msg)) if msg.contains("already active")));

        let state = recorder_state(&browser, tab).await;
        assert_eq!(state.session_id, Some(first.session_id));
        assert!(coordinator.query_state().await.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restricted_page_start_fails() {
        let (browser, coordinator) = setup();
        browser.open_tab(Page::new("chrome://newtab/")).await.unwrap();

        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(err, SessionError::RecordingStartFailed(_)));
        assert!(!coordinator.query_state().await.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_recorder_fails() {
        let (browser, coordinator) = setup();
        browser.open_tab(Page::new("https://example.com")).await.unwrap();

        let err = coordinator.stop().await.unwrap_err();
        assert!(matches!(err, SessionError::RecordingStopFailed(msg) if msg.contains("no recorder")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_follows_active_tab() {
        let (browser, coordinator) = setup();
        let first = browser.open_tab(Page::new("https://example.com/a")).await.unwrap();
        coordinator.start().await.unwrap();

        browser.open_tab(Page::new("https://example.com/b")).await.unwrap();
        assert!(!coordinator.query_state().await.is_recording);

        browser.activate(first).await.unwrap();
        assert!(coordinator.query_state().await.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_tab_faults_absorbed() {
        let (browser, coordinator) = setup();
        browser.open_tab(Page::new("https://example.com")).await.unwrap();
        browser.fail_next_queries([BUSY, BUSY]);

        assert!(coordinator.start().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_tab_faults_surface() {
        let (browser, coordinator) = setup();
        browser.open_tab(Page::new("https://example.com")).await.unwrap();
        browser.fail_next_queries([BUSY, BUSY, BUSY]);

        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(err, SessionError::TabQuery { attempts: 3, .. }));

        browser.fail_next_queries([BUSY, BUSY, BUSY]);
        assert!(!coordinator.query_state().await.is_recording);
    }
}
