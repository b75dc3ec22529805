use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

use super::{Recorder, SessionRecord};
use crate::browser::{RuntimeFault, TabId};

/// Messages delivered into a tab's script scope
enum ScopeMessage {
    /// Command from another context, answered through `reply`
    Command {
        payload: Value,
        reply: oneshot::Sender<Value>,
    },
    /// Page is going away; hand back anything that should survive it
    Unload {
        reply: oneshot::Sender<Option<SessionRecord>>,
    },
}

/// Sender side of a running recorder scope, held by the browser
#[derive(Debug, Clone)]
pub struct ScopeHandle {
    tx: mpsc::UnboundedSender<ScopeMessage>,
    /// When the message listener finishes attaching
    listening_at: Instant,
}

impl std::fmt::Debug for ScopeMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeMessage::Command { payload, .. } => write!(f, "Command({})", payload),
            ScopeMessage::Unload { .. } => write!(f, "Unload"),
        }
    }
}

impl ScopeHandle {
    /// Whether the scope task is still alive
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Whether the scope is alive and its listener has attached
    pub fn is_listening(&self) -> bool {
        self.is_alive() && Instant::now() >= self.listening_at
    }

    /// Deliver one payload and wait for the recorder's reply
    pub async fn deliver(&self, payload: Value) -> Result<Value, RuntimeFault> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ScopeMessage::Command { payload, reply })
            .map_err(|_| RuntimeFault::no_receiver())?;
        rx.await
            .map_err(|_| RuntimeFault::new("The message port closed before a response was received."))
    }

    /// Tear the scope down, returning a session that should outlive the page
    pub async fn unload(self) -> Option<SessionRecord> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ScopeMessage::Unload { reply }).is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }
}

/// Script scope running one recorder inside a tab
pub struct RecorderScope;

impl RecorderScope {
    /// Spawn the scope task. Its listener accepts messages once `attach_delay` has passed.
    pub fn spawn(tab: TabId, recorder: Recorder, attach_delay: Duration) -> ScopeHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<ScopeMessage>();

        tokio::spawn(async move {
            let mut recorder = recorder;
            while let Some(message) = rx.recv().await {
                match message {
                    ScopeMessage::Command { payload, reply } => {
                        let response = recorder.handle_message(payload);
                        let _ = reply.send(response);
                    }
                    ScopeMessage::Unload { reply } => {
                        let _ = reply.send(recorder.unload());
                        break;
                    }
                }
            }
            debug!(
                tab = %tab,
                had_session = recorder.session().is_some(),
                "recorder scope torn down"
            );
        });

        ScopeHandle {
            tx,
            listening_at: Instant::now() + attach_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_listener_attaches_after_delay() {
        let scope = RecorderScope::spawn(TabId(1), Recorder::new(true), Duration::from_millis(50));
        assert!(scope.is_alive());
        assert!(!scope.is_listening());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scope.is_listening());
    }

    #[tokio::test]
    async fn test_deliver_round_trip() {
        let scope = RecorderScope::spawn(TabId(1), Recorder::new(true), Duration::ZERO);

        let reply = scope
            .deliver(json!({ "type": "START_RECORDING", "sessionId": "rec_a" }))
            .await
            .unwrap();
        assert_eq!(reply["success"], true);

        let reply = scope.deliver(json!({ "type": "GET_RECORDING_STATE" })).await.unwrap();
        assert_eq!(reply["isRecording"], true);
    }

    #[tokio::test]
    async fn test_unload_ends_scope() {
        let scope = RecorderScope::spawn(TabId(1), Recorder::new(false), Duration::ZERO);
        scope
            .deliver(json!({ "type": "START_RECORDING", "sessionId": "rec_b" }))
            .await
            .unwrap();

        let stale = scope.clone();
        let carried = scope.unload().await.unwrap();
        assert_eq!(carried.session_id, "rec_b");

        let result = stale.deliver(json!({ "type": "GET_RECORDING_STATE" })).await;
        assert!(result.is_err());
    }
}
