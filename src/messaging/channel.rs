use serde::de::DeserializeOwned;
use tracing::debug;

use super::wire::Command;
use crate::browser::{FaultKind, MessageTransport, RuntimeFault, TabId};
use crate::error::ChannelError;

/// Typed request/response channel to a tab's recorder
///
/// Sends exactly one command and awaits exactly one reply. Never retries;
/// retry policy belongs to callers.
pub struct MessageChannel<T> {
    transport: T,
}

impl<T: MessageTransport> MessageChannel<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Send a command to the tab and decode its reply
    pub async fn send<R: DeserializeOwned>(
        &self,
        tab: TabId,
        command: &Command,
    ) -> Result<R, ChannelError> {
        let payload = serde_json::to_value(command)
            .map_err(|e| ChannelError::Transport(format!("unserializable command: {}", e)))?;

        debug!(tab = %tab, command = command.kind(), "sending command");

        let reply = self
            .transport
            .send_message(tab, payload)
            .await
            .map_err(|fault| Self::normalize(tab, fault))?;

        serde_json::from_value(reply)
            .map_err(|e| ChannelError::Transport(format!("malformed response: {}", e)))
    }

    fn normalize(tab: TabId, fault: RuntimeFault) -> ChannelError {
        match fault.kind() {
            FaultKind::NoReceiver => ChannelError::NoReceiver(tab),
            _ => ChannelError::Transport(fault.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{StartResponse, StateResponse};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Transport that records what it was sent and replays one canned result
    struct CannedTransport {
        reply: Result<Value, RuntimeFault>,
        sent: Mutex<Vec<(TabId, Value)>>,
    }

    impl CannedTransport {
        fn new(reply: Result<Value, RuntimeFault>) -> Self {
            Self {
                reply,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessageTransport for CannedTransport {
        async fn send_message(&self, tab: TabId, payload: Value) -> Result<Value, RuntimeFault> {
            self.sent.lock().unwrap().push((tab, payload));
            self.reply.clone()
        }
    }

    #[tokio::test]
    async fn test_send_decodes_reply() {
        let channel = MessageChannel::new(CannedTransport::new(Ok(
            json!({ "success": true, "preNavigation": true }),
        )));
        let command = Command::StartRecording {
            session_id: "rec_1".to_string(),
        };

        let reply: StartResponse = channel.send(TabId(4), &command).await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.pre_navigation, Some(true));

        let sent = channel.transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, TabId(4));
        assert_eq!(sent[0].1["type"], "START_RECORDING");
        assert_eq!(sent[0].1["sessionId"], "rec_1");
    }

    #[tokio::test]
    async fn test_no_listener_is_no_receiver() {
        let channel = MessageChannel::new(CannedTransport::new(Err(RuntimeFault::no_receiver())));

        let result: Result<StateResponse, _> =
            channel.send(TabId(2), &Command::GetRecordingState).await;
        assert_eq!(result.unwrap_err(), ChannelError::NoReceiver(TabId(2)));
    }

    #[tokio::test]
    async fn test_other_faults_are_transport_errors() {
        let channel = MessageChannel::new(CannedTransport::new(Err(RuntimeFault::new(
            "Timed out after 5000ms waiting for a response from tab 2",
        ))));

        let result: Result<StateResponse, _> =
            channel.send(TabId(2), &Command::GetRecordingState).await;
        assert!(matches!(result, Err(ChannelError::Transport(msg)) if msg.contains("Timed out")));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_transport_error() {
        let channel = MessageChannel::new(CannedTransport::new(Ok(json!({ "unexpected": 1 }))));

        let result: Result<StateResponse, _> =
            channel.send(TabId(1), &Command::GetRecordingState).await;
        assert!(matches!(result, Err(ChannelError::Transport(msg)) if msg.contains("malformed")));
    }

    #[tokio::test]
    async fn test_send_does_not_retry() {
        let channel = MessageChannel::new(CannedTransport::new(Err(RuntimeFault::no_receiver())));

        let _: Result<StateResponse, _> = channel.send(TabId(1), &Command::GetRecordingState).await;
        assert_eq!(channel.transport.sent.lock().unwrap().len(), 1);
    }
}
