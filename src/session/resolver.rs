use tracing::{debug, trace};

use super::retry::{retry_transient, RetryError, RetryPolicy};
use crate::browser::{FaultKind, RuntimeFault, TabHandle, TabQuery};
use crate::error::TabError;

/// Finds the tab the user is currently looking at
pub struct TabResolver<Q> {
    query: Q,
    policy: RetryPolicy,
}

impl<Q: TabQuery> TabResolver<Q> {
    pub fn new(query: Q, policy: RetryPolicy) -> Self {
        Self { query, policy }
    }

    /// Resolve the active tab in the current window, retrying while the tab strip is busy
    pub async fn resolve_active_tab(&self) -> Result<TabHandle, TabError> {
        let result = retry_transient(
            self.policy,
            |fault: &RuntimeFault| fault.kind() == FaultKind::TabBusy,
            |attempt| {
                trace!(attempt, "querying active tab");
                self.query.query_active_tab()
            },
        )
        .await;

        match result {
            Ok(Some(tab)) => {
                debug!(tab = %tab.id, url = %tab.url, "resolved active tab");
                Ok(tab)
            }
            Ok(None) => Err(TabError::NoActiveTab),
            Err(
                RetryError::Exhausted { attempts, last: fault }
                | RetryError::Fatal {
                    attempts,
                    error: fault,
                },
            ) => Err(TabError::TabQuery {
                attempts,
                message: fault.message,
            }),
        }
    }
}
