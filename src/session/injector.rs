use std::time::Duration;

use tracing::debug;

use crate::browser::{FaultKind, ScriptInjector, TabId};
use crate::error::InjectionError;

/// Places the recorder script into tabs on demand
pub struct RecorderInjector<I> {
    injector: I,
    script: String,
    settle_delay: Duration,
}

impl<I: ScriptInjector> RecorderInjector<I> {
    pub fn new(injector: I, script: impl Into<String>, settle_delay: Duration) -> Self {
        Self {
            injector,
            script: script.into(),
            settle_delay,
        }
    }

    /// Make sure a recorder is resident in the tab. A recorder that is already
    /// there counts as success.
    pub async fn ensure_injected(&self, tab: TabId) -> Result<(), InjectionError> {
        let fault = match self.injector.execute_script(tab, &self.script).await {
            Ok(()) => {
                debug!(tab = %tab, script = %self.script, "recorder injected");
                return Ok(());
            }
            Err(fault) => fault,
        };

        match fault.kind() {
            FaultKind::AlreadyInjected => {
                debug!(tab = %tab, "recorder already resident");
                Ok(())
            }
            kind => Err(InjectionError {
                tab,
                restricted: kind == FaultKind::Restricted,
                message: fault.message,
            }),
        }
    }

    /// Give a fresh recorder time to attach its message listener
    pub async fn settle(&self) {
        tokio::time::sleep(self.settle_delay).await;
    }
}
