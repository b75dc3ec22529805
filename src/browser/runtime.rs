use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{MessageTransport, Page, RuntimeFault, ScriptInjector, TabHandle, TabId, TabQuery};
use crate::config::Config;
use crate::recorder::{Recorder, RecorderScope, ScopeHandle};

/// Timing and wiring of the hosting browser
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Only script file the extension package contains
    pub recorder_script: String,
    /// Time between a scope starting and its message listener accepting messages
    pub listener_attach_delay: Duration,
    /// Upper bound on one message round trip
    pub message_timeout: Duration,
}

impl From<&Config> for RuntimeOptions {
    fn from(config: &Config) -> Self {
        Self {
            recorder_script: config.recorder_script.clone(),
            listener_attach_delay: Duration::from_millis(config.listener_attach_delay_ms),
            message_timeout: Duration::from_millis(config.message_timeout_ms),
        }
    }
}

/// Requests served by the browser's event loop
enum BrowserRequest {
    QueryActiveTab {
        reply: oneshot::Sender<Result<Option<TabHandle>, RuntimeFault>>,
    },
    ExecuteScript {
        tab: TabId,
        file: String,
        reply: oneshot::Sender<Result<(), RuntimeFault>>,
    },
    Connect {
        tab: TabId,
        reply: oneshot::Sender<Result<ScopeHandle, RuntimeFault>>,
    },
    OpenTab {
        page: Page,
        reply: oneshot::Sender<TabId>,
    },
    Activate {
        tab: TabId,
        reply: oneshot::Sender<Result<(), RuntimeFault>>,
    },
    Navigate {
        tab: TabId,
        page: Page,
        reply: oneshot::Sender<Result<(), RuntimeFault>>,
    },
    CloseTab {
        tab: TabId,
        reply: oneshot::Sender<Result<(), RuntimeFault>>,
    },
    ListTabs {
        reply: oneshot::Sender<Vec<TabHandle>>,
    },
    FailNextQueries {
        messages: Vec<String>,
    },
}

struct TabState {
    page: Page,
    scope: Option<ScopeHandle>,
}

/// In-process model of the hosting browser: one window of tabs, each with its
/// own script scope. Owned by a single task and reached through [`BrowserHandle`].
pub struct BrowserRuntime {
    rx: mpsc::UnboundedReceiver<BrowserRequest>,
    options: RuntimeOptions,
    tabs: BTreeMap<TabId, TabState>,
    active: Option<TabId>,
    next_id: u32,
    query_faults: VecDeque<String>,
}

impl BrowserRuntime {
    /// Spawn the browser event loop. It stops once every handle is dropped.
    pub fn spawn(options: RuntimeOptions) -> BrowserHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let message_timeout = options.message_timeout;

        let runtime = BrowserRuntime {
            rx,
            options,
            tabs: BTreeMap::new(),
            active: None,
            next_id: 1,
            query_faults: VecDeque::new(),
        };
        tokio::spawn(runtime.run());

        BrowserHandle {
            tx,
            message_timeout,
        }
    }

    async fn run(mut self) {
        while let Some(request) = self.rx.recv().await {
            self.handle(request).await;
        }

        for (_, state) in std::mem::take(&mut self.tabs) {
            if let Some(scope) = state.scope {
                scope.unload().await;
            }
        }
        debug!("browser runtime stopped");
    }

    async fn handle(&mut self, request: BrowserRequest) {
        match request {
            BrowserRequest::QueryActiveTab { reply } => {
                let _ = reply.send(self.query_active_tab());
            }
            BrowserRequest::ExecuteScript { tab, file, reply } => {
                let _ = reply.send(self.execute_script(tab, &file));
            }
            BrowserRequest::Connect { tab, reply } => {
                let _ = reply.send(self.connect(tab));
            }
            BrowserRequest::OpenTab { page, reply } => {
                let _ = reply.send(self.open_tab(page));
            }
            BrowserRequest::Activate { tab, reply } => {
                let result = if self.tabs.contains_key(&tab) {
                    self.active = Some(tab);
                    Ok(())
                } else {
                    Err(RuntimeFault::no_tab(tab))
                };
                let _ = reply.send(result);
            }
            BrowserRequest::Navigate { tab, page, reply } => {
                let _ = reply.send(self.navigate(tab, page).await);
            }
            BrowserRequest::CloseTab { tab, reply } => {
                let _ = reply.send(self.close_tab(tab).await);
            }
            BrowserRequest::ListTabs { reply } => {
                let tabs = self
                    .tabs
                    .iter()
                    .map(|(id, state)| TabHandle {
                        id: *id,
                        active: self.active == Some(*id),
                        url: state.page.url.clone(),
                    })
                    .collect();
                let _ = reply.send(tabs);
            }
            BrowserRequest::FailNextQueries { messages } => {
                self.query_faults.extend(messages);
            }
        }
    }

    fn query_active_tab(&mut self) -> Result<Option<TabHandle>, RuntimeFault> {
        if let Some(message) = self.query_faults.pop_front() {
            return Err(RuntimeFault::new(message));
        }

        Ok(self.active.and_then(|id| {
            self.tabs.get(&id).map(|state| TabHandle {
                id,
                active: true,
                url: state.page.url.clone(),
            })
        }))
    }

    fn execute_script(&mut self, tab: TabId, file: &str) -> Result<(), RuntimeFault> {
        if file != self.options.recorder_script {
            return Err(RuntimeFault::new(format!("Could not load file: '{}'.", file)));
        }
        let attach_delay = self.options.listener_attach_delay;

        let state = self.tabs.get_mut(&tab).ok_or_else(|| RuntimeFault::no_tab(tab))?;

        if state.page.is_restricted() {
            return Err(RuntimeFault::new(format!(
                "Cannot access contents of url \"{}\". Extension manifest must request permission to access this host.",
                state.page.url
            )));
        }

        if state.scope.as_ref().is_some_and(|scope| scope.is_alive()) {
            return Err(RuntimeFault::new(
                "Uncaught SyntaxError: Identifier 'WorkflowRecorder' has already been declared",
            ));
        }

        state.scope = Some(RecorderScope::spawn(
            tab,
            Recorder::new(state.page.ready),
            attach_delay,
        ));
        debug!(tab = %tab, file, "script injected");
        Ok(())
    }

    fn connect(&self, tab: TabId) -> Result<ScopeHandle, RuntimeFault> {
        let state = self.tabs.get(&tab).ok_or_else(|| RuntimeFault::no_tab(tab))?;
        match &state.scope {
            Some(scope) if scope.is_listening() => Ok(scope.clone()),
            _ => Err(RuntimeFault::no_receiver()),
        }
    }

    fn open_tab(&mut self, page: Page) -> TabId {
        let id = TabId(self.next_id);
        self.next_id += 1;

        info!(tab = %id, url = %page.url, "tab opened");
        self.tabs.insert(id, TabState { page, scope: None });
        self.active = Some(id);
        id
    }

    async fn navigate(&mut self, tab: TabId, page: Page) -> Result<(), RuntimeFault> {
        let state = self.tabs.get_mut(&tab).ok_or_else(|| RuntimeFault::no_tab(tab))?;

        let carried = match state.scope.take() {
            Some(scope) => scope.unload().await,
            None => None,
        };

        info!(tab = %tab, url = %page.url, "tab navigated");
        state.page = page;

        if let Some(record) = carried {
            if state.page.is_restricted() {
                warn!(
                    tab = %tab,
                    session_id = %record.session_id,
                    "armed session dropped, new page cannot be scripted"
                );
            } else {
                // Resumed scope holds a live session, so it listens from the first message
                state.scope = Some(RecorderScope::spawn(
                    tab,
                    Recorder::resume(record, state.page.ready),
                    Duration::ZERO,
                ));
            }
        }

        Ok(())
    }

    async fn close_tab(&mut self, tab: TabId) -> Result<(), RuntimeFault> {
        let state = self.tabs.remove(&tab).ok_or_else(|| RuntimeFault::no_tab(tab))?;
        if let Some(scope) = state.scope {
            scope.unload().await;
        }

        if self.active == Some(tab) {
            self.active = self.tabs.keys().next_back().copied();
        }
        info!(tab = %tab, "tab closed");
        Ok(())
    }
}

/// Cloneable handle to the browser runtime, used from the popup's context
#[derive(Debug, Clone)]
pub struct BrowserHandle {
    tx: mpsc::UnboundedSender<BrowserRequest>,
    message_timeout: Duration,
}

impl std::fmt::Debug for BrowserRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BrowserRequest::QueryActiveTab { .. } => "QueryActiveTab",
            BrowserRequest::ExecuteScript { .. } => "ExecuteScript",
            BrowserRequest::Connect { .. } => "Connect",
            BrowserRequest::OpenTab { .. } => "OpenTab",
            BrowserRequest::Activate { .. } => "Activate",
            BrowserRequest::Navigate { .. } => "Navigate",
            BrowserRequest::CloseTab { .. } => "CloseTab",
            BrowserRequest::ListTabs { .. } => "ListTabs",
            BrowserRequest::FailNextQueries { .. } => "FailNextQueries",
        };
        f.write_str(name)
    }
}

impl BrowserHandle {
    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> BrowserRequest,
    ) -> Result<R, RuntimeFault> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| RuntimeFault::new("Extension context invalidated."))?;
        rx.await
            .map_err(|_| RuntimeFault::new("Extension context invalidated."))
    }

    /// Open a tab and make it the active one
    pub async fn open_tab(&self, page: Page) -> Result<TabId, RuntimeFault> {
        self.request(|reply| BrowserRequest::OpenTab { page, reply }).await
    }

    pub async fn activate(&self, tab: TabId) -> Result<(), RuntimeFault> {
        self.request(|reply| BrowserRequest::Activate { tab, reply })
            .await?
    }

    pub async fn navigate(&self, tab: TabId, page: Page) -> Result<(), RuntimeFault> {
        self.request(|reply| BrowserRequest::Navigate { tab, page, reply })
            .await?
    }

    pub async fn close_tab(&self, tab: TabId) -> Result<(), RuntimeFault> {
        self.request(|reply| BrowserRequest::CloseTab { tab, reply })
            .await?
    }

    pub async fn list_tabs(&self) -> Result<Vec<TabHandle>, RuntimeFault> {
        self.request(|reply| BrowserRequest::ListTabs { reply }).await
    }

    /// Make the next tab queries fail with these messages, one each
    pub fn fail_next_queries<I, S>(&self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let messages = messages.into_iter().map(Into::into).collect();
        let _ = self.tx.send(BrowserRequest::FailNextQueries { messages });
    }
}

#[async_trait]
impl TabQuery for BrowserHandle {
    async fn query_active_tab(&self) -> Result<Option<TabHandle>, RuntimeFault> {
        self.request(|reply| BrowserRequest::QueryActiveTab { reply })
            .await?
    }
}

#[async_trait]
impl ScriptInjector for BrowserHandle {
    async fn execute_script(&self, tab: TabId, file: &str) -> Result<(), RuntimeFault> {
        let file = file.to_string();
        self.request(|reply| BrowserRequest::ExecuteScript { tab, file, reply })
            .await?
    }
}

#[async_trait]
impl MessageTransport for BrowserHandle {
    async fn send_message(&self, tab: TabId, payload: Value) -> Result<Value, RuntimeFault> {
        let scope = self
            .request(|reply| BrowserRequest::Connect { tab, reply })
            .await??;

        match timeout(self.message_timeout, scope.deliver(payload)).await {
            Ok(result) => result,
            Err(_) => Err(RuntimeFault::new(format!(
                "Timed out after {}ms waiting for a response from tab {}",
                self.message_timeout.as_millis(),
                tab
            ))),
        }
    }
}
