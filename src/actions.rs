use crate::browser::TabId;

/// Actions that can be dispatched through the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A line was entered on the console
    Input(String),
    /// The popup window regained focus
    FocusGained,
    /// Request to quit the application
    Quit,
    /// Start recording in the active tab
    StartRecording,
    /// Stop recording in the active tab
    StopRecording,
    /// Re-query the active tab's recording state
    RefreshState,
    /// Open a tab and make it active
    OpenTab { url: String, loading: bool },
    /// Switch to another tab
    SwitchTab(TabId),
    /// Navigate the active tab
    Navigate { url: String, loading: bool },
    /// Close the active tab
    CloseTab,
    /// List open tabs
    ListTabs,
    /// Make the next tab queries fail as if the tab strip were busy
    SimulateBusy(u32),
}
