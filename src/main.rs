use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

mod actions;
mod app;
mod browser;
mod config;
mod error;
mod messaging;
mod recorder;
mod session;

use actions::Action;
use app::App;
use browser::{BrowserHandle, BrowserRuntime, Page, RuntimeOptions, TabQuery};
use config::Config;
use session::BrowserCoordinator;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let _ = input_tx.send(Action::Input(line));
                }
                Ok(None) | Err(_) => {
                    let _ = input_tx.send(Action::Quit);
                    break;
                }
            }
        }
    });

    // Start the browser with one ordinary page open
    let browser = BrowserRuntime::spawn(RuntimeOptions::from(&config));
    browser
        .open_tab(Page::new("https://example.com/"))
        .await
        .context("Failed to open initial tab")?;

    let coordinator = BrowserCoordinator::for_browser(browser.clone(), &config);

    // Create app state
    let mut app = App::new();
    println!("{}", app::HELP);

    // Main event loop
    loop {
        // Pending actions run one at a time, so start and stop never overlap
        let pending = app.take_pending_actions();
        let ran_any = !pending.is_empty();
        for pending_action in pending {
            run_action(pending_action, &mut app, &coordinator, &browser).await;
        }
        if ran_any || app.message.is_some() {
            println!("{}", app.status_line());
        }

        match rx.recv().await {
            Some(action) => match app.handle_action(action) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            },
            None => break Ok(()),
        }
    }
}

async fn run_action(
    action: Action,
    app: &mut App,
    coordinator: &BrowserCoordinator,
    browser: &BrowserHandle,
) {
    match action {
        Action::StartRecording => match coordinator.start().await {
            Ok(outcome) => app.apply_started(&outcome),
            Err(e) => app.apply_error(&e),
        },
        Action::StopRecording => match coordinator.stop().await {
            Ok(_) => app.apply_stopped(),
            Err(e) => {
                app.apply_error(&e);
                // Outcome is ambiguous after a failed stop
                let state = coordinator.query_state().await;
                app.apply_state(state);
            }
        },
        Action::RefreshState => {
            let state = coordinator.query_state().await;
            app.apply_state(state);
        }
        Action::OpenTab { url, loading } => {
            let page = if loading { Page::loading(url) } else { Page::new(url) };
            match browser.open_tab(page).await {
                Ok(id) => app.message = Some(format!("Opened tab {}", id)),
                Err(e) => app.message = Some(format!("Failed to open tab: {}", e)),
            }
            app.apply_state(coordinator.query_state().await);
        }
        Action::SwitchTab(id) => {
            if let Err(e) = browser.activate(id).await {
                app.message = Some(format!("Failed to switch: {}", e));
            }
            app.apply_state(coordinator.query_state().await);
        }
        Action::Navigate { url, loading } => {
            let page = if loading { Page::loading(url) } else { Page::new(url) };
            let result = match browser.query_active_tab().await {
                Ok(Some(tab)) => browser.navigate(tab.id, page).await,
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                app.message = Some(format!("Failed to navigate: {}", e));
            }
            app.apply_state(coordinator.query_state().await);
        }
        Action::CloseTab => {
            if let Ok(Some(tab)) = browser.query_active_tab().await {
                if let Err(e) = browser.close_tab(tab.id).await {
                    app.message = Some(format!("Failed to close: {}", e));
                }
            }
            app.apply_state(coordinator.query_state().await);
        }
        Action::ListTabs => match browser.list_tabs().await {
            Ok(tabs) => {
                for tab in tabs {
                    let marker = if tab.active { "*" } else { " " };
                    println!("{} {:>3}  {}", marker, tab.id.0, tab.url);
                }
            }
            Err(e) => app.message = Some(format!("Failed to list tabs: {}", e)),
        },
        Action::SimulateBusy(count) => {
            browser.fail_next_queries(
                (0..count).map(|_| "Tabs cannot be queried right now (user may be dragging a tab)."),
            );
            app.message = Some(format!("Next {} tab queries will report busy", count));
        }
        Action::Input(_) | Action::FocusGained | Action::Quit => {}
    }
}
