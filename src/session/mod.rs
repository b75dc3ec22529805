mod coordinator;
mod injector;
mod resolver;
mod retry;

pub use coordinator::{BrowserCoordinator, StartOutcome, StateView};
pub use retry::RetryPolicy;
