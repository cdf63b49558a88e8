//! HTTP API for the chat relay

mod assets;
mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::turn::TurnProcessor;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<TurnProcessor>,
}

impl AppState {
    pub fn new(processor: Arc<TurnProcessor>) -> Self {
        Self { processor }
    }
}
