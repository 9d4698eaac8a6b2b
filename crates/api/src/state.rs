//! Shared application state for the Axum API server.

use chexmix_common::config::AppConfig;
use chexmix_engine::scheduler::Scheduler;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(scheduler: Scheduler, config: AppConfig) -> Self {
        Self { scheduler, config }
    }
}
