//! Application state for shared services

use std::sync::Arc;

use crate::domain::notification::DispatchRecorder;
use crate::domain::rate_limit::CounterStore;
use crate::infrastructure::dispatch::DispatchService;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub dispatch_service: Arc<DispatchService>,
    pub recorder: Arc<dyn DispatchRecorder>,
    pub counter_store: Arc<dyn CounterStore>,
}

impl AppState {
    pub fn new(
        dispatch_service: Arc<DispatchService>,
        recorder: Arc<dyn DispatchRecorder>,
        counter_store: Arc<dyn CounterStore>,
    ) -> Self {
        Self {
            dispatch_service,
            recorder,
            counter_store,
        }
    }
}
