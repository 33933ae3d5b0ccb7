use std::sync::Arc;

use crate::config::AppConfig;
use crate::metrics::AppMetrics;
use crate::poller::RefreshGuards;
use crate::source::ReadingSource;
use crate::state::SharedState;

/// Shared application context passed to HTTP handlers and refresh loops.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub source: Arc<dyn ReadingSource>,
    pub metrics: AppMetrics,
    pub state: SharedState,
    pub guards: RefreshGuards,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        source: Arc<dyn ReadingSource>,
        metrics: AppMetrics,
        state: SharedState,
    ) -> Self {
        Self {
            config: Arc::new(config),
            source,
            metrics,
            state,
            guards: RefreshGuards::new(),
        }
    }
}
