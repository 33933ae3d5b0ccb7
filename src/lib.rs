// Internal modules required when compiled as a library for tests.
pub mod aggregate;
pub mod alerts;
pub mod app;
pub mod classify;
pub mod config;
pub mod export;
pub mod http;
pub mod metrics;
pub mod poller;
pub mod rolling;
pub mod source;
pub mod state;
// Re-export commonly used types for tests
pub use aggregate::{AggregationStrategy, Resolution};
pub use classify::{MetricKind, Status, ThresholdTable};
pub use config::{AppConfig, LocationConfig, LocationId};
pub use state::{DashboardSnapshot, LocationState, SharedState};
