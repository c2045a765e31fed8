//! Adaptive polling of long-running task status.

mod http;
mod monitor;
mod schedule;

pub use http::HttpStatusQuery;
pub use monitor::{
    MonitorOptions, MonitorStopper, ProgressSubscription, StatusQuery, TaskProgressMonitor,
};
pub use schedule::Backoff;
