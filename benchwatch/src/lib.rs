//! benchwatch: subscribe to benchmark agents over SSE and compare them side by side.

pub mod aggregator;
pub mod app;
pub mod error;
pub mod history;
pub mod metric;
pub mod sources;
pub mod stream;
pub mod types;
pub mod ui;

pub use aggregator::{RollingAggregator, SubscriptionHandle};
pub use metric::Metric;
pub use types::{Point, Sample};
