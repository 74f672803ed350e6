//! Waiting for long-running server-side operations.
//!
//! [`TaskMonitor`] re-fetches one task on the caller's task until it is terminal.
//! [`MultiTaskTracker`] watches many tasks from a background task and surfaces the result as a
//! cancellable [`TrackingFuture`].

mod monitor;
mod timing;
mod tracker;

pub use monitor::{task_from_entity, TaskMonitor, TaskMonitorConfig};
pub use tracker::{MultiTaskTracker, TrackingFuture};
