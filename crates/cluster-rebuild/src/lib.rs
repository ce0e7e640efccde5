//! Leader-driven rebuild coordination (§4.2-§4.4): the leader-side task
//! queue and driver, the target-side scan/report driver, and the
//! pool-map-change glue that turns a topology transition into a
//! scheduled task.
//!
//! The wire format and the RPC/pool-map/IV-tree collaborators this crate
//! invokes through live in `cluster-rpc`; the pure progress-tracking data
//! model lives in `cluster-types`. This crate owns the concurrency:
//! locking, task spawning, and the completion signals a waiter blocks on.

pub mod completion;
pub mod config;
pub mod coordinator;
pub mod poolmap_glue;
pub mod queue;
pub mod target;
pub mod tracker;

#[cfg(test)]
mod test_support;

pub use completion::{CompletedTask, CompletionLog, QueryResult};
pub use config::RebuildConfig;
pub use coordinator::RebuildCoordinator;
pub use poolmap_glue::reconcile_pool_map;
pub use target::TargetDriver;
