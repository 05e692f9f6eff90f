//! Sandbox fleet dispatching.
//!
//! The registry keeps the authoritative view of every sandbox worker, the
//! health monitor refreshes it, and the dispatcher forwards submissions to
//! the least loaded worker or parks them in the backlog until one frees up.

pub mod backlog;
pub mod dispatcher;
pub mod health_monitor;
pub mod registry;
pub mod strategies;
pub mod task_tracker;

pub use backlog::BacklogQueue;
pub use dispatcher::{DispatchOutcome, Dispatcher, DrainReport};
pub use health_monitor::{HealthMonitor, HealthTickReport};
pub use registry::FleetRegistry;
pub use strategies::{strategy_from_name, TierRankedStrategy, WorkerSelectionStrategy};
pub use task_tracker::{TaskStatusTracker, TrackerTickReport};
