pub mod fleet;
pub mod sandbox;
pub mod submission;
pub mod task;
pub mod worker;

pub use fleet::FleetSnapshot;
pub use sandbox::{RemoteTaskView, SandboxStatus, SubmitResponse, TaskCounts, TaskViewResponse};
pub use submission::Submission;
pub use task::{Task, TaskStatus};
pub use worker::{PopulationTier, Worker, WorkerStatus, TASK_LOW_COUNT, TASK_MEDIUM_COUNT};
