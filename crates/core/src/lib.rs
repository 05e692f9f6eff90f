pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
pub use events::FleetEvent;
pub use models::{
    FleetSnapshot, PopulationTier, RemoteTaskView, SandboxStatus, Submission, Task, TaskStatus,
    Worker, WorkerStatus,
};
pub use traits::{FleetStore, SandboxClient};
