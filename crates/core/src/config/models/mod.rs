pub mod app_config;
pub mod fleet;
pub mod monitoring;
pub mod observability;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use fleet::{FleetConfig, SandboxConfig, WorkerSeed};
pub use monitoring::{BacklogConfig, DispatcherConfig, HealthMonitorConfig, TaskTrackerConfig};
pub use observability::ObservabilityConfig;
