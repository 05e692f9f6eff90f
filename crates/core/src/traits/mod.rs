pub mod repository;
pub mod sandbox_client;

pub use repository::FleetStore;
pub use sandbox_client::SandboxClient;
