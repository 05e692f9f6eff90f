pub mod memory_store;
pub mod observability;
pub mod sandbox_client;

pub use memory_store::InMemoryFleetStore;
pub use observability::*;
pub use sandbox_client::HttpSandboxClient;
