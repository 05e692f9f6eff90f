//! # Fleet Testing Utils
//!
//! Shared testing utilities for the sandbox fleet coordinator.
//!
//! - **Mock Store**: in-memory `FleetStore` with outage injection
//! - **Mock Sandbox Client**: scripted worker responses with call recording
//! - **Test Data Builders**: workers, submissions and tasks with sensible defaults
//! - **Helpers**: waiting on asynchronous conditions
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! fleet-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use helpers::*;
pub use mocks::*;
