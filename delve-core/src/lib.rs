//! Delve Core - shared infrastructure for the delve research engine
//!
//! Error types, logging, configuration I/O and async helpers used by every delve crate

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
