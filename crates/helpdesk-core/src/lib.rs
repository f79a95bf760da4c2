//! # Helpdesk Core
//!
//! Configuration, error taxonomy, shared types and the service traits
//! every other helpdesk crate builds on.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::HelpdeskConfig;
pub use error::{HelpdeskError, Result};
