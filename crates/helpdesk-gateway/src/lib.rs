//! # Helpdesk Gateway
//! axum HTTP surface over the coordinator.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
