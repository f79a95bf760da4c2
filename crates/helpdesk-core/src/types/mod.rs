//! Shared data model passed between the router, handlers and the gateway.

pub mod chat;
pub mod context;
pub mod retrieval;

pub use chat::{ChatRequest, ChatResponse, HandlerKind, HistoryTurn, Role, RoutingDecision};
pub use context::Context;
pub use retrieval::{RetrievedChunk, SourceDocument};
