//! # Helpdesk Agent
//! Keyword router, the three handlers, the retrieval-backed answering
//! pipeline and the coordinator that ties them together.

pub mod answering;
pub mod coordinator;
pub mod handlers;
pub mod history;
pub mod router;
pub mod scoring;

pub use answering::{Answer, AnsweringPipeline};
pub use coordinator::Coordinator;
pub use handlers::{Handler, HandlerSet};
pub use history::SessionHistories;
pub use router::Router;
