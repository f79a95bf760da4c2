//! Seams to the external black-box services.

pub mod embedder;
pub mod generator;

pub use embedder::Embedder;
pub use generator::{GenerateParams, Generator};
