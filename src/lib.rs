//! Retrieval-augmented chat backend over a local knowledge base.

pub mod core;
pub mod history;
pub mod llm;
pub mod rag;
pub mod server;
pub mod settings;
pub mod state;
pub mod vector_math;
