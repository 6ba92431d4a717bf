#![deny(missing_docs)]

//! Core library for the raglab retrieval harness.

/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Generation client abstraction and prompt assembly.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Qdrant vector store integration and filter translation.
pub mod qdrant;
/// Retrieval pipeline coordinating providers and the vector store.
pub mod retrieval;
