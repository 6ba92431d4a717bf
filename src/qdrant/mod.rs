//! Qdrant vector store integration.

pub mod client;
pub mod filters;
pub mod types;

pub use client::QdrantService;
pub use filters::{CompiledFilter, Condition, ConstraintSpec, FieldCondition, FilterError, RangeOp};
pub use types::{FieldSchema, QdrantError, QdrantSettings, ScoredPoint};
