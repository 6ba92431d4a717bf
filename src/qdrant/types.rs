//! Shared types used by the Qdrant client.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Collection creation was requested for a name that already exists.
    #[error("Collection `{0}` already exists")]
    CollectionExists(String),
    /// Collection deletion was requested for a name that is not present.
    #[error("Collection `{0}` not found")]
    CollectionNotFound(String),
    /// Upsert received vectors and payloads of differing lengths.
    #[error("Vector/payload length mismatch: {vectors} vectors, {payloads} payloads")]
    PayloadMismatch {
        /// Number of vectors supplied to the upsert.
        vectors: usize,
        /// Number of payloads supplied to the upsert.
        payloads: usize,
    },
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Connection settings for the Qdrant HTTP client.
#[derive(Debug, Clone)]
pub struct QdrantSettings {
    /// Base URL of the Qdrant instance.
    pub url: String,
    /// Optional API key sent with every request.
    pub api_key: Option<String>,
}

/// Payload schema kinds accepted by field index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSchema {
    /// Exact-match string field.
    Keyword,
    /// Integer field usable in range predicates.
    Integer,
    /// Floating-point field usable in range predicates.
    Float,
    /// Boolean field.
    Bool,
    /// RFC3339 datetime field usable in range predicates.
    Datetime,
}

impl FieldSchema {
    /// Schema name understood by the Qdrant index endpoint.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Datetime => "datetime",
        }
    }
}

/// Scored payload returned by Qdrant queries.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Optional payload associated with the vector.
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResponse {
    pub(crate) result: ListCollectionsResult,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResult {
    pub(crate) collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionDescription {
    pub(crate) name: String,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
