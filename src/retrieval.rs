//! Retrieval pipeline coordinating embedding, filtered search, and generation.

use crate::{
    embedding::{EmbeddingClient, EmbeddingClientError},
    generation::{GenerationClient, GenerationClientError, build_prompt},
    qdrant::{ConstraintSpec, FieldSchema, QdrantError, QdrantService},
};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors emitted while orchestrating the retrieval pipeline.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Generation provider failed to produce an answer.
    #[error("Failed to generate answer: {0}")]
    Generation(#[from] GenerationClientError),
    /// Qdrant interaction failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// No generation provider is configured.
    #[error("No generation provider configured")]
    GenerationUnavailable,
    /// Vector and payload counts supplied for indexing differ.
    #[error("Text/payload length mismatch: {texts} texts, {payloads} payloads")]
    InputMismatch {
        /// Number of texts supplied.
        texts: usize,
        /// Number of payloads supplied.
        payloads: usize,
    },
}

/// Structured search hit returned to harness consumers.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Identifier assigned by Qdrant.
    pub id: String,
    /// Similarity score reported by Qdrant.
    pub score: f32,
    /// Stored payload, if available.
    pub payload: Option<Map<String, Value>>,
}

/// Generated answer together with the hits that supplied its context.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Text produced by the generation provider.
    pub text: String,
    /// Hits whose payload text fed the prompt.
    pub hits: Vec<SearchHit>,
}

/// Coordinates embedding, filtered search, and generation over injected providers.
///
/// The service owns its provider handles; construct it once near process
/// start with the clients the run should use. Tests substitute offline or
/// mock-backed clients through the same constructor.
pub struct RetrievalService {
    embedding: Box<dyn EmbeddingClient>,
    generation: Option<Box<dyn GenerationClient>>,
    qdrant: QdrantService,
}

impl RetrievalService {
    /// Build a new retrieval service from explicit components.
    pub fn new(
        embedding: Box<dyn EmbeddingClient>,
        generation: Option<Box<dyn GenerationClient>>,
        qdrant: QdrantService,
    ) -> Self {
        Self {
            embedding,
            generation,
            qdrant,
        }
    }

    /// Create the collection when missing, sized to the embedding dimension.
    pub async fn ensure_collection(&self, collection_name: &str) -> Result<(), RetrievalError> {
        let vector_size = self.embedding.dimension() as u64;
        match self.qdrant.create_collection(collection_name, vector_size).await {
            Ok(()) => {
                tracing::info!(collection = collection_name, vector_size, "Collection created");
                Ok(())
            }
            Err(QdrantError::CollectionExists(_)) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// Enumerate collections managed by the storage backend.
    pub async fn list_collections(&self) -> Result<Vec<String>, RetrievalError> {
        self.qdrant
            .list_collections()
            .await
            .map_err(RetrievalError::from)
    }

    /// Delete a collection.
    pub async fn delete_collection(&self, collection_name: &str) -> Result<(), RetrievalError> {
        self.qdrant
            .delete_collection(collection_name)
            .await
            .map_err(RetrievalError::from)
    }

    /// Create a payload field index so the field can be filtered efficiently.
    pub async fn create_field_index(
        &self,
        collection_name: &str,
        field: &str,
        schema: FieldSchema,
    ) -> Result<(), RetrievalError> {
        self.qdrant
            .create_field_index(collection_name, field, schema)
            .await
            .map_err(RetrievalError::from)
    }

    /// Embed the supplied texts and upsert them with their payloads.
    ///
    /// Texts and payloads are paired positionally; returns the number of
    /// points written.
    pub async fn index_texts(
        &self,
        collection_name: &str,
        texts: Vec<String>,
        payloads: Vec<Map<String, Value>>,
    ) -> Result<usize, RetrievalError> {
        if texts.len() != payloads.len() {
            return Err(RetrievalError::InputMismatch {
                texts: texts.len(),
                payloads: payloads.len(),
            });
        }
        if texts.is_empty() {
            return Ok(0);
        }

        let count = texts.len();
        let vectors = self.embedding.embed_many(texts).await?;
        self.qdrant
            .upsert_points(collection_name, vectors, payloads)
            .await?;
        tracing::info!(collection = collection_name, points = count, "Texts indexed");
        Ok(count)
    }

    /// Embed the query and run a filtered similarity search.
    pub async fn search(
        &self,
        collection_name: &str,
        query: &str,
        max_results: usize,
        spec: Option<&ConstraintSpec>,
    ) -> Result<Vec<SearchHit>, RetrievalError> {
        let vector = self.embedding.embed_one(query).await?;
        let filter = spec.map(ConstraintSpec::compile);
        let points = self
            .qdrant
            .search_points(collection_name, vector, max_results, filter)
            .await?;
        tracing::debug!(
            collection = collection_name,
            hits = points.len(),
            "Search completed"
        );
        Ok(points
            .into_iter()
            .map(|point| SearchHit {
                id: point.id,
                score: point.score,
                payload: point.payload,
            })
            .collect())
    }

    /// Answer a question over retrieved context.
    ///
    /// Joins the `text` field of each hit's payload into the prompt context;
    /// hits without a text field contribute nothing.
    pub async fn answer(
        &self,
        collection_name: &str,
        question: &str,
        max_results: usize,
        spec: Option<&ConstraintSpec>,
    ) -> Result<Answer, RetrievalError> {
        let generation = self
            .generation
            .as_ref()
            .ok_or(RetrievalError::GenerationUnavailable)?;

        let hits = self
            .search(collection_name, question, max_results, spec)
            .await?;
        let context = hits
            .iter()
            .filter_map(|hit| {
                hit.payload
                    .as_ref()
                    .and_then(|payload| payload.get("text"))
                    .and_then(Value::as_str)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = build_prompt(&context, question);
        let text = generation.generate_answer(&prompt).await?;
        Ok(Answer { text, hits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::OfflineEmbeddingClient;
    use crate::qdrant::QdrantSettings;
    use async_trait::async_trait;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    struct EchoGeneration;

    #[async_trait]
    impl GenerationClient for EchoGeneration {
        async fn generate_answer(&self, prompt: &str) -> Result<String, GenerationClientError> {
            Ok(format!("echo: {prompt}"))
        }
    }

    fn service_for(server: &MockServer, generation: Option<Box<dyn GenerationClient>>) -> RetrievalService {
        let qdrant = QdrantService::new(&QdrantSettings {
            url: server.base_url(),
            api_key: None,
        })
        .expect("qdrant client");
        RetrievalService::new(Box::new(OfflineEmbeddingClient::new(4)), generation, qdrant)
    }

    #[tokio::test]
    async fn index_texts_rejects_mismatched_input() {
        let server = MockServer::start_async().await;
        let service = service_for(&server, None);

        let error = service
            .index_texts("demo", vec!["one".into()], Vec::new())
            .await
            .expect_err("mismatched input");
        assert!(matches!(
            error,
            RetrievalError::InputMismatch {
                texts: 1,
                payloads: 0
            }
        ));
    }

    #[tokio::test]
    async fn answer_requires_a_generation_provider() {
        let server = MockServer::start_async().await;
        let service = service_for(&server, None);

        let error = service
            .answer("demo", "question", 5, None)
            .await
            .expect_err("no generation provider");
        assert!(matches!(error, RetrievalError::GenerationUnavailable));
    }

    #[tokio::test]
    async fn answer_feeds_hit_text_into_the_prompt() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/demo/points/query");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": [
                        {
                            "id": "a",
                            "score": 0.9,
                            "payload": { "text": "Paris is the capital of France." }
                        },
                        {
                            "id": "b",
                            "score": 0.7,
                            "payload": { "location": "no text field" }
                        }
                    ]
                }));
            })
            .await;

        let service = service_for(&server, Some(Box::new(EchoGeneration)));
        let answer = service
            .answer("demo", "What is the capital of France?", 5, None)
            .await
            .expect("answer");

        assert!(answer.text.contains("Paris is the capital of France."));
        assert!(answer.text.contains("What is the capital of France?"));
        assert_eq!(answer.hits.len(), 2);
    }
}
