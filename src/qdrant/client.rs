//! HTTP client wrapper for interacting with Qdrant.

use crate::config::Config;
use crate::qdrant::{
    filters::CompiledFilter,
    types::{
        FieldSchema, ListCollectionsResponse, QdrantError, QdrantSettings, QueryResponse,
        QueryResponseResult, ScoredPoint,
    },
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};
use uuid::Uuid;

/// Lightweight HTTP client for Qdrant operations.
///
/// Constructed from explicit [`QdrantSettings`] so callers control the
/// connection lifetime and tests can point it at a mock server.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl QdrantService {
    /// Construct a new client from explicit connection settings.
    pub fn new(settings: &QdrantSettings) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("raglab/0.2").build()?;

        let base_url = normalize_base_url(&settings.url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = %settings
                .api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: settings.api_key.clone(),
        })
    }

    /// Construct a client from loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, QdrantError> {
        Self::new(&QdrantSettings {
            url: config.qdrant_url.clone(),
            api_key: config.qdrant_api_key.clone(),
        })
    }

    /// Create a collection with the specified vector size and cosine distance.
    ///
    /// Fails with [`QdrantError::CollectionExists`] when the name is taken.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        vector_size: u64,
    ) -> Result<(), QdrantError> {
        if self.collection_exists(collection_name).await? {
            return Err(QdrantError::CollectionExists(collection_name.to_string()));
        }

        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, vector_size, "Collection created");
        })
        .await
    }

    /// Delete a collection.
    ///
    /// Fails with [`QdrantError::CollectionNotFound`] when the name is absent.
    pub async fn delete_collection(&self, collection_name: &str) -> Result<(), QdrantError> {
        if !self.collection_exists(collection_name).await? {
            return Err(QdrantError::CollectionNotFound(collection_name.to_string()));
        }

        let response = self
            .request(Method::DELETE, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = collection_name, "Collection deleted");
        })
        .await
    }

    /// Retrieve the names of all collections present in Qdrant.
    pub async fn list_collections(&self) -> Result<Vec<String>, QdrantError> {
        let response = self.request(Method::GET, "collections")?.send().await?;

        if response.status().is_success() {
            let payload: ListCollectionsResponse = response.json().await?;
            let names = payload
                .result
                .collections
                .into_iter()
                .map(|collection| collection.name)
                .collect();
            Ok(names)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to list collections");
            Err(error)
        }
    }

    /// Upload vectors with their payloads, paired positionally.
    ///
    /// Each point receives a fresh UUID identifier. Fails with
    /// [`QdrantError::PayloadMismatch`] when the two sequences differ in length.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        vectors: Vec<Vec<f32>>,
        payloads: Vec<Map<String, Value>>,
    ) -> Result<(), QdrantError> {
        if vectors.len() != payloads.len() {
            return Err(QdrantError::PayloadMismatch {
                vectors: vectors.len(),
                payloads: payloads.len(),
            });
        }
        if vectors.is_empty() {
            return Ok(());
        }

        let points: Vec<_> = vectors
            .into_iter()
            .zip(payloads)
            .map(|(vector, payload)| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": vector,
                    "payload": payload,
                })
            })
            .collect();

        let point_count = points.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = collection_name,
                points = point_count,
                "Points upserted"
            );
        })
        .await
    }

    /// Create a payload field index so the field can be filtered efficiently.
    ///
    /// An index that already exists (HTTP 409) counts as success; any other
    /// failure is surfaced to the caller.
    pub async fn create_field_index(
        &self,
        collection_name: &str,
        field: &str,
        schema: FieldSchema,
    ) -> Result<(), QdrantError> {
        let body = json!({
            "field_name": field,
            "field_schema": schema.as_str(),
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}/index"))?
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::debug!(
                collection = collection_name,
                field,
                schema = schema.as_str(),
                "Field index created"
            );
            Ok(())
        } else if response.status() == StatusCode::CONFLICT {
            tracing::debug!(
                collection = collection_name,
                field,
                schema = schema.as_str(),
                "Field index already exists"
            );
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, field, error = %error, "Failed to create field index");
            Err(error)
        }
    }

    /// Perform a similarity search against a collection, returning scored payloads.
    pub async fn search_points(
        &self,
        collection_name: &str,
        vector: Vec<f32>,
        max_results: usize,
        filter: Option<CompiledFilter>,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let mut body = json!({
            "query": vector,
            "limit": max_results,
            "with_payload": true,
        });

        if let Some(filter_value) = filter.and_then(CompiledFilter::into_value) {
            body.as_object_mut()
                .expect("query body should remain an object")
                .insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{collection_name}/points/query"),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = collection_name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        let results = points
            .into_iter()
            .map(|point| ScoredPoint {
                id: stringify_point_id(point.id),
                score: point.score,
                payload: point.payload,
            })
            .collect();

        Ok(results)
    }

    async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, QdrantError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Object(map) => map
            .get("uuid")
            .map(|value| match value {
                Value::String(uuid) => uuid.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
