use httpmock::{
    Method::{DELETE, GET, POST, PUT},
    MockServer,
};
use raglab::{
    embedding::OfflineEmbeddingClient,
    qdrant::{Condition, ConstraintSpec, QdrantService, QdrantSettings, RangeOp},
    retrieval::RetrievalService,
};
use serde_json::{Map, Value, json};

const COLLECTION: &str = "test_collection";
const DIMENSION: usize = 384;

fn city_payloads() -> Vec<Map<String, Value>> {
    [
        json!({ "location": "london", "score": 45 }),
        json!({ "location": "Los Angeles", "score": 100 }),
        json!({ "location": "Chicago", "score": 78 }),
        json!({ "location": "San Diego", "score": 89 }),
        json!({ "location": "San Francisco", "score": 60 }),
    ]
    .into_iter()
    .map(|value| value.as_object().expect("payload object").clone())
    .collect()
}

fn city_texts() -> Vec<String> {
    city_payloads()
        .iter()
        .map(|payload| format!("notes about {}", payload["location"].as_str().unwrap()))
        .collect()
}

fn harness(server: &MockServer) -> RetrievalService {
    let qdrant = QdrantService::new(&QdrantSettings {
        url: server.base_url(),
        api_key: None,
    })
    .expect("qdrant client");
    RetrievalService::new(
        Box::new(OfflineEmbeddingClient::new(DIMENSION)),
        None,
        qdrant,
    )
}

#[tokio::test]
async fn harness_flow_indexes_and_searches() {
    let server = MockServer::start_async().await;

    let existence = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/collections/{COLLECTION}"));
            then.status(404);
        })
        .await;
    let create = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path(format!("/collections/{COLLECTION}"))
                .json_body_partial(
                    json!({
                        "vectors": { "size": DIMENSION, "distance": "Cosine" }
                    })
                    .to_string(),
                );
            then.status(200).json_body(json!({ "result": true }));
        })
        .await;
    let list = server
        .mock_async(|when, then| {
            when.method(GET).path("/collections");
            then.status(200).json_body(json!({
                "result": {
                    "collections": [ { "name": COLLECTION } ]
                }
            }));
        })
        .await;
    let upsert = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path(format!("/collections/{COLLECTION}/points"))
                .matches(|req| {
                    let body: Value =
                        serde_json::from_slice(req.body.as_deref().unwrap_or_default())
                            .unwrap_or(Value::Null);
                    let points = body["points"].as_array().cloned().unwrap_or_default();
                    points.len() == 5
                        && points
                            .iter()
                            .all(|point| point["vector"].as_array().is_some_and(|v| v.len() == DIMENSION))
                });
            then.status(200).json_body(json!({ "result": {} }));
        })
        .await;
    let search = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(format!("/collections/{COLLECTION}/points/query"))
                .json_body_partial(
                    json!({
                        "filter": {
                            "must": [
                                { "key": "location", "match": { "value": "San Francisco" } }
                            ],
                            "should": [
                                { "key": "score", "range": { "gt": 50 } }
                            ]
                        }
                    })
                    .to_string(),
                );
            then.status(200).json_body(json!({
                "status": "ok",
                "time": 0.0,
                "result": [
                    {
                        "id": "5b3f8c1e-0000-0000-0000-000000000001",
                        "score": 0.87,
                        "payload": { "location": "San Francisco", "score": 60 }
                    }
                ]
            }));
        })
        .await;

    let service = harness(&server);

    service
        .ensure_collection(COLLECTION)
        .await
        .expect("collection creation");
    existence.assert();
    create.assert();

    let collections = service.list_collections().await.expect("collection list");
    assert!(collections.contains(&COLLECTION.to_string()), "{collections:?}");
    list.assert();

    let indexed = service
        .index_texts(COLLECTION, city_texts(), city_payloads())
        .await
        .expect("indexing");
    assert_eq!(indexed, 5);
    upsert.assert();

    let spec = ConstraintSpec::new()
        .must("location", Condition::Equals(json!("San Francisco")))
        .should("score", Condition::Range(RangeOp::Gt, json!(50)));
    let hits = service
        .search(COLLECTION, "city by the bay", 5, Some(&spec))
        .await
        .expect("search");
    search.assert();

    assert_eq!(hits.len(), 1);
    let payload = hits[0].payload.as_ref().expect("payload");
    assert_eq!(payload["location"], json!("San Francisco"));
    assert_eq!(payload["score"], json!(60));
}

#[tokio::test]
async fn harness_flow_deletes_collection() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/collections/{COLLECTION}"));
            then.status(200).json_body(json!({ "result": {} }));
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path(format!("/collections/{COLLECTION}"));
            then.status(200).json_body(json!({ "result": true }));
        })
        .await;

    let service = harness(&server);
    service
        .delete_collection(COLLECTION)
        .await
        .expect("collection deletion");
    delete.assert();
}

#[tokio::test]
#[ignore = "Requires live Qdrant"]
async fn live_qdrant_roundtrip() {
    let url =
        std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6333".to_string());
    let qdrant = QdrantService::new(&QdrantSettings { url, api_key: None }).expect("qdrant client");
    let service = RetrievalService::new(
        Box::new(OfflineEmbeddingClient::new(DIMENSION)),
        None,
        qdrant,
    );

    service
        .ensure_collection(COLLECTION)
        .await
        .expect("collection creation");
    let collections = service.list_collections().await.expect("collection list");
    assert!(collections.contains(&COLLECTION.to_string()), "{collections:?}");

    service
        .index_texts(COLLECTION, city_texts(), city_payloads())
        .await
        .expect("indexing");

    let spec = ConstraintSpec::new().must("location", Condition::Equals(json!("San Francisco")));
    let hits = service
        .search(COLLECTION, "city by the bay", 5, Some(&spec))
        .await
        .expect("search");
    assert!(
        hits.iter().all(|hit| {
            hit.payload
                .as_ref()
                .and_then(|payload| payload.get("location"))
                .is_some_and(|location| location == &json!("San Francisco"))
        }),
        "{hits:?}"
    );

    service
        .delete_collection(COLLECTION)
        .await
        .expect("collection deletion");
}
