use super::{
    validate_collection_name, validate_upsert, Collection, DistanceMetric, Metadata, QueryHit,
    Record, VectorStore,
};
use crate::error::RagError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

const SCROLL_PAGE_SIZE: usize = 256;

/// Collections hosted on a remote Qdrant server.
///
/// Qdrant only accepts integer or UUID point ids, so each record id is mapped
/// to a name-based UUID and kept verbatim in the point payload.
pub struct QdrantStore {
    endpoint: String,
    client: Client,
    vector_size: usize,
    metric: DistanceMetric,
    api_key: Option<String>,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl AsRef<str>,
        vector_size: usize,
        metric: DistanceMetric,
    ) -> Result<Self, RagError> {
        let endpoint = Url::parse(endpoint.as_ref())?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(RagError::Validation(format!(
                "qdrant endpoint must be an http(s) url, got '{endpoint}'"
            )));
        }
        Ok(Self {
            endpoint: endpoint.as_str().trim_end_matches('/').to_string(),
            client: Client::new(),
            vector_size,
            metric,
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{}", self.endpoint, name)
    }

    async fn create_collection(&self, name: &str) -> Result<StatusCode, RagError> {
        let response = self
            .authorized(self.client.put(self.collection_url(name)))
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": qdrant_distance_name(self.metric),
                }
            }))
            .send()
            .await?;
        Ok(response.status())
    }

    async fn collection_names(&self) -> Result<Vec<String>, RagError> {
        let response = self
            .authorized(self.client.get(format!("{}/collections", self.endpoint)))
            .send()
            .await?;
        let parsed = checked_json(response).await?;

        Ok(parsed
            .pointer("/result/collections")
            .and_then(Value::as_array)
            .map(|collections| {
                collections
                    .iter()
                    .filter_map(|entry| entry.pointer("/name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}

async fn checked_json(response: reqwest::Response) -> Result<Value, RagError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::BackendResponse {
            backend: "qdrant".to_string(),
            details: format!("{status}: {body}"),
        });
    }
    Ok(response.json().await?)
}

pub fn point_id(record_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes())
}

fn qdrant_distance_name(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "Cosine",
        DistanceMetric::L2 => "Euclid",
        DistanceMetric::Ip => "Dot",
    }
}

fn metric_from_qdrant(name: &str) -> Option<DistanceMetric> {
    match name {
        "Cosine" => Some(DistanceMetric::Cosine),
        "Euclid" => Some(DistanceMetric::L2),
        "Dot" => Some(DistanceMetric::Ip),
        _ => None,
    }
}

/// Converts a Qdrant score into this crate's distance convention so that
/// smaller is always closer.
fn score_to_distance(metric: DistanceMetric, score: f64) -> f32 {
    let distance = match metric {
        DistanceMetric::Cosine | DistanceMetric::Ip => 1.0 - score,
        DistanceMetric::L2 => score * score,
    };
    distance as f32
}

fn parse_collection_info(name: &str, parsed: &Value) -> Result<Collection, RagError> {
    let params = parsed
        .pointer("/result/config/params/vectors")
        .ok_or_else(|| RagError::BackendResponse {
            backend: "qdrant".to_string(),
            details: format!("collection '{name}' has no vector params"),
        })?;

    let dimension = params
        .pointer("/size")
        .and_then(Value::as_u64)
        .unwrap_or_default() as usize;
    let metric = params
        .pointer("/distance")
        .and_then(Value::as_str)
        .and_then(metric_from_qdrant)
        .unwrap_or_default();

    Ok(Collection {
        name: name.to_string(),
        dimension,
        metric,
    })
}

fn payload_metadata(point: &Value) -> Metadata {
    point
        .pointer("/payload/metadata")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

fn payload_text(point: &Value, field: &str) -> String {
    point
        .pointer(&format!("/payload/{field}"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_search_hits(metric: DistanceMetric, parsed: &Value) -> Vec<QueryHit> {
    parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| QueryHit {
                    id: payload_text(hit, "record_id"),
                    distance: score_to_distance(
                        metric,
                        hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0),
                    ),
                    document: payload_text(hit, "document"),
                    metadata: payload_metadata(hit),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_scroll_points(parsed: &Value) -> (Vec<Record>, Option<Value>) {
    let records = parsed
        .pointer("/result/points")
        .and_then(Value::as_array)
        .map(|points| {
            points
                .iter()
                .map(|point| Record {
                    id: payload_text(point, "record_id"),
                    embedding: point
                        .pointer("/vector")
                        .and_then(Value::as_array)
                        .map(|values| {
                            values
                                .iter()
                                .filter_map(Value::as_f64)
                                .map(|value| value as f32)
                                .collect()
                        })
                        .unwrap_or_default(),
                    document: payload_text(point, "document"),
                    metadata: payload_metadata(point),
                })
                .collect()
        })
        .unwrap_or_default();

    let next = parsed
        .pointer("/result/next_page_offset")
        .filter(|offset| !offset.is_null())
        .cloned();

    (records, next)
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<Collection, RagError> {
        validate_collection_name(name)?;
        if let Some(existing) = self.get_collection(name).await? {
            debug!(collection = name, "collection retrieved");
            return Ok(existing);
        }

        let status = self.create_collection(name).await?;
        if status.is_success() {
            info!(collection = name, dimension = self.vector_size, "created collection");
        } else if status != StatusCode::CONFLICT {
            return Err(RagError::StoreUnavailable(format!(
                "qdrant refused to create collection '{name}': {status}"
            )));
        }

        self.get_collection(name).await?.ok_or_else(|| {
            RagError::StoreUnavailable(format!("collection '{name}' missing after creation"))
        })
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>, RagError> {
        let response = self
            .authorized(self.client.get(self.collection_url(name)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let parsed = checked_json(response).await?;
        parse_collection_info(name, &parsed).map(Some)
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, RagError> {
        let mut names = self.collection_names().await?;
        names.sort_unstable();

        let mut collections = Vec::with_capacity(names.len());
        for name in names {
            if let Some(collection) = self.get_collection(&name).await? {
                collections.push(collection);
            }
        }
        Ok(collections)
    }

    async fn upsert(
        &self,
        collection: &Collection,
        ids: &[String],
        embeddings: &[Vec<f32>],
        documents: &[String],
        metadatas: &[Metadata],
    ) -> Result<(), RagError> {
        validate_upsert(collection, ids, embeddings, documents, metadatas)?;
        if ids.is_empty() {
            return Ok(());
        }

        let points: Vec<Value> = ids
            .iter()
            .zip(embeddings)
            .zip(documents)
            .zip(metadatas)
            .map(|(((id, embedding), document), metadata)| {
                json!({
                    "id": point_id(id).to_string(),
                    "vector": embedding,
                    "payload": {
                        "record_id": id,
                        "document": document,
                        "metadata": metadata,
                    },
                })
            })
            .collect();

        let response = self
            .authorized(self.client.put(format!(
                "{}/points?wait=true",
                self.collection_url(&collection.name)
            )))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        checked_json(response).await?;

        info!(collection = %collection.name, upserted = ids.len(), "records upserted");
        Ok(())
    }

    async fn query(
        &self,
        collection: &Collection,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<QueryHit>, RagError> {
        if vector.len() != collection.dimension {
            return Err(RagError::Validation(format!(
                "query vector dim {} is not {}",
                vector.len(),
                collection.dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .authorized(self.client.post(format!(
                "{}/points/search",
                self.collection_url(&collection.name)
            )))
            .json(&json!({
                "vector": vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;
        let parsed = checked_json(response).await?;

        Ok(parse_search_hits(collection.metric, &parsed))
    }

    async fn get_all(&self, collection: &Collection) -> Result<Vec<Record>, RagError> {
        let mut records = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE_SIZE,
                "with_payload": true,
                "with_vector": true,
            });
            if let Some(next) = offset.take() {
                body["offset"] = next;
            }

            let response = self
                .authorized(self.client.post(format!(
                    "{}/points/scroll",
                    self.collection_url(&collection.name)
                )))
                .json(&body)
                .send()
                .await?;
            let parsed = checked_json(response).await?;

            let (page, next) = parse_scroll_points(&parsed);
            records.extend(page);
            match next {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(records)
    }

    async fn delete_collection(&self, name: &str) -> Result<(), RagError> {
        let response = self
            .authorized(self.client.delete(self.collection_url(name)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(collection = name, "collection does not exist, nothing to delete");
            return Ok(());
        }

        let parsed = checked_json(response).await?;
        if parsed.pointer("/result").and_then(Value::as_bool) == Some(false) {
            warn!(collection = name, "collection does not exist, nothing to delete");
        } else {
            info!(collection = name, "deleted collection");
        }
        Ok(())
    }

    async fn delete_all_collections(&self) -> Result<(), RagError> {
        let names = self.collection_names().await?;
        for name in &names {
            self.delete_collection(name).await?;
        }
        info!(count = names.len(), "all collections deleted");
        Ok(())
    }
}
