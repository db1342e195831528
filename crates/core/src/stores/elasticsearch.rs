use crate::config::SearchStoreConfig;
use crate::models::{ChunkMetadata, IndexedDocument, RetrievalResult};
use crate::traits::{BulkFailure, BulkOutcome, DocumentIndex};
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use url::Url;

const BACKEND: &str = "elasticsearch";

pub struct ElasticsearchStore {
    client: Client,
    endpoint: String,
    username: String,
    password: Option<String>,
}

impl ElasticsearchStore {
    pub fn new(config: &SearchStoreConfig) -> Result<Self, SearchError> {
        let endpoint = Url::parse(&config.url)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.as_str().trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.password {
            Some(password) => request.basic_auth(&self.username, Some(password)),
            None => request,
        }
    }

    async fn checked(&self, response: Response, action: &str) -> Result<Value, SearchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{action} failed with {status}: {body}"),
            });
        }
        Ok(response.json().await?)
    }
}

/// Mapping shared by every knowledge-base index.
pub fn index_mapping(dimensions: usize) -> Value {
    json!({
        "mappings": {
            "properties": {
                "content": {"type": "text"},
                "vector": {
                    "type": "dense_vector",
                    "dims": dimensions
                },
                "metadata": {
                    "properties": {
                        "file_name": {"type": "keyword", "ignore_above": 256},
                        "source": {"type": "keyword"},
                        "page": {"type": "keyword"},
                        "chunk_header": {"type": "keyword", "ignore_above": 1024},
                        "img_url": {"type": "keyword", "ignore_above": 2048}
                    }
                }
            }
        }
    })
}

/// Vector similarity shifted to be non-negative plus the BM25 score. The
/// match clause is optional so vector-only matches still rank.
pub fn hybrid_query(query: &str, query_vector: &[f32], size: usize) -> Value {
    json!({
        "size": size,
        "query": {
            "script_score": {
                "query": {
                    "bool": {
                        "filter": [{"match_all": {}}],
                        "should": [{"match": {"content": query}}]
                    }
                },
                "script": {
                    "source": "cosineSimilarity(params.query_vector, 'vector') + 1.0 + _score",
                    "params": {"query_vector": query_vector}
                }
            }
        }
    })
}

pub fn bulk_payload(index: &str, documents: &[(String, IndexedDocument)]) -> Result<String, SearchError> {
    let mut lines = Vec::with_capacity(documents.len() * 2);
    for (id, document) in documents {
        lines.push(serde_json::to_string(&json!({
            "index": {"_index": index, "_id": id}
        }))?);
        lines.push(serde_json::to_string(document)?);
    }
    Ok(lines.join("\n") + "\n")
}

pub fn parse_bulk_response(response: &Value) -> BulkOutcome {
    let items = response
        .pointer("/items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut outcome = BulkOutcome::default();
    for item in items {
        let action = item.get("index").cloned().unwrap_or(Value::Null);
        match action.get("error") {
            Some(error) if !error.is_null() => outcome.failures.push(BulkFailure {
                id: action
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                reason: error
                    .pointer("/reason")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
            }),
            _ => outcome.indexed += 1,
        }
    }
    outcome
}

pub fn parse_hits(response: &Value, index: &str) -> Vec<RetrievalResult> {
    let hits = response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.into_iter()
        .map(|raw| {
            let source = raw.get("_source").cloned().unwrap_or(Value::Null);
            let metadata = source
                .get("metadata")
                .cloned()
                .and_then(|value| serde_json::from_value::<ChunkMetadata>(value).ok())
                .unwrap_or_default();

            RetrievalResult {
                id: raw
                    .pointer("/_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                content: source
                    .get("content")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                score: raw.pointer("/_score").and_then(Value::as_f64).unwrap_or(0.0),
                metadata,
                index_name: index.to_string(),
            }
        })
        .collect()
}

#[async_trait]
impl DocumentIndex for ElasticsearchStore {
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        let response = self
            .authorize(self.client.head(self.url(index)))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("index exists check returned {status}"),
            }),
        }
    }

    async fn create_index(&self, index: &str, dimensions: usize) -> Result<(), SearchError> {
        let response = self
            .authorize(self.client.put(self.url(index)))
            .json(&index_mapping(dimensions))
            .send()
            .await?;

        self.checked(response, "index creation").await.map(|_| ())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        let response = self
            .authorize(self.client.delete(self.url(index)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.checked(response, "index deletion").await.map(|_| ())
    }

    async fn count(&self, index: &str) -> Result<u64, SearchError> {
        let response = self
            .authorize(self.client.get(self.url(&format!("{index}/_count"))))
            .send()
            .await?;

        let body = self.checked(response, "count").await?;
        body.pointer("/count")
            .and_then(Value::as_u64)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "count response has no count".to_string(),
            })
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: &[(String, IndexedDocument)],
    ) -> Result<BulkOutcome, SearchError> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let response = self
            .authorize(self.client.post(self.url("_bulk?refresh=true")))
            .header("Content-Type", "application/x-ndjson")
            .body(bulk_payload(index, documents)?)
            .send()
            .await?;

        let body = self.checked(response, "bulk write").await?;
        Ok(parse_bulk_response(&body))
    }

    async fn list_indices(&self, prefix: &str) -> Result<Vec<String>, SearchError> {
        let response = self
            .authorize(
                self.client
                    .get(self.url(&format!("_cat/indices/{prefix}*?format=json&h=index"))),
            )
            .send()
            .await?;

        let body = self.checked(response, "index listing").await?;
        let mut names: Vec<String> = body
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| row.get("index").and_then(Value::as_str).map(str::to_string))
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn terms(
        &self,
        index: &str,
        field: &str,
        size: usize,
    ) -> Result<Vec<String>, SearchError> {
        let response = self
            .authorize(self.client.post(self.url(&format!("{index}/_search"))))
            .json(&json!({
                "size": 0,
                "aggs": {
                    "unique_values": {
                        "terms": {"field": field, "size": size}
                    }
                }
            }))
            .send()
            .await?;

        let body = self.checked(response, "terms aggregation").await?;
        Ok(body
            .pointer("/aggregations/unique_values/buckets")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|bucket| bucket.get("key").and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    async fn hybrid_search(
        &self,
        index: &str,
        query: &str,
        query_vector: &[f32],
        size: usize,
    ) -> Result<Vec<RetrievalResult>, SearchError> {
        let response = self
            .authorize(self.client.post(self.url(&format!("{index}/_search"))))
            .json(&hybrid_query(query, query_vector, size))
            .send()
            .await?;

        let body = self.checked(response, "hybrid search").await?;
        Ok(parse_hits(&body, index))
    }
}
