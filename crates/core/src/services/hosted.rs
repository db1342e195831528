//! Client for an OpenAI-compatible model host that also exposes `/rerank`.
//!
//! One client serves embeddings, reranking, chat completion and image
//! description; each capability is exposed through its own trait so the
//! pipeline can swap any of them independently.

use crate::config::ModelServiceConfig;
use crate::embeddings::{check_dimensions, Embedder};
use crate::traits::{ChatCompletion, RerankHit, RerankService, VisionModel};
use crate::ServiceError;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};

pub struct HostedModelClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    rerank_model: String,
    chat_model: String,
    vision_model: String,
    temperature: f32,
    max_tokens: u32,
    dimensions: usize,
}

impl HostedModelClient {
    pub fn new(config: &ModelServiceConfig, dimensions: usize) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let api_key = config
            .api_key
            .as_ref()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: config.embedding_model.clone(),
            rerank_model: config.rerank_model.clone(),
            chat_model: config.chat_model.clone(),
            vision_model: config.vision_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            dimensions,
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Response, ServiceError> {
        let mut request = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .json(body);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        Ok(request.send().await?)
    }

    async fn chat(&self, model: &str, messages: Value) -> Result<String, ServiceError> {
        let response = self
            .post(
                "chat/completions",
                &json!({
                    "model": model,
                    "messages": messages,
                    "temperature": self.temperature,
                    "max_tokens": self.max_tokens,
                }),
            )
            .await?;

        let parsed: ChatResponse = check_status("chat", response).await?.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::Malformed {
                service: "chat",
                details: "response has no message content".to_string(),
            })
    }
}

/// Turns a non-success response into `ServiceError::Status` with its body.
async fn check_status(service: &'static str, response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

fn rerank_unavailable(error: ServiceError) -> ServiceError {
    match error {
        ServiceError::Status { status, body, .. } => {
            ServiceError::RerankUnavailable(format!("{status}: {body}"))
        }
        other => other,
    }
}

fn generation_unavailable(error: ServiceError) -> ServiceError {
    match error {
        ServiceError::Status { status, body, .. } => {
            ServiceError::GenerationUnavailable(format!("{status}: {body}"))
        }
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl Embedder for HostedModelClient {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let response = self
            .post(
                "embeddings",
                &json!({
                    "model": self.embedding_model,
                    "input": text,
                }),
            )
            .await?;

        let parsed: EmbeddingResponse = check_status("embedding", response).await?.json().await?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| ServiceError::Malformed {
                service: "embedding",
                details: "response has no embedding".to_string(),
            })?;

        check_dimensions(&vector, self.dimensions)?;
        Ok(vector)
    }
}

#[async_trait]
impl RerankService for HostedModelClient {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ServiceError> {
        let response = self
            .post(
                "rerank",
                &json!({
                    "model": self.rerank_model,
                    "query": query,
                    "documents": documents,
                    "top_n": top_n,
                }),
            )
            .await?;

        let parsed: RerankResponse = check_status("rerank", response)
            .await
            .map_err(rerank_unavailable)?
            .json()
            .await?;
        Ok(parsed
            .results
            .into_iter()
            .map(|result| RerankHit {
                index: result.index,
                relevance_score: result.relevance_score,
            })
            .collect())
    }
}

#[async_trait]
impl ChatCompletion for HostedModelClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ServiceError> {
        let messages = json!([
            {"role": "system", "content": system_prompt},
            {"role": "user", "content": user_prompt},
        ]);

        self.chat(&self.chat_model, messages)
            .await
            .map_err(generation_unavailable)
    }
}

#[async_trait]
impl VisionModel for HostedModelClient {
    async fn describe_image(&self, image_url: &str, prompt: &str) -> Result<String, ServiceError> {
        let messages = json!([
            {
                "role": "user",
                "content": [
                    {"type": "image_url", "image_url": {"url": image_url}},
                    {"type": "text", "text": prompt},
                ]
            }
        ]);

        self.chat(&self.vision_model, messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers every request with `status` and `body`, after reading the
    /// full request.
    async fn serve_status(status: &'static str, body: &'static str) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut buffer = [0u8; 4096];
                loop {
                    let Ok(read) = stream.read(&mut buffer).await else {
                        break;
                    };
                    if read == 0 {
                        break;
                    }
                    request.extend_from_slice(&buffer[..read]);
                    if request_complete(&request) {
                        break;
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        Ok(address)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    fn client_for(address: SocketAddr) -> HostedModelClient {
        let config = ModelServiceConfig {
            base_url: format!("http://{address}/v1"),
            api_key: Some("test-key".to_string()),
            ..ModelServiceConfig::default()
        };
        HostedModelClient::new(&config, 8).expect("client should build")
    }

    #[test]
    fn status_errors_map_to_unavailable_capabilities() {
        let status = || ServiceError::Status {
            service: "rerank",
            status: 503,
            body: "overloaded".to_string(),
        };

        match rerank_unavailable(status()) {
            ServiceError::RerankUnavailable(details) => assert_eq!(details, "503: overloaded"),
            other => panic!("unexpected error: {other}"),
        }
        match generation_unavailable(status()) {
            ServiceError::GenerationUnavailable(details) => assert_eq!(details, "503: overloaded"),
            other => panic!("unexpected error: {other}"),
        }

        let malformed = ServiceError::Malformed {
            service: "chat",
            details: "no content".to_string(),
        };
        assert!(matches!(
            generation_unavailable(malformed),
            ServiceError::Malformed { .. }
        ));
    }

    #[tokio::test]
    async fn unavailable_rerank_endpoint_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let address = serve_status("503 Service Unavailable", "rerank model loading").await?;
        let client = client_for(address);

        let result = client.rerank("q", &["alpha".to_string()], 3).await;
        match result {
            Err(ServiceError::RerankUnavailable(details)) => {
                assert_eq!(details, "503: rerank model loading")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_chat_endpoint_is_reported() -> Result<(), Box<dyn std::error::Error>> {
        let address = serve_status("503 Service Unavailable", "quota exceeded").await?;
        let client = client_for(address);

        let result = client.complete("system", "user").await;
        assert!(matches!(result, Err(ServiceError::GenerationUnavailable(details)) if details == "503: quota exceeded"));

        let vision = client.describe_image("data:image/png;base64,AA==", "describe").await;
        assert!(matches!(vision, Err(ServiceError::Status { service: "chat", status: 503, .. })));
        Ok(())
    }

    #[tokio::test]
    async fn embedding_status_error_keeps_body() -> Result<(), Box<dyn std::error::Error>> {
        let address = serve_status("401 Unauthorized", "bad key").await?;

        let result = client_for(address).embed("text").await;
        assert!(matches!(
            result,
            Err(ServiceError::Status { service: "embedding", status: 401, ref body }) if body == "bad key"
        ));
        Ok(())
    }

    #[test]
    fn blank_api_key_is_treated_as_missing() {
        let config = ModelServiceConfig {
            api_key: Some("   ".to_string()),
            base_url: "http://localhost:8000/v1/".to_string(),
            ..ModelServiceConfig::default()
        };

        let client = HostedModelClient::new(&config, 8).expect("client should build");
        assert!(client.api_key.is_none());
        assert_eq!(client.base_url, "http://localhost:8000/v1");
        assert_eq!(client.dimensions(), 8);
    }

    #[test]
    fn rerank_payload_parses_service_order() {
        let parsed: RerankResponse = serde_json::from_value(json!({
            "id": "r-1",
            "results": [
                {"index": 2, "relevance_score": 0.8},
                {"index": 0, "relevance_score": 0.5}
            ]
        }))
        .expect("payload should parse");

        let order: Vec<usize> = parsed.results.iter().map(|result| result.index).collect();
        assert_eq!(order, vec![2, 0]);
    }

    #[test]
    fn chat_payload_without_content_is_none() {
        let parsed: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant"}}]
        }))
        .expect("payload should parse");

        assert!(parsed.choices[0].message.content.is_none());
    }
}
