use crate::models::{IndexedDocument, RetrievalResult};
use crate::{SearchError, ServiceError};
use async_trait::async_trait;

/// Result of one bulk write. Per-document failures do not fail the call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub indexed: usize,
    pub failures: Vec<BulkFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub id: String,
    pub reason: String,
}

/// Search store holding one index per knowledge base.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError>;

    async fn create_index(&self, index: &str, dimensions: usize) -> Result<(), SearchError>;

    async fn delete_index(&self, index: &str) -> Result<(), SearchError>;

    async fn count(&self, index: &str) -> Result<u64, SearchError>;

    async fn bulk_index(
        &self,
        index: &str,
        documents: &[(String, IndexedDocument)],
    ) -> Result<BulkOutcome, SearchError>;

    async fn list_indices(&self, prefix: &str) -> Result<Vec<String>, SearchError>;

    /// Distinct values of a keyword field, at most `size` of them.
    async fn terms(&self, index: &str, field: &str, size: usize)
        -> Result<Vec<String>, SearchError>;

    /// Scores every document by vector similarity plus lexical match.
    async fn hybrid_search(
        &self,
        index: &str,
        query: &str,
        query_vector: &[f32],
        size: usize,
    ) -> Result<Vec<RetrievalResult>, SearchError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankHit {
    pub index: usize,
    pub relevance_score: f64,
}

#[async_trait]
pub trait RerankService: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ServiceError>;
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, ServiceError>;
}

#[async_trait]
pub trait VisionModel: Send + Sync {
    /// `image_url` is usually a base64 `data:` url.
    async fn describe_image(&self, image_url: &str, prompt: &str) -> Result<String, ServiceError>;
}
