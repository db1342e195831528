use crate::models::{RerankedResult, RetrievalResult};
use crate::traits::RerankService;
use crate::ServiceError;
use std::sync::Arc;

/// Second-pass ordering by a cross-encoder service. There is no local
/// fallback ranking.
pub struct RelevanceReranker {
    service: Arc<dyn RerankService>,
}

impl RelevanceReranker {
    pub fn new(service: Arc<dyn RerankService>) -> Self {
        Self { service }
    }

    /// Returns candidates in the service's order, tagged with `index_name`.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[RetrievalResult],
        index_name: &str,
        top_k: usize,
    ) -> Result<Vec<RerankedResult>, ServiceError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<String> = candidates
            .iter()
            .map(|candidate| candidate.content.clone())
            .collect();
        let hits = self.service.rerank(query, &documents, top_k).await?;

        hits.into_iter()
            .take(top_k)
            .map(|hit| -> Result<RerankedResult, ServiceError> {
                let candidate = candidates.get(hit.index).ok_or_else(|| ServiceError::Malformed {
                    service: "rerank",
                    details: format!(
                        "result index {} out of range for {} documents",
                        hit.index,
                        candidates.len()
                    ),
                })?;
                Ok(RerankedResult {
                    result: candidate.clone(),
                    relevance_score: hit.relevance_score,
                    index_name: index_name.to_string(),
                })
            })
            .collect()
    }
}
