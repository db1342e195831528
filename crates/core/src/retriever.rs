use crate::embeddings::Embedder;
use crate::models::{RetrievalResult, KNOWLEDGE_BASE_PREFIX};
use crate::traits::DocumentIndex;
use crate::SearchError;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutcome {
    pub results: Vec<RetrievalResult>,
    /// Index of the best hit, or the first known index when nothing matched.
    pub primary_index: String,
}

/// Runs the hybrid query against every knowledge base and merges the hits.
pub struct HybridRetriever {
    index: Arc<dyn DocumentIndex>,
    embedder: Arc<dyn Embedder>,
}

impl HybridRetriever {
    pub fn new(index: Arc<dyn DocumentIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievalOutcome, SearchError> {
        let indices = self.index.list_indices(KNOWLEDGE_BASE_PREFIX).await?;
        let Some(first_index) = indices.first().cloned() else {
            return Err(SearchError::NoIndicesAvailable);
        };

        let query_vector = self.embedder.embed(query).await?;

        let searches = indices.iter().map(|name| {
            let query_vector = &query_vector;
            async move {
                (
                    name,
                    self.index
                        .hybrid_search(name, query, query_vector, top_k)
                        .await,
                )
            }
        });

        let mut results = Vec::new();
        for (name, outcome) in join_all(searches).await {
            match outcome {
                Ok(hits) => {
                    debug!(index = %name, hits = hits.len(), "index searched");
                    results.extend(hits);
                }
                Err(error) => warn!(index = %name, %error, "search failed, index skipped"),
            }
        }

        results.sort_by(|left, right| right.score.total_cmp(&left.score));
        results.truncate(top_k);

        let primary_index = results
            .first()
            .map(|best| best.index_name.clone())
            .unwrap_or(first_index);

        Ok(RetrievalOutcome {
            results,
            primary_index,
        })
    }
}
