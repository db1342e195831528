use crate::config::IngestionOptions;
use crate::embeddings::Embedder;
use crate::models::{Chunk, IndexedDocument, KNOWLEDGE_BASE_PREFIX};
use crate::traits::{BulkFailure, DocumentIndex};
use crate::{IngestError, SearchError};
use std::sync::Arc;
use tracing::{info, warn};

/// Upper bound on distinct file names reported per knowledge base.
pub const MAX_LISTED_FILES: usize = 1_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreReport {
    pub indexed: usize,
    pub failures: Vec<BulkFailure>,
    /// Numeric part of the first `doc_<n>` id assigned by this call.
    pub first_id: u64,
}

/// Owns the index lifecycle of every knowledge base.
pub struct IndexGateway {
    index: Arc<dyn DocumentIndex>,
    embedder: Arc<dyn Embedder>,
    dimensions: usize,
    recreate_if_exists: bool,
}

impl IndexGateway {
    pub fn new(
        index: Arc<dyn DocumentIndex>,
        embedder: Arc<dyn Embedder>,
        options: &IngestionOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            dimensions: options.embedding_dimensions,
            recreate_if_exists: options.recreate_if_exists,
        }
    }

    /// Creates the index when absent. An existing index is only dropped and
    /// rebuilt when `recreate_if_exists` is set.
    pub async fn ensure_index(&self, name: &str) -> Result<(), SearchError> {
        if self.index.index_exists(name).await? {
            if !self.recreate_if_exists {
                return Ok(());
            }
            warn!(index = name, "recreating existing index, its documents are dropped");
            self.index.delete_index(name).await?;
        }
        self.index.create_index(name, self.dimensions).await
    }

    /// Embeds every chunk, then writes them in one bulk request with ids
    /// continuing from the current document count. An embedding failure
    /// aborts before anything is written, index creation included;
    /// per-document write failures are logged and reported, not raised.
    pub async fn store(&self, chunks: &[Chunk], name: &str) -> Result<StoreReport, IngestError> {
        if chunks.is_empty() {
            return Ok(StoreReport::default());
        }

        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            embedded.push(IndexedDocument {
                content: chunk.content.clone(),
                vector: self.embedder.embed(&chunk.content).await?,
                metadata: chunk.metadata.clone(),
            });
        }

        if !self.index.index_exists(name).await? {
            self.index.create_index(name, self.dimensions).await?;
        }

        let first_id = match self.index.count(name).await {
            Ok(count) => count,
            Err(error) => {
                warn!(index = name, %error, "document count unavailable, numbering from zero");
                0
            }
        };

        let documents: Vec<(String, IndexedDocument)> = embedded
            .into_iter()
            .enumerate()
            .map(|(offset, document)| (format!("doc_{}", first_id + offset as u64), document))
            .collect();

        let outcome = self.index.bulk_index(name, &documents).await?;
        for failure in &outcome.failures {
            warn!(index = name, id = %failure.id, reason = %failure.reason, "bulk write item failed");
        }
        info!(
            index = name,
            indexed = outcome.indexed,
            failed = outcome.failures.len(),
            "chunks stored"
        );

        Ok(StoreReport {
            indexed: outcome.indexed,
            failures: outcome.failures,
            first_id,
        })
    }

    pub async fn list_indices(&self) -> Result<Vec<String>, SearchError> {
        self.index.list_indices(KNOWLEDGE_BASE_PREFIX).await
    }

    /// Sorted distinct file names in the index; empty when the aggregation
    /// fails.
    pub async fn list_files(&self, name: &str) -> Vec<String> {
        match self
            .index
            .terms(name, "metadata.file_name", MAX_LISTED_FILES)
            .await
        {
            Ok(mut files) => {
                files.sort();
                files.dedup();
                files
            }
            Err(error) => {
                warn!(index = name, %error, "listing files failed");
                Vec::new()
            }
        }
    }
}
