use crate::chunking::Chunker;
use crate::config::{RagConfig, RetrievalOptions};
use crate::describer::{ImageDescriber, VisionDescriber};
use crate::embeddings::Embedder;
use crate::extractor::ContentExtractor;
use crate::generator::AnswerGenerator;
use crate::ingest::{DocumentIngestor, IngestionReport};
use crate::models::{KnowledgeBase, RerankedResult};
use crate::pdf::{converter_for, PdfConverter};
use crate::reranker::RelevanceReranker;
use crate::retriever::{HybridRetriever, RetrievalOutcome};
use crate::segmenter::Segmenter;
use crate::services::HostedModelClient;
use crate::store::IndexGateway;
use crate::stores::ElasticsearchStore;
use crate::traits::{ChatCompletion, DocumentIndex, RerankService};
use crate::{IngestError, SearchError};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The external capabilities the pipeline is wired to.
pub struct Collaborators {
    pub index: Arc<dyn DocumentIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub describer: Arc<dyn ImageDescriber>,
    pub pdf: Arc<dyn PdfConverter>,
    pub reranker: Arc<dyn RerankService>,
    pub chat: Arc<dyn ChatCompletion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBaseSummary {
    pub name: String,
    pub index_name: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RerankedResult>,
    pub primary_index: String,
}

pub struct RagPipeline {
    ingestor: DocumentIngestor,
    retriever: HybridRetriever,
    reranker: RelevanceReranker,
    generator: AnswerGenerator,
    retrieval: RetrievalOptions,
}

impl RagPipeline {
    /// Wires the hosted model endpoints and the Elasticsearch store.
    pub fn from_config(config: &RagConfig) -> Result<Self, IngestError> {
        config.validate()?;
        let models = Arc::new(HostedModelClient::new(
            &config.models,
            config.ingestion.embedding_dimensions,
        )?);
        let index = Arc::new(ElasticsearchStore::new(&config.search)?);

        Self::from_parts(
            config,
            Collaborators {
                index,
                embedder: models.clone(),
                describer: Arc::new(VisionDescriber::new(
                    models.clone(),
                    config.ingestion.min_description_chars,
                )),
                pdf: converter_for(&config.ingestion.pdf_converter),
                reranker: models.clone(),
                chat: models,
            },
        )
    }

    pub fn from_parts(config: &RagConfig, parts: Collaborators) -> Result<Self, IngestError> {
        config.validate()?;
        let options = &config.ingestion;

        let ingestor = DocumentIngestor::new(
            ContentExtractor::new(parts.pdf, options.pdf_output_root.clone())?,
            Chunker::new(parts.describer, options),
            Segmenter::new(options),
            IndexGateway::new(parts.index.clone(), parts.embedder.clone(), options),
        );

        Ok(Self {
            ingestor,
            retriever: HybridRetriever::new(parts.index, parts.embedder),
            reranker: RelevanceReranker::new(parts.reranker),
            generator: AnswerGenerator::new(parts.chat),
            retrieval: config.retrieval.clone(),
        })
    }

    pub async fn knowledge_bases(&self) -> Result<Vec<KnowledgeBaseSummary>, SearchError> {
        let gateway = self.ingestor.gateway();
        let mut summaries = Vec::new();
        for index_name in gateway.list_indices().await? {
            let files = gateway.list_files(&index_name).await;
            summaries.push(KnowledgeBaseSummary {
                name: KnowledgeBase::from_index_name(&index_name).name().to_string(),
                index_name,
                files,
            });
        }
        Ok(summaries)
    }

    async fn exists(&self, knowledge_base: &KnowledgeBase) -> Result<bool, SearchError> {
        let indices = self.ingestor.gateway().list_indices().await?;
        Ok(indices.contains(&knowledge_base.index_name()))
    }

    /// Nothing is created when ingestion fails, so the name stays free for
    /// a retry.
    pub async fn create_knowledge_base(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<IngestionReport, IngestError> {
        let knowledge_base = KnowledgeBase::new(name)?;
        if self.exists(&knowledge_base).await? {
            return Err(IngestError::InvalidArgument(format!(
                "knowledge base '{knowledge_base}' already exists"
            )));
        }

        let report = self.ingestor.ingest(path, &knowledge_base).await?;
        // Files that produced no chunks still leave an empty knowledge base.
        if report.chunks_indexed == 0 {
            self.ingestor
                .gateway()
                .ensure_index(&report.index_name)
                .await?;
        }
        info!(knowledge_base = %knowledge_base, path = %path.display(), "knowledge base created");
        Ok(report)
    }

    /// Incremental: ids continue after the documents already stored.
    /// Re-adding a folder skips the PDF conversion output written into it.
    pub async fn add_documents(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<IngestionReport, IngestError> {
        let knowledge_base = KnowledgeBase::new(name)?;
        if !self.exists(&knowledge_base).await? {
            return Err(IngestError::InvalidArgument(format!(
                "knowledge base '{knowledge_base}' does not exist"
            )));
        }
        self.ingestor.ingest(path, &knowledge_base).await
    }

    /// Retrieval only, without reranking or generation.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<RetrievalOutcome, SearchError> {
        let query = non_empty(query)?;
        self.retriever.retrieve(query, top_k).await
    }

    pub async fn query(&self, question: &str) -> Result<Answer, SearchError> {
        let question = non_empty(question)?;

        let retrieved = self
            .retriever
            .retrieve(question, self.retrieval.retrieve_top_k)
            .await?;
        info!(
            hits = retrieved.results.len(),
            primary_index = %retrieved.primary_index,
            "retrieved"
        );

        let sources = self
            .reranker
            .rerank(
                question,
                &retrieved.results,
                &retrieved.primary_index,
                self.retrieval.rerank_top_k,
            )
            .await?;
        let text = self.generator.generate(question, &sources).await?;

        Ok(Answer {
            text,
            sources,
            primary_index: retrieved.primary_index,
        })
    }
}

fn non_empty(query: &str) -> Result<&str, SearchError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(SearchError::Request("query is empty".to_string()));
    }
    Ok(query)
}
