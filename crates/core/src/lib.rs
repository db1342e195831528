pub mod chunking;
pub mod config;
pub mod describer;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod pdf;
pub mod reranker;
pub mod retriever;
pub mod segmenter;
pub mod services;
pub mod store;
pub mod stores;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use chunking::{image_context, Chunker};
pub use config::{
    IngestionOptions, ModelServiceConfig, PdfConverterKind, RagConfig, RetrievalOptions,
    SearchStoreConfig,
};
pub use describer::{ImageDescriber, VisionDescriber, NO_CONTENT_SENTINEL};
pub use embeddings::{Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError, ServiceError};
pub use extractor::{ContentExtractor, MarkdownScanner, CONVERTED_DIR_SUFFIX};
pub use generator::AnswerGenerator;
pub use ingest::{discover_files, DocumentIngestor, IngestionReport, SkippedFile};
pub use models::{
    Chunk, ChunkMetadata, DocumentSource, Extraction, ImageReference, IndexedDocument,
    KnowledgeBase, RawBlock, RerankedResult, RetrievalResult,
};
pub use orchestrator::{Answer, Collaborators, KnowledgeBaseSummary, RagPipeline};
pub use pdf::{CommandPdfConverter, ConvertedPdf, LopdfConverter, PdfConverter};
pub use reranker::RelevanceReranker;
pub use retriever::{HybridRetriever, RetrievalOutcome};
pub use segmenter::Segmenter;
pub use services::HostedModelClient;
pub use store::{IndexGateway, StoreReport};
pub use stores::ElasticsearchStore;
pub use traits::{BulkFailure, BulkOutcome, ChatCompletion, DocumentIndex, RerankHit, RerankService, VisionModel};
