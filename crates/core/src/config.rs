use crate::error::IngestError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1024;

/// Everything the pipeline needs, built once at startup and handed to each
/// component constructor.
#[derive(Debug, Clone, Default)]
pub struct RagConfig {
    pub models: ModelServiceConfig,
    pub search: SearchStoreConfig,
    pub ingestion: IngestionOptions,
    pub retrieval: RetrievalOptions,
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        self.ingestion.validate()
    }
}

#[derive(Debug, Clone)]
pub struct ModelServiceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub rerank_model: String,
    pub chat_model: String,
    pub vision_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ModelServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.siliconflow.cn/v1".to_string(),
            api_key: None,
            embedding_model: "BAAI/bge-m3".to_string(),
            rerank_model: "BAAI/bge-reranker-v2-m3".to_string(),
            chat_model: "deepseek-ai/DeepSeek-V3".to_string(),
            vision_model: "Qwen/Qwen2-VL-72B-Instruct".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchStoreConfig {
    pub url: String,
    pub username: String,
    pub password: Option<String>,
    /// Local clusters ship with self-signed certificates.
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
}

impl Default for SearchStoreConfig {
    fn default() -> Self {
        Self {
            url: "https://localhost:9200".to_string(),
            username: "elastic".to_string(),
            password: None,
            accept_invalid_certs: true,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfConverterKind {
    /// External markdown converter. `{input}` and `{output}` in `args` are
    /// replaced by the pdf path and the output directory.
    Command { program: String, args: Vec<String> },
    /// Text-only conversion through lopdf, no images.
    Builtin,
}

impl Default for PdfConverterKind {
    fn default() -> Self {
        Self::Command {
            program: "magic-pdf".to_string(),
            args: vec![
                "-p".to_string(),
                "{input}".to_string(),
                "-o".to_string(),
                "{output}".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub window_chars: usize,
    pub overlap_chars: usize,
    pub image_concurrency: usize,
    pub image_context_chars: usize,
    pub min_description_chars: usize,
    pub embedding_dimensions: usize,
    /// Drop and rebuild an index that already exists when it is ensured.
    pub recreate_if_exists: bool,
    pub pdf_converter: PdfConverterKind,
    /// Where converted pdf output (markdown and images) is kept. Defaults to
    /// a directory next to each pdf.
    pub pdf_output_root: Option<PathBuf>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            window_chars: 1_000,
            overlap_chars: 200,
            image_concurrency: 5,
            image_context_chars: 500,
            min_description_chars: 10,
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            recreate_if_exists: false,
            pdf_converter: PdfConverterKind::default(),
            pdf_output_root: None,
        }
    }
}

impl IngestionOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.window_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "window must be at least one character".to_string(),
            ));
        }
        if self.overlap_chars >= self.window_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than window {}",
                self.overlap_chars, self.window_chars
            )));
        }
        if self.image_concurrency == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "image concurrency must be at least 1".to_string(),
            ));
        }
        if self.embedding_dimensions == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "embedding dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub retrieve_top_k: usize,
    pub rerank_top_k: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            retrieve_top_k: 10,
            rerank_top_k: 5,
        }
    }
}
