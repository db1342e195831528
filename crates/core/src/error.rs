use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("file is neither valid utf-8 nor gbk: {}", .0.display())]
    UnsupportedEncoding(PathBuf),

    #[error("pdf conversion failed: {0}")]
    PdfConversion(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Failures of the hosted model endpoints (embedding, rerank, chat, vision).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed response from {service}: {details}")]
    Malformed {
        service: &'static str,
        details: String,
    },

    #[error("rerank service unavailable: {0}")]
    RerankUnavailable(String),

    #[error("answer generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("image processing failed: {0}")]
    ImageProcessing(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("no knowledge base available, create one first")]
    NoIndicesAvailable,

    #[error(transparent)]
    Service(#[from] ServiceError),
}
