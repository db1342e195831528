use crate::error::IngestError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Prefix of every chunk whose content was produced by the vision model.
pub const IMAGE_DESCRIPTION_PREFIX: &str = "image description: ";

/// Separator used when a heading path is flattened into `chunk_header`.
pub const HEADER_SEPARATOR: &str = ">";

/// Appended to the heading path of image-derived blocks.
pub const IMAGE_HEADER_MARKER: &str = "[image]";

/// Every knowledge-base index name starts with this tag.
pub const KNOWLEDGE_BASE_PREFIX: &str = "rag_";

/// One unit of extracted content, before chunk metadata is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub content: String,
    pub headers: Vec<String>,
    pub image_ref: Option<PathBuf>,
    pub img_url: Option<String>,
}

impl RawBlock {
    pub fn text(content: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            content: content.into(),
            headers,
            image_ref: None,
            img_url: None,
        }
    }

    /// Block standing in for an image until it has been described.
    pub fn image_placeholder(path: PathBuf, headers: Vec<String>) -> Self {
        Self {
            content: String::new(),
            headers,
            image_ref: Some(path),
            img_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub path: PathBuf,
    pub position: usize,
    pub headers: Vec<String>,
}

/// Output of extracting one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub blocks: Vec<RawBlock>,
    pub images: Vec<ImageReference>,
}

/// Provenance shared by every chunk cut from the same file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    pub file_name: String,
    pub source_path: String,
}

impl DocumentSource {
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
            })?;

        Ok(Self {
            file_name: file_name.to_string(),
            source_path: path.to_string_lossy().to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub file_name: String,
    #[serde(rename = "source", default)]
    pub source_path: String,
    #[serde(default)]
    pub chunk_header: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_string_as_none"
    )]
    pub img_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn is_image_derived(&self) -> bool {
        self.content.starts_with(IMAGE_DESCRIPTION_PREFIX) && self.metadata.img_url.is_some()
    }
}

/// Body of one document as written to the search store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedDocument {
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub metadata: ChunkMetadata,
    pub index_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankedResult {
    #[serde(flatten)]
    pub result: RetrievalResult,
    pub relevance_score: f64,
    /// Knowledge base the whole query was attributed to, not necessarily
    /// the index this hit came from.
    #[serde(rename = "attributed_index")]
    pub index_name: String,
}

/// A user-facing knowledge-base name, normalised to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KnowledgeBase(String);

impl KnowledgeBase {
    pub fn new(name: &str) -> Result<Self, IngestError> {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(IngestError::InvalidArgument(
                "knowledge base name must not be empty".to_string(),
            ));
        }
        Ok(Self(normalized))
    }

    pub fn from_index_name(index_name: &str) -> Self {
        let display = index_name
            .strip_prefix(KNOWLEDGE_BASE_PREFIX)
            .unwrap_or(index_name);
        Self(display.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn index_name(&self) -> String {
        format!("{KNOWLEDGE_BASE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for KnowledgeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn join_headers(headers: &[String]) -> String {
    headers.join(HEADER_SEPARATOR)
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|url| !url.is_empty()))
}
