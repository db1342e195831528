//! In-process stand-ins for the external collaborators.

use crate::describer::ImageDescriber;
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::models::{IndexedDocument, RetrievalResult};
use crate::pdf::{ConvertedPdf, PdfConverter};
use crate::traits::{BulkFailure, BulkOutcome, ChatCompletion, DocumentIndex, RerankHit, RerankService};
use crate::{SearchError, ServiceError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Answers by image file name; unknown images get `fallback`.
#[derive(Default)]
pub struct FakeDescriber {
    answers: HashMap<String, Option<String>>,
    fallback: Option<String>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub contexts: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeDescriber {
    pub fn with(mut self, file_name: &str, answer: Option<&str>) -> Self {
        self.answers
            .insert(file_name.to_string(), answer.map(str::to_string));
        self
    }

    pub fn default_answer(mut self, answer: Option<&str>) -> Self {
        self.fallback = answer.map(str::to_string);
        self
    }
}

#[async_trait]
impl ImageDescriber for FakeDescriber {
    async fn describe(&self, image: &Path, context: Option<&str>) -> Option<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let name = image
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        self.contexts
            .lock()
            .unwrap()
            .push((name.clone(), context.map(str::to_string)));
        self.answers
            .get(&name)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Writes `report.md` plus `images/fig1.png` into the output directory,
/// the layout an external converter produces.
#[derive(Default)]
pub struct FakePdfConverter {
    pub conversions: AtomicUsize,
}

#[async_trait]
impl PdfConverter for FakePdfConverter {
    async fn convert(&self, _pdf: &Path, output_dir: &Path) -> Result<ConvertedPdf, IngestError> {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        let images = output_dir.join("images");
        std::fs::create_dir_all(&images)?;
        std::fs::write(images.join("fig1.png"), b"png")?;
        let markdown_path = output_dir.join("report.md");
        std::fs::write(
            &markdown_path,
            "# Report\n\nPump pressure readings.\n\n![](images/fig1.png)\n",
        )?;
        Ok(ConvertedPdf { markdown_path })
    }
}

/// Deterministic trigram-hash embedder; fails for texts containing
/// `fail_on`.
pub struct NgramEmbedder {
    pub dimensions: usize,
    pub fail_on: Option<String>,
    pub calls: AtomicUsize,
}

impl NgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }
}

#[async_trait]
impl Embedder for NgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(needle) = &self.fail_on {
            if text.contains(needle.as_str()) {
                return Err(ServiceError::Status {
                    service: "embedding",
                    status: 500,
                    body: "embedding backend down".to_string(),
                });
            }
        }

        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for c in window {
                hash ^= *c as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let slot = (hash % vector.len() as u64) as usize;
            vector[slot] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }
        Ok(vector)
    }
}

/// Search store kept in memory. Per-index scripted hits or failures
/// override the computed hybrid score.
#[derive(Default)]
pub struct MemoryIndex {
    pub indices: Mutex<BTreeMap<String, Vec<(String, IndexedDocument)>>>,
    pub reject_ids: HashSet<String>,
    pub scripted_hits: HashMap<String, Vec<RetrievalResult>>,
    pub failing_indices: HashSet<String>,
    pub fail_terms: bool,
    pub created: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl MemoryIndex {
    pub fn with_index(self, name: &str) -> Self {
        self.indices
            .lock()
            .unwrap()
            .insert(name.to_string(), Vec::new());
        self
    }

    pub fn documents(&self, index: &str) -> Vec<(String, IndexedDocument)> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }
}

fn cosine(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm: f32 = left.iter().map(|a| a * a).sum::<f32>().sqrt();
    let right_norm: f32 = right.iter().map(|b| b * b).sum::<f32>().sqrt();
    if left_norm < f32::EPSILON || right_norm < f32::EPSILON {
        0.0
    } else {
        f64::from(dot / (left_norm * right_norm))
    }
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn index_exists(&self, index: &str) -> Result<bool, SearchError> {
        Ok(self.indices.lock().unwrap().contains_key(index))
    }

    async fn create_index(&self, index: &str, _dimensions: usize) -> Result<(), SearchError> {
        self.created.lock().unwrap().push(index.to_string());
        self.indices
            .lock()
            .unwrap()
            .insert(index.to_string(), Vec::new());
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchError> {
        self.deleted.lock().unwrap().push(index.to_string());
        self.indices.lock().unwrap().remove(index);
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<u64, SearchError> {
        Ok(self
            .indices
            .lock()
            .unwrap()
            .get(index)
            .map_or(0, |documents| documents.len() as u64))
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: &[(String, IndexedDocument)],
    ) -> Result<BulkOutcome, SearchError> {
        let mut indices = self.indices.lock().unwrap();
        let stored = indices.entry(index.to_string()).or_default();
        let mut outcome = BulkOutcome::default();

        for (id, document) in documents {
            if self.reject_ids.contains(id) {
                outcome.failures.push(BulkFailure {
                    id: id.clone(),
                    reason: "rejected by test store".to_string(),
                });
                continue;
            }
            stored.retain(|(existing, _)| existing != id);
            stored.push((id.clone(), document.clone()));
            outcome.indexed += 1;
        }
        Ok(outcome)
    }

    async fn list_indices(&self, prefix: &str) -> Result<Vec<String>, SearchError> {
        let mut names: Vec<String> = self
            .indices
            .lock()
            .unwrap()
            .keys()
            .chain(self.scripted_hits.keys())
            .chain(self.failing_indices.iter())
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn terms(
        &self,
        index: &str,
        _field: &str,
        size: usize,
    ) -> Result<Vec<String>, SearchError> {
        if self.fail_terms {
            return Err(SearchError::Request("aggregation failed".to_string()));
        }
        let mut seen = HashSet::new();
        Ok(self
            .documents(index)
            .into_iter()
            .map(|(_, document)| document.metadata.file_name)
            .filter(|name| seen.insert(name.clone()))
            .take(size)
            .collect())
    }

    async fn hybrid_search(
        &self,
        index: &str,
        query: &str,
        query_vector: &[f32],
        size: usize,
    ) -> Result<Vec<RetrievalResult>, SearchError> {
        if self.failing_indices.contains(index) {
            return Err(SearchError::BackendResponse {
                backend: "memory".to_string(),
                details: format!("{index} unavailable"),
            });
        }
        if let Some(hits) = self.scripted_hits.get(index) {
            return Ok(hits.iter().take(size).cloned().collect());
        }

        let terms: Vec<String> = query
            .split_whitespace()
            .map(|term| term.to_lowercase())
            .collect();
        let mut hits: Vec<RetrievalResult> = self
            .documents(index)
            .into_iter()
            .map(|(id, document)| {
                let lowered = document.content.to_lowercase();
                let lexical = terms.iter().filter(|term| lowered.contains(term.as_str())).count();
                RetrievalResult {
                    id,
                    score: cosine(query_vector, &document.vector) + 1.0 + lexical as f64,
                    content: document.content,
                    metadata: document.metadata,
                    index_name: index.to_string(),
                }
            })
            .collect();
        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(size);
        Ok(hits)
    }
}

pub struct FakeReranker {
    pub reply: Result<Vec<RerankHit>, String>,
    pub received: Mutex<Vec<(String, Vec<String>, usize)>>,
}

impl FakeReranker {
    pub fn replying(hits: Vec<RerankHit>) -> Self {
        Self {
            reply: Ok(hits),
            received: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RerankService for FakeReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ServiceError> {
        self.received
            .lock()
            .unwrap()
            .push((query.to_string(), documents.to_vec(), top_n));
        self.reply.clone().map_err(ServiceError::RerankUnavailable)
    }
}

pub struct FakeChat {
    pub reply: Result<String, String>,
    pub prompts: Mutex<Vec<(String, String)>>,
}

impl FakeChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatCompletion for FakeChat {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ServiceError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        self.reply.clone().map_err(ServiceError::GenerationUnavailable)
    }
}
