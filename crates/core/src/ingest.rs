use crate::chunking::Chunker;
use crate::extractor::ContentExtractor;
use crate::models::{DocumentSource, KnowledgeBase};
use crate::segmenter::Segmenter;
use crate::store::{IndexGateway, StoreReport};
use crate::traits::BulkFailure;
use crate::IngestError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Every regular file under `path`, sorted; a file path yields itself.
/// Directories below `path` for which `skip_dir` holds are not entered.
pub fn discover_files<F>(path: &Path, skip_dir: F) -> Result<Vec<PathBuf>, IngestError>
where
    F: Fn(&Path) -> bool,
{
    if !path.exists() {
        return Err(IngestError::InvalidArgument(format!(
            "path does not exist: {}",
            path.display()
        )));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_type().is_dir() || !skip_dir(entry.path())
        })
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .collect();

    files.sort_unstable();
    Ok(files)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub index_name: String,
    pub files_ingested: usize,
    pub chunks_indexed: usize,
    pub failed_writes: Vec<BulkFailure>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Drives extract, chunk, segment and store for each discovered file.
pub struct DocumentIngestor {
    extractor: ContentExtractor,
    chunker: Chunker,
    segmenter: Segmenter,
    gateway: IndexGateway,
}

impl DocumentIngestor {
    pub fn new(
        extractor: ContentExtractor,
        chunker: Chunker,
        segmenter: Segmenter,
        gateway: IndexGateway,
    ) -> Self {
        Self {
            extractor,
            chunker,
            segmenter,
            gateway,
        }
    }

    pub fn gateway(&self) -> &IndexGateway {
        &self.gateway
    }

    /// A single file that fails is an error. In a directory a failing file
    /// is recorded and skipped and the rest of the batch continues; the call
    /// only fails when no file could be ingested.
    pub async fn ingest(
        &self,
        path: &Path,
        knowledge_base: &KnowledgeBase,
    ) -> Result<IngestionReport, IngestError> {
        let single_file = path.is_file();
        let files = discover_files(path, |dir| self.extractor.is_conversion_output(dir))?;
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no files found in {}",
                path.display()
            )));
        }

        let index_name = knowledge_base.index_name();
        let mut report = IngestionReport {
            index_name: index_name.clone(),
            ..IngestionReport::default()
        };
        let mut first_error = None;
        let mut cursor = 0u64;

        for file in files {
            match self.ingest_file(&file, &index_name, cursor).await {
                Ok((next_cursor, stored)) => {
                    cursor = next_cursor;
                    report.files_ingested += 1;
                    report.chunks_indexed += stored.indexed;
                    report.failed_writes.extend(stored.failures);
                }
                Err(error) if single_file => return Err(error),
                Err(error) => {
                    warn!(file = %file.display(), %error, "file skipped");
                    report.skipped_files.push(SkippedFile {
                        path: file,
                        reason: error.to_string(),
                    });
                    first_error.get_or_insert(error);
                }
            }
        }

        if report.files_ingested == 0 {
            if let Some(error) = first_error {
                return Err(error);
            }
        }

        info!(
            index = %report.index_name,
            files = report.files_ingested,
            chunks = report.chunks_indexed,
            failed_writes = report.failed_writes.len(),
            skipped = report.skipped_files.len(),
            "ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_file(
        &self,
        file: &Path,
        index_name: &str,
        cursor: u64,
    ) -> Result<(u64, StoreReport), IngestError> {
        let source = DocumentSource::from_path(file)?;
        let extraction = self.extractor.extract(file).await?;
        let chunks = self.chunker.resolve(extraction, &source).await;
        let (chunks, next_cursor) = self.segmenter.split(chunks, cursor);
        let stored = self.gateway.store(&chunks, index_name).await?;
        Ok((next_cursor, stored))
    }
}
