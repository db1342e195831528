//! PDF to markdown conversion.
//!
//! PDFs are never chunked directly: they are converted to a markdown file
//! (figures extracted by the converter are referenced from it by relative
//! path) and then go through the same markdown scan as `.md` sources.

use crate::config::PdfConverterKind;
use crate::error::IngestError;
use async_trait::async_trait;
use lopdf::Document;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedPdf {
    pub markdown_path: PathBuf,
}

#[async_trait]
pub trait PdfConverter: Send + Sync {
    async fn convert(&self, pdf: &Path, output_dir: &Path) -> Result<ConvertedPdf, IngestError>;
}

pub fn converter_for(kind: &PdfConverterKind) -> Arc<dyn PdfConverter> {
    match kind {
        PdfConverterKind::Command { program, args } => Arc::new(CommandPdfConverter {
            program: program.clone(),
            args: args.clone(),
        }),
        PdfConverterKind::Builtin => Arc::new(LopdfConverter),
    }
}

/// Runs an external converter such as `magic-pdf` and picks up its output.
pub struct CommandPdfConverter {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandPdfConverter {
    fn expand_args(&self, pdf: &Path, output_dir: &Path) -> Vec<String> {
        let input = pdf.to_string_lossy();
        let output = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

#[async_trait]
impl PdfConverter for CommandPdfConverter {
    async fn convert(&self, pdf: &Path, output_dir: &Path) -> Result<ConvertedPdf, IngestError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let args = self.expand_args(pdf, output_dir);
        debug!(program = %self.program, ?args, "running pdf converter");

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|error| {
                IngestError::PdfConversion(format!("failed to start {}: {error}", self.program))
            })?;

        if !output.status.success() {
            return Err(IngestError::PdfConversion(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        locate_markdown(pdf, output_dir)
    }
}

/// Finds the markdown produced for `pdf` under `output_dir`, preferring a
/// file named after the pdf.
pub fn locate_markdown(pdf: &Path, output_dir: &Path) -> Result<ConvertedPdf, IngestError> {
    let stem = pdf.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default();

    let mut candidates: Vec<PathBuf> = WalkDir::new(output_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
        })
        .collect();
    candidates.sort();

    candidates
        .iter()
        .find(|path| path.file_stem().and_then(|s| s.to_str()) == Some(stem))
        .or_else(|| candidates.first())
        .cloned()
        .ok_or_else(|| {
            IngestError::PdfConversion(format!(
                "no markdown output for {} in {}",
                pdf.display(),
                output_dir.display()
            ))
        })
        .map(|markdown_path| ConvertedPdf { markdown_path })
}

/// Text-only fallback: one `# Page N` section per page with readable text.
#[derive(Default)]
pub struct LopdfConverter;

impl LopdfConverter {
    fn render_markdown(path: &Path) -> Result<String, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfConversion(error.to_string()))?;

        let mut markdown = String::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfConversion(error.to_string()))?;

            if text.trim().is_empty() {
                continue;
            }
            markdown.push_str(&format!("# Page {page_no}\n\n{}\n\n", text.trim()));
        }

        if markdown.is_empty() {
            return Err(IngestError::PdfConversion(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(markdown)
    }
}

#[async_trait]
impl PdfConverter for LopdfConverter {
    async fn convert(&self, pdf: &Path, output_dir: &Path) -> Result<ConvertedPdf, IngestError> {
        let source = pdf.to_path_buf();
        let markdown = tokio::task::spawn_blocking(move || Self::render_markdown(&source))
            .await
            .map_err(|error| IngestError::PdfConversion(error.to_string()))??;

        tokio::fs::create_dir_all(output_dir).await?;
        let stem = pdf
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("document");
        let markdown_path = output_dir.join(format!("{stem}.md"));
        tokio::fs::write(&markdown_path, markdown).await?;

        Ok(ConvertedPdf { markdown_path })
    }
}
