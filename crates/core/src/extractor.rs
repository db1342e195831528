use crate::error::IngestError;
use crate::models::{Extraction, ImageReference, RawBlock};
use crate::pdf::PdfConverter;
use encoding_rs::GBK;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];
/// Suffix of the directory a PDF is converted into when no output root is set.
pub const CONVERTED_DIR_SUFFIX: &str = "_converted";

/// Closing `#`s are only stripped when whitespace separates them from the
/// title, so `# C#` keeps its title.
const HEADING_PATTERN: &str = r"^(#{1,6})\s+(.+?)(?:\s+#+)?\s*$";
/// Image embed at the start of a line; anything after it is ordinary text.
const IMAGE_PATTERN: &str = r#"^\s*!\[[^\]]*\]\(\s*<?([^)>\s]+)>?(?:\s+"[^"]*")?\s*\)"#;

pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Decodes file bytes as utf-8, falling back to gbk.
pub fn decode_text(bytes: &[u8], path: &Path) -> Result<String, IngestError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.trim_start_matches('\u{feff}').to_string()),
        Err(_) => GBK
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .ok_or_else(|| IngestError::UnsupportedEncoding(path.to_path_buf())),
    }
}

/// Line-oriented markdown scan tracking the heading path and image embeds.
#[derive(Debug, Clone)]
pub struct MarkdownScanner {
    heading: Regex,
    image: Regex,
}

impl MarkdownScanner {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            heading: Regex::new(HEADING_PATTERN)?,
            image: Regex::new(IMAGE_PATTERN)?,
        })
    }

    /// Image paths are resolved against `base_dir`; embeds whose file does
    /// not exist stay in the text verbatim.
    pub fn scan(&self, markdown: &str, base_dir: &Path) -> Extraction {
        let mut extraction = Extraction::default();
        let mut headers: Vec<String> = Vec::new();
        let mut buffer = String::new();

        for line in markdown.lines() {
            if let Some(captures) = self.heading.captures(line) {
                flush_text(&mut buffer, &headers, &mut extraction.blocks);
                let level = captures.get(1).map_or(1, |m| m.as_str().len());
                let title = captures.get(2).map_or("", |m| m.as_str()).to_string();
                headers.truncate(level - 1);
                headers.push(title);
                continue;
            }

            if let Some((target, rest)) = self.image.captures(line).and_then(|captures| {
                let embed = captures.get(0)?;
                let target = resolve_image(captures.get(1)?.as_str(), base_dir)?;
                Some((target, &line[embed.end()..]))
            }) {
                flush_text(&mut buffer, &headers, &mut extraction.blocks);
                let position = extraction.blocks.len();
                extraction
                    .blocks
                    .push(RawBlock::image_placeholder(target.clone(), headers.clone()));
                extraction.images.push(ImageReference {
                    path: target,
                    position,
                    headers: headers.clone(),
                });
                if !rest.trim().is_empty() {
                    buffer.push_str(rest.trim());
                    buffer.push('\n');
                }
                continue;
            }

            buffer.push_str(line);
            buffer.push('\n');
        }

        flush_text(&mut buffer, &headers, &mut extraction.blocks);
        extraction
    }
}

fn flush_text(buffer: &mut String, headers: &[String], blocks: &mut Vec<RawBlock>) {
    let text = buffer.trim();
    if !text.is_empty() {
        blocks.push(RawBlock::text(text, headers.to_vec()));
    }
    buffer.clear();
}

fn resolve_image(reference: &str, base_dir: &Path) -> Option<PathBuf> {
    let reference = Path::new(reference);
    let candidate = if reference.is_absolute() {
        reference.to_path_buf()
    } else {
        base_dir.join(reference)
    };

    if !candidate.is_file() {
        return None;
    }
    Some(candidate.canonicalize().unwrap_or(candidate))
}

fn absolutize(path: &Path) -> Result<PathBuf, IngestError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Turns one source file into raw blocks, dispatching on the extension.
pub struct ContentExtractor {
    scanner: MarkdownScanner,
    pdf: Arc<dyn PdfConverter>,
    pdf_output_root: Option<PathBuf>,
}

impl ContentExtractor {
    pub fn new(
        pdf: Arc<dyn PdfConverter>,
        pdf_output_root: Option<PathBuf>,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            scanner: MarkdownScanner::new()?,
            pdf,
            pdf_output_root,
        })
    }

    pub async fn extract(&self, path: &Path) -> Result<Extraction, IngestError> {
        let path = absolutize(path)?;
        let extension = file_extension(&path).unwrap_or_default();
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        match extension.as_str() {
            "txt" => {
                let text = read_text(&path).await?;
                let mut extraction = Extraction::default();
                if !text.trim().is_empty() {
                    extraction.blocks.push(RawBlock::text(text, Vec::new()));
                }
                Ok(extraction)
            }
            "md" => {
                let text = read_text(&path).await?;
                Ok(self.scanner.scan(&text, &base_dir))
            }
            "pdf" => {
                let output_dir = self.pdf_output_dir(&path, &base_dir);
                let converted = self.pdf.convert(&path, &output_dir).await?;
                debug!(
                    pdf = %path.display(),
                    markdown = %converted.markdown_path.display(),
                    "pdf converted"
                );
                let text = read_text(&converted.markdown_path).await?;
                let markdown_dir = converted
                    .markdown_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or(output_dir);
                Ok(self.scanner.scan(&text, &markdown_dir))
            }
            ext if IMAGE_EXTENSIONS.contains(&ext) => Ok(Extraction {
                blocks: vec![RawBlock::image_placeholder(path.clone(), Vec::new())],
                images: vec![ImageReference {
                    path,
                    position: 0,
                    headers: Vec::new(),
                }],
            }),
            _ => Err(IngestError::UnsupportedFormat(if extension.is_empty() {
                path.display().to_string()
            } else {
                format!(".{extension}")
            })),
        }
    }

    fn pdf_output_dir(&self, pdf: &Path, base_dir: &Path) -> PathBuf {
        let stem = pdf
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("document");
        match &self.pdf_output_root {
            Some(root) => root.join(stem),
            None => base_dir.join(format!("{stem}{CONVERTED_DIR_SUFFIX}")),
        }
    }

    /// True for a directory this extractor writes PDF conversions into:
    /// `<stem>_converted` next to `<stem>.pdf`, or the configured output root.
    pub fn is_conversion_output(&self, dir: &Path) -> bool {
        if let Some(root) = &self.pdf_output_root {
            if same_dir(dir, root) {
                return true;
            }
        }

        let Some(stem) = dir
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_suffix(CONVERTED_DIR_SUFFIX))
        else {
            return false;
        };
        dir.parent()
            .is_some_and(|parent| parent.join(format!("{stem}.pdf")).is_file())
    }
}

fn same_dir(left: &Path, right: &Path) -> bool {
    match (left.canonicalize(), right.canonicalize()) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}

async fn read_text(path: &Path) -> Result<String, IngestError> {
    let bytes = tokio::fs::read(path).await?;
    decode_text(&bytes, path)
}
