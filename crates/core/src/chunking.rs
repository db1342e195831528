use crate::config::IngestionOptions;
use crate::describer::ImageDescriber;
use crate::models::{
    join_headers, Chunk, ChunkMetadata, DocumentSource, Extraction, ImageReference, RawBlock,
    HEADER_SEPARATOR, IMAGE_DESCRIPTION_PREFIX, IMAGE_HEADER_MARKER,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// Resolves image placeholders and turns raw blocks into chunks.
pub struct Chunker {
    describer: Arc<dyn ImageDescriber>,
    concurrency: usize,
    context_chars: usize,
}

impl Chunker {
    pub fn new(describer: Arc<dyn ImageDescriber>, options: &IngestionOptions) -> Self {
        Self {
            describer,
            concurrency: options.image_concurrency.max(1),
            context_chars: options.image_context_chars,
        }
    }

    /// Every image is described concurrently; placeholders are only
    /// rewritten or removed once all descriptions are back.
    pub async fn resolve(&self, extraction: Extraction, source: &DocumentSource) -> Vec<Chunk> {
        let Extraction { mut blocks, images } = extraction;

        let jobs: Vec<(ImageReference, String)> = images
            .into_iter()
            .map(|image| {
                let context = image_context(&blocks, &image, self.context_chars);
                (image, context)
            })
            .collect();

        let describer = &self.describer;
        let outcomes: Vec<(ImageReference, Option<String>)> = stream::iter(jobs)
            .map(|(image, context)| async move {
                let description = describer.describe(&image.path, Some(&context)).await;
                (image, description)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut discarded = Vec::new();
        for (image, description) in outcomes {
            match description {
                None => discarded.push(image.position),
                Some(description) => {
                    if let Some(block) = blocks.get_mut(image.position) {
                        block.content = format!("{IMAGE_DESCRIPTION_PREFIX}{description}");
                        block.img_url = Some(image.path.to_string_lossy().to_string());
                        block.headers.push(IMAGE_HEADER_MARKER.to_string());
                    }
                }
            }
        }

        // Highest position first so earlier positions stay valid.
        discarded.sort_unstable_by(|left, right| right.cmp(left));
        discarded.dedup();
        for position in &discarded {
            if *position < blocks.len() {
                blocks.remove(*position);
            }
        }
        debug!(
            file = %source.file_name,
            discarded = discarded.len(),
            blocks = blocks.len(),
            "images resolved"
        );

        blocks
            .into_iter()
            .filter(|block| !block.content.trim().is_empty())
            .enumerate()
            .map(|(index, block)| into_chunk(index, block, source))
            .collect()
    }
}

fn into_chunk(index: usize, block: RawBlock, source: &DocumentSource) -> Chunk {
    Chunk {
        id: format!("chunk_{index}"),
        content: block.content,
        metadata: ChunkMetadata {
            file_name: source.file_name.clone(),
            source_path: source.source_path.clone(),
            chunk_header: join_headers(&block.headers),
            img_url: block.img_url,
        },
    }
}

/// Heading path plus the tail of the previous block and the head of the next.
pub fn image_context(blocks: &[RawBlock], image: &ImageReference, max_chars: usize) -> String {
    let mut parts = Vec::new();

    if !image.headers.is_empty() {
        parts.push(image.headers.join(HEADER_SEPARATOR));
    }

    if let Some(previous) = image
        .position
        .checked_sub(1)
        .and_then(|position| blocks.get(position))
    {
        let tail = last_chars(&previous.content, max_chars);
        if !tail.trim().is_empty() {
            parts.push(tail.to_string());
        }
    }

    if let Some(next) = blocks.get(image.position + 1) {
        let head = first_chars(&next.content, max_chars);
        if !head.trim().is_empty() {
            parts.push(head.to_string());
        }
    }

    parts.join("\n")
}

fn first_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

fn last_chars(text: &str, count: usize) -> &str {
    let total = text.chars().count();
    if total <= count {
        return text;
    }
    match text.char_indices().nth(total - count) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}
