use crate::models::{RerankedResult, IMAGE_DESCRIPTION_PREFIX};
use crate::traits::ChatCompletion;
use crate::ServiceError;
use std::sync::Arc;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the question from the \
provided references, formatted as markdown.
1. When you use a reference, cite its number in square brackets right after the statement, e.g. [1], [2].
2. When a reference is an image description, show the image inline with markdown image syntax using its img_url.
3. Finish with a reference list that summarises each cited reference with its source and location.

Reference list format:
---
[1] one-sentence summary [file_name](source) header
";

/// Builds the grounded prompt and returns the model's answer untouched.
pub struct AnswerGenerator {
    chat: Arc<dyn ChatCompletion>,
}

impl AnswerGenerator {
    pub fn new(chat: Arc<dyn ChatCompletion>) -> Self {
        Self { chat }
    }

    pub async fn generate(
        &self,
        query: &str,
        chunks: &[RerankedResult],
    ) -> Result<String, ServiceError> {
        let user_prompt = build_user_prompt(query, &build_context(chunks));
        self.chat.complete(SYSTEM_PROMPT, &user_prompt).await
    }
}

/// Numbered reference blocks, one per chunk, separated by blank lines.
pub fn build_context(chunks: &[RerankedResult]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(position, chunk)| {
            let result = &chunk.result;
            let metadata = &result.metadata;
            let mut header = format!("[{}] ", position + 1);
            if !metadata.chunk_header.is_empty() {
                header.push_str(&format!("【{}】", metadata.chunk_header));
            }

            match metadata.img_url.as_deref() {
                Some(img_url) if result.content.starts_with(IMAGE_DESCRIPTION_PREFIX) => {
                    format!("{header}{}\nimg_url: {img_url}", result.content)
                }
                _ => format!(
                    "{header}{}\nfile_name: {}\nsource: {}\nheader: {}",
                    result.content,
                    metadata.file_name,
                    metadata.source_path,
                    metadata.chunk_header
                ),
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_user_prompt(query: &str, context: &str) -> String {
    format!("References:\n{context}\n\nQuestion: {query}\n\nAnswer following the instructions.")
}
