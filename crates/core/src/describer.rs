use crate::traits::VisionModel;
use crate::ServiceError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Reply the vision model is told to give for decorative images.
pub const NO_CONTENT_SENTINEL: &str = "NO_MEANINGFUL_CONTENT";

/// Stands in for the description when the vision call fails.
pub const IMAGE_FAILURE_FALLBACK: &str = "image processing failed";

/// Produces a description for an image, or `None` when the image carries no
/// information worth indexing. Implementations never fail: a broken image
/// must not abort the document it belongs to.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image: &Path, context: Option<&str>) -> Option<String>;
}

pub struct VisionDescriber {
    model: Arc<dyn VisionModel>,
    min_chars: usize,
}

impl VisionDescriber {
    pub fn new(model: Arc<dyn VisionModel>, min_chars: usize) -> Self {
        Self { model, min_chars }
    }

    async fn try_describe(
        &self,
        image: &Path,
        context: Option<&str>,
    ) -> Result<Option<String>, ServiceError> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|error| ServiceError::ImageProcessing(format!("{}: {error}", image.display())))?;
        let data_url = format!("data:{};base64,{}", mime_type(image), STANDARD.encode(bytes));

        let answer = self
            .model
            .describe_image(&data_url, &build_prompt(context))
            .await?;
        Ok(interpret_answer(&answer, self.min_chars))
    }
}

#[async_trait]
impl ImageDescriber for VisionDescriber {
    async fn describe(&self, image: &Path, context: Option<&str>) -> Option<String> {
        match self.try_describe(image, context).await {
            Ok(description) => description,
            Err(error) => {
                warn!(image = %image.display(), %error, "image description failed");
                Some(IMAGE_FAILURE_FALLBACK.to_string())
            }
        }
    }
}

fn build_prompt(context: Option<&str>) -> String {
    let mut prompt = String::from(
        "The image comes from a document that is being indexed for question answering.\n",
    );

    if let Some(context) = context.filter(|context| !context.trim().is_empty()) {
        prompt.push_str("Text surrounding the image:\n---\n");
        prompt.push_str(context);
        prompt.push_str("\n---\n");
    }

    prompt.push_str(&format!(
        "If the image is purely decorative (a logo, icon, divider, background or an \
         empty frame) and carries no information, reply with exactly {NO_CONTENT_SENTINEL}.\n\
         Otherwise describe the information it conveys, such as charts, tables, diagrams, \
         screenshots or photos, and relate it to the surrounding text where that helps."
    ));
    prompt
}

fn interpret_answer(answer: &str, min_chars: usize) -> Option<String> {
    let answer = answer.trim();
    if answer.contains(NO_CONTENT_SENTINEL) || answer.chars().count() < min_chars {
        return None;
    }
    Some(answer.to_string())
}

fn mime_type(path: &Path) -> &'static str {
    match crate::extractor::file_extension(path).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}
