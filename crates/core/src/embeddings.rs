use crate::ServiceError;
use async_trait::async_trait;

pub use crate::config::DEFAULT_EMBEDDING_DIMENSIONS;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}

/// Rejects vectors that would break the fixed-dimension index mapping.
pub fn check_dimensions(vector: &[f32], expected: usize) -> Result<(), ServiceError> {
    if vector.len() != expected {
        return Err(ServiceError::Malformed {
            service: "embedding",
            details: format!("embedding dimension {} != {}", vector.len(), expected),
        });
    }
    Ok(())
}
