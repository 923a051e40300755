//! AI completion seam.
//!
//! Any failure here is recovered by callers as "no contribution"; a failed
//! generation never aborts a discussion round.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
/// Error taxonomy for the completion collaborator.
pub enum CompletionError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("empty completion")]
    Empty,
}

#[async_trait]
/// Black-box text generation capability. Retry policy, if any, lives behind
/// this seam, not in the orchestration core.
pub trait CompletionClient: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, CompletionError>;
}
