//! Language model integration.
//!
//! The model is an external collaborator: prompt text in, raw text out. The
//! core assumes nothing else about the provider. Failures map to
//! `ServiceUnavailable` or `QuotaExceeded` so the mode controller can
//! downgrade instead of failing the request.

pub mod mock;
pub mod openai;
pub mod parser;
pub mod prompt;
pub mod types;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, OpenAiConfig};
pub use parser::extract_sql;
pub use prompt::PromptBuilder;
pub use types::{Message, Role};

use async_trait::async_trait;

use crate::error::Result;

/// Trait for language model clients.
///
/// Implementations must be thread-safe (Send + Sync). A call is a single
/// blocking round trip; the contract allows one immediate retry on a
/// transient network failure and nothing more.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a completion for the given messages.
    ///
    /// Returns the raw response text, which may wrap the SQL in prose or
    /// markdown fencing; callers strip it with [`parser::extract_sql`].
    async fn generate(&self, messages: &[Message]) -> Result<String>;
}
