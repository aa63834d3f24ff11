//! Per-task inference handlers.
//!
//! Every handler validates its required inputs, calls the backend(s), and
//! returns its payload together with the usage the gateway bills for.

use serde_json::Value;
use tollgate::pricing::TokenUsage;

pub mod audio;
pub mod embeddings;
pub mod google_media;
pub mod image;
pub mod text;

pub use audio::{speech_to_text, text_to_speech};
pub use embeddings::embed;
pub use google_media::{generate_audio, generate_video};
pub use image::generate_image;
pub use text::{ChatStream, FinishHook, stream_chat};

/// A single-shot binary result (image or audio bytes).
#[derive(Debug)]
pub struct BinaryOutput {
    /// Response content type.
    pub content_type: String,
    /// Response body.
    pub bytes: Vec<u8>,
    /// Usage-equivalents for cost estimation.
    pub usage: TokenUsage,
}

/// A single-shot JSON result.
#[derive(Debug)]
pub struct JsonOutput {
    /// Response body.
    pub body: Value,
    /// Usage-equivalents for cost estimation.
    pub usage: TokenUsage,
}

/// Pulls the prompt out of a request body, accepting both the `prompt`
/// and `inputs` conventions.
pub(crate) fn prompt_of(body: &Value) -> Option<&str> {
    body.get("prompt")
        .or_else(|| body.get("inputs"))
        .and_then(Value::as_str)
}

/// Estimates tokens from text length at four characters per token.
pub(crate) fn tokens_for_text(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}
