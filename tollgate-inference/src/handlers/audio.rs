//! Text-to-speech and speech recognition.

use serde_json::{Value, json};
use tollgate::error::GatewayError;
use tollgate::pricing::TokenUsage;

use super::{BinaryOutput, JsonOutput, tokens_for_text};
use crate::fallback::{FailureClass, ProviderFailure, classify};
use crate::providers::Providers;

/// Fixed output-side margin added to speech recognition estimates.
const ASR_OUTPUT_MARGIN: u64 = 50;

/// Bytes of input audio treated as one second-token.
const ASR_BYTES_PER_TOKEN: u64 = 16_000;

/// Maps a single-provider failure onto a gateway error, honoring the
/// loading short-circuit.
fn provider_error(failure: &ProviderFailure) -> GatewayError {
    match classify(failure) {
        FailureClass::StopLoading => GatewayError::Unavailable(format!(
            "model is loading on {}; try again in 20-30 seconds",
            failure.provider
        )),
        FailureClass::Skip | FailureClass::Fatal => GatewayError::Upstream(format!(
            "{}: {}",
            failure.provider, failure.message
        )),
    }
}

/// Synthesizes speech for the request text, returning WAV bytes.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidInput`] without text, otherwise the
/// provider error.
pub async fn text_to_speech(
    providers: &Providers,
    model_id: &str,
    body: &Value,
) -> Result<BinaryOutput, GatewayError> {
    let text = body
        .get("text")
        .or_else(|| body.get("inputs"))
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidInput("'text' is required".into()))?;

    let (bytes, _) = providers
        .hf_provider_call("hf-inference", model_id, &json!({ "inputs": text }))
        .await
        .map_err(|e| provider_error(&e))?;

    Ok(BinaryOutput {
        content_type: "audio/wav".to_owned(),
        bytes,
        usage: TokenUsage::new(tokens_for_text(text), 0),
    })
}

/// Transcribes input audio, returning `{ "text": ... }`.
///
/// The audio arrives base64-encoded in the JSON body (`audio`) or as the
/// raw request body, already decoded by the HTTP layer.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidInput`] without audio, otherwise the
/// provider error.
pub async fn speech_to_text(
    providers: &Providers,
    model_id: &str,
    audio: Vec<u8>,
) -> Result<JsonOutput, GatewayError> {
    if audio.is_empty() {
        return Err(GatewayError::InvalidInput("audio body is required".into()));
    }
    let audio_len = audio.len() as u64;

    let bytes = providers
        .hf_provider_call_bytes("hf-inference", model_id, audio, "audio/wav")
        .await
        .map_err(|e| provider_error(&e))?;

    let parsed: Value = serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::Upstream(format!("transcription parse: {e}")))?;
    let text = parsed
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    Ok(JsonOutput {
        body: json!({ "text": text }),
        usage: TokenUsage::new(audio_len.div_ceil(ASR_BYTES_PER_TOKEN), ASR_OUTPUT_MARGIN),
    })
}
