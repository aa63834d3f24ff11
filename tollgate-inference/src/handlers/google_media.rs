//! Video and audio generation on the Google Veo and Lyria families.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde_json::{Value, json};
use tollgate::error::GatewayError;
use tollgate::pricing::TokenUsage;

use super::{BinaryOutput, JsonOutput, prompt_of};
use crate::providers::Providers;

/// Builds the `generateContent` request for a media modality.
fn media_request(prompt: &str, modality: &str, body: &Value) -> Value {
    let mut generation_config = json!({ "responseModalities": [modality] });
    if let Some(duration) = body.get("videoDuration") {
        generation_config["videoDuration"] = duration.clone();
    }
    if let Some(aspect_ratio) = body.get("aspectRatio") {
        generation_config["aspectRatio"] = aspect_ratio.clone();
    }
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": generation_config,
    })
}

/// The parts of the first candidate, if any.
fn candidate_parts(response: &Value) -> &[Value] {
    response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

/// Generates a video, returning `{ videoUrl, mimeType }`.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidInput`] without a prompt and
/// [`GatewayError::Upstream`] when the response carries no video.
pub async fn generate_video(
    providers: &Providers,
    model_id: &str,
    body: &Value,
) -> Result<JsonOutput, GatewayError> {
    let prompt = prompt_of(body)
        .ok_or_else(|| GatewayError::InvalidInput("'prompt' is required".into()))?;

    let response = providers
        .google_generate(model_id, &media_request(prompt, "VIDEO", body))
        .await?;

    let video = candidate_parts(&response)
        .iter()
        .find_map(|part| part.get("fileData"))
        .ok_or_else(|| GatewayError::Upstream("no video in provider response".into()))?;
    let url = video
        .get("fileUri")
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::Upstream("video part missing fileUri".into()))?;
    let mime_type = video
        .get("mimeType")
        .and_then(Value::as_str)
        .unwrap_or("video/mp4");

    Ok(JsonOutput {
        body: json!({ "videoUrl": url, "mimeType": mime_type }),
        usage: TokenUsage::default(),
    })
}

/// Generates audio, returning WAV bytes. The provider delivers audio
/// either inline (base64) or by URL; both shapes are handled.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidInput`] without a prompt and
/// [`GatewayError::Upstream`] when the response carries no audio.
pub async fn generate_audio(
    providers: &Providers,
    model_id: &str,
    body: &Value,
) -> Result<BinaryOutput, GatewayError> {
    let prompt = prompt_of(body)
        .ok_or_else(|| GatewayError::InvalidInput("'prompt' is required".into()))?;

    let response = providers
        .google_generate(model_id, &media_request(prompt, "AUDIO", body))
        .await?;
    let parts = candidate_parts(&response);

    let bytes = if let Some(inline) = parts.iter().find_map(|p| p.get("inlineData")) {
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Upstream("inline audio missing data".into()))?;
        b64.decode(data)
            .map_err(|e| GatewayError::Upstream(format!("inline audio decode: {e}")))?
    } else if let Some(file) = parts.iter().find_map(|p| p.get("fileData")) {
        let url = file
            .get("fileUri")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Upstream("audio part missing fileUri".into()))?;
        providers.fetch_bytes(url).await?
    } else {
        return Err(GatewayError::Upstream("no audio in provider response".into()));
    };

    Ok(BinaryOutput {
        content_type: "audio/wav".to_owned(),
        bytes,
        usage: TokenUsage::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderEndpoints;
    use tollgate::config::ProviderKeys;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn providers(server: &MockServer) -> Providers {
        Providers::new(
            reqwest::Client::new(),
            ProviderKeys {
                google: Some("g-key".into()),
                ..ProviderKeys::default()
            },
        )
        .with_endpoints(ProviderEndpoints {
            google: server.uri(),
            ..ProviderEndpoints::default()
        })
    }

    #[tokio::test]
    async fn video_request_carries_modality_and_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/veo-2.0-generate-001:generateContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(json!({
                "generationConfig": {
                    "responseModalities": ["VIDEO"],
                    "videoDuration": 8,
                    "aspectRatio": "16:9"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{
                        "fileData": { "fileUri": "https://files.example/v.mp4", "mimeType": "video/mp4" }
                    }] }
                }]
            })))
            .mount(&server)
            .await;

        let output = generate_video(
            &providers(&server),
            "veo-2.0-generate-001",
            &json!({ "prompt": "a gate", "videoDuration": 8, "aspectRatio": "16:9" }),
        )
        .await
        .unwrap();

        assert_eq!(output.body["videoUrl"], "https://files.example/v.mp4");
        assert_eq!(output.body["mimeType"], "video/mp4");
    }

    #[tokio::test]
    async fn inline_audio_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/lyria-realtime:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{
                        "inlineData": { "mimeType": "audio/wav", "data": b64.encode(b"RIFFdata") }
                    }] }
                }]
            })))
            .mount(&server)
            .await;

        let output = generate_audio(
            &providers(&server),
            "lyria-realtime",
            &json!({ "prompt": "calm piano" }),
        )
        .await
        .unwrap();
        assert_eq!(output.bytes, b"RIFFdata");
        assert_eq!(output.content_type, "audio/wav");
    }

    #[tokio::test]
    async fn audio_by_url_is_fetched() {
        let server = MockServer::start().await;
        let file_url = format!("{}/files/a.wav", server.uri());
        Mock::given(method("POST"))
            .and(path("/models/lyria-realtime:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{
                        "fileData": { "fileUri": file_url, "mimeType": "audio/wav" }
                    }] }
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/a.wav"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFFurl".as_slice()))
            .mount(&server)
            .await;

        let output = generate_audio(
            &providers(&server),
            "lyria-realtime",
            &json!({ "prompt": "calm piano" }),
        )
        .await
        .unwrap();
        assert_eq!(output.bytes, b"RIFFurl");
    }
}
