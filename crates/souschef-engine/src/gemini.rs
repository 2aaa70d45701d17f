use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};
use souschef_contracts::errors::ProviderError;

use crate::providers::{ContentProvider, MediaBytes, TextPurpose, TextRequest};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const SAFETY_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "IMAGE_SAFETY",
];

pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    voice: String,
    timeout: Duration,
    transport_retries: usize,
    retry_backoff: Duration,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(api_base: &str, api_key: Option<String>, voice: &str, timeout: Duration) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key: api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            voice: voice.to_string(),
            timeout,
            transport_retries: 1,
            retry_backoff: Duration::from_millis(1200),
            http: HttpClient::new(),
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential)
    }

    fn endpoint_for_model(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    /// Retries only connection-level failures; HTTP errors are classified by
    /// the caller.
    fn post_with_transport_retries(
        &self,
        endpoint: &str,
        payload: &Value,
    ) -> Result<HttpResponse, ProviderError> {
        let api_key = self.api_key()?;
        let mut attempt = 0;
        loop {
            let response = self
                .http
                .post(endpoint)
                .query(&[("key", api_key)])
                .timeout(self.timeout)
                .json(payload)
                .send();
            match response {
                Ok(ok) => return Ok(ok),
                Err(err) => {
                    let retryable = err.is_timeout() || err.is_connect() || err.is_request();
                    if !retryable || attempt >= self.transport_retries {
                        return Err(ProviderError::Transient(format!(
                            "Gemini request failed ({}): {err}",
                            redact_endpoint(endpoint)
                        )));
                    }
                    attempt += 1;
                    thread::sleep(self.retry_backoff * attempt as u32);
                }
            }
        }
    }

    fn call(&self, model: &str, method: &str, payload: &Value) -> Result<Value, ProviderError> {
        let endpoint = self.endpoint_for_model(model, method);
        let response = self.post_with_transport_retries(&endpoint, payload)?;
        response_json_or_error(response)
    }
}

impl ContentProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn credential_ready(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate_text(&self, request: &TextRequest<'_>) -> Result<String, ProviderError> {
        let mut parts = Vec::new();
        if let Some(image) = request.image.filter(|image| !image.is_empty()) {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.base64_data,
                }
            }));
        }
        parts.push(json!({ "text": request.prompt }));

        let mut generation_config = Map::new();
        generation_config.insert(
            "responseMimeType".to_string(),
            Value::String("application/json".to_string()),
        );
        generation_config.insert("temperature".to_string(), json!(request.temperature));
        if request.purpose == TextPurpose::Selection {
            generation_config.insert("candidateCount".to_string(), json!(1));
        }

        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        });
        let response = self.call(request.model, "generateContent", &payload)?;
        extract_text(&response)
    }

    fn generate_image(&self, model: &str, prompt: &str) -> Result<MediaBytes, ProviderError> {
        let payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["IMAGE"] },
        });
        let response = self.call(model, "generateContent", &payload)?;
        extract_inline_media(&response)
    }

    fn synthesize_speech(&self, model: &str, text: &str) -> Result<MediaBytes, ProviderError> {
        let payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": self.voice } }
                }
            },
        });
        let response = self.call(model, "generateContent", &payload)?;
        extract_inline_media(&response)
    }

    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError> {
        let payload = json!({
            "content": { "parts": [{ "text": text }] },
        });
        let response = self.call(model, "embedContent", &payload)?;
        extract_embedding(&response)
    }
}

fn response_json_or_error(response: HttpResponse) -> Result<Value, ProviderError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| {
            ProviderError::Transient(format!("Gemini response body read failed: {err}"))
        })?;
    if !status.is_success() {
        return Err(classify_http_error(code, &body));
    }
    serde_json::from_str(&body)
        .map_err(|err| {
            ProviderError::Transient(format!("Gemini returned invalid JSON payload: {err}"))
        })
}

pub(crate) fn classify_http_error(code: u16, body: &str) -> ProviderError {
    let detail = format!("Gemini request failed ({code}): {}", truncate_text(body, 512));
    if body.contains("API_KEY_INVALID")
        || body.contains("API key not valid")
        || code == 401
        || code == 403
    {
        return ProviderError::InvalidCredential(detail);
    }
    ProviderError::Transient(detail)
}

fn first_candidate(payload: &Value) -> Result<&Value, ProviderError> {
    if let Some(reason) = payload
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
    {
        return Err(ProviderError::Unsafe(reason.to_string()));
    }
    let candidate = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .ok_or_else(|| ProviderError::Transient("Gemini returned no candidates".to_string()))?;
    Ok(candidate)
}

fn candidate_parts(candidate: &Value) -> Vec<Value> {
    candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn safety_block(candidate: &Value) -> Option<String> {
    candidate
        .get("finishReason")
        .and_then(Value::as_str)
        .filter(|reason| SAFETY_FINISH_REASONS.contains(reason))
        .map(str::to_string)
}

/// Joins the text parts of the first candidate. Safety stops map to
/// `Unsafe` even when a partial answer was streamed.
pub(crate) fn extract_text(payload: &Value) -> Result<String, ProviderError> {
    let candidate = first_candidate(payload)?;
    if let Some(reason) = safety_block(candidate) {
        return Err(ProviderError::Unsafe(reason));
    }
    let text: String = candidate_parts(candidate)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("");
    if text.trim().is_empty() {
        return Err(ProviderError::Transient("Gemini returned an empty answer".to_string()));
    }
    Ok(text)
}

pub(crate) fn extract_inline_media(payload: &Value) -> Result<MediaBytes, ProviderError> {
    let candidate = first_candidate(payload)?;
    if let Some(reason) = safety_block(candidate) {
        return Err(ProviderError::Unsafe(reason));
    }
    for part in candidate_parts(candidate) {
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|err| {
                ProviderError::Transient(format!("Gemini media base64 decode failed: {err}"))
            })?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream")
            .to_string();
        return Ok(MediaBytes { bytes, mime_type });
    }
    Err(ProviderError::Transient("Gemini returned no media".to_string()))
}

pub(crate) fn extract_embedding(payload: &Value) -> Result<Vec<f32>, ProviderError> {
    let values = payload
        .get("embedding")
        .and_then(|embedding| embedding.get("values"))
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Transient("Gemini returned no embedding".to_string()))?;
    let vector: Vec<f32> = values
        .iter()
        .filter_map(Value::as_f64)
        .map(|value| value as f32)
        .collect();
    if vector.is_empty() || vector.len() != values.len() {
        return Err(ProviderError::Transient("Gemini embedding is malformed".to_string()));
    }
    Ok(vector)
}

fn redact_endpoint(endpoint: &str) -> &str {
    endpoint.split('?').next().unwrap_or(endpoint)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn endpoint_accepts_bare_and_prefixed_models() {
        let provider = GeminiProvider::new(
            "https://example.test/v1beta/",
            Some("key".to_string()),
            "Kore",
            Duration::from_secs(5),
        );
        assert_eq!(
            provider.endpoint_for_model("gemini-2.5-flash", "generateContent"),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            provider.endpoint_for_model("models/text-embedding-004", "embedContent"),
            "https://example.test/v1beta/models/text-embedding-004:embedContent"
        );
    }

    #[test]
    fn missing_key_is_reported_before_any_request() {
        let provider = GeminiProvider::new(
            DEFAULT_GEMINI_API_BASE,
            Some("  ".to_string()),
            "Kore",
            Duration::from_secs(5),
        );
        assert!(!provider.credential_ready());
        let err = provider.embed("text-embedding-004", "rice").err();
        assert_eq!(err, Some(ProviderError::MissingCredential));
    }

    #[test]
    fn extracts_joined_text() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"recipes\":" }, { "text": "[]}" }] },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(extract_text(&payload)?, "{\"recipes\":[]}");
        Ok(())
    }

    #[test]
    fn prompt_block_and_safety_stop_are_unsafe() {
        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert_eq!(
            extract_text(&blocked).err(),
            Some(ProviderError::Unsafe("SAFETY".to_string()))
        );

        let stopped = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "partial" }] },
                "finishReason": "PROHIBITED_CONTENT"
            }]
        });
        assert_eq!(
            extract_text(&stopped).err(),
            Some(ProviderError::Unsafe("PROHIBITED_CONTENT".to_string()))
        );
    }

    #[test]
    fn empty_answers_are_transient() {
        let payload = json!({ "candidates": [] });
        assert!(matches!(extract_text(&payload), Err(ProviderError::Transient(_))));
    }

    #[test]
    fn extracts_inline_media() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "here is your image" },
                    { "inlineData": {
                        "mimeType": "image/png",
                        "data": BASE64.encode(b"png-bytes")
                    } }
                ]}
            }]
        });
        let media = extract_inline_media(&payload)?;
        assert_eq!(media.mime_type, "image/png");
        assert_eq!(media.bytes, b"png-bytes".to_vec());
        Ok(())
    }

    #[test]
    fn extracts_embedding_values() -> anyhow::Result<()> {
        let payload = json!({ "embedding": { "values": [0.25, -0.5, 1.0] } });
        assert_eq!(extract_embedding(&payload)?, vec![0.25, -0.5, 1.0]);
        assert!(extract_embedding(&json!({ "embedding": { "values": ["x"] } })).is_err());
        Ok(())
    }

    #[test]
    fn http_errors_are_classified() {
        assert!(matches!(
            classify_http_error(400, r#"{"error":{"details":[{"reason":"API_KEY_INVALID"}]}}"#),
            ProviderError::InvalidCredential(_)
        ));
        assert!(matches!(
            classify_http_error(503, "overloaded"),
            ProviderError::Transient(_)
        ));
    }
}
