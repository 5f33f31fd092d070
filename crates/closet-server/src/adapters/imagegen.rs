//! Asset synthesis adapter (image -> stylized image)
//!
//! Sends the source image inline (base64) to a generateContent-style
//! endpoint requesting a stylized derivative, and scans the structured
//! response for an inline-encoded image part. A successful call that
//! carries no image part is a parse failure, reported distinctly from
//! transport errors.

use async_trait::async_trait;
use base64::Engine;
use closet_common::{Result, StageError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Stylized-derivative synthesis capability.
#[async_trait]
pub trait ImageGenAdapter: Send + Sync {
    /// Generate a stylized derivative of the given image bytes according to
    /// `instructions`. Returns decoded image bytes.
    async fn stylize(&self, image: &[u8], mime_type: &str, instructions: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
enum RequestPart<'a> {
    #[serde(rename = "text")]
    Text(&'a str),
    #[serde(rename = "inlineData", rename_all = "camelCase")]
    InlineData { mime_type: &'a str, data: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

/// Scan a generation response for the first inline-encoded image part and
/// decode it. Absence of such a part after a successful call is a fatal
/// parse condition.
fn extract_inline_image(response: &GenerateResponse) -> Result<Vec<u8>> {
    let encoded = response
        .candidates
        .iter()
        .flat_map(|c| c.content.parts.iter())
        .find_map(|p| p.inline_data.as_ref())
        .map(|d| d.data.as_str())
        .ok_or_else(|| StageError::adapter("No image returned from synthesis capability"))?;

    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| StageError::adapter(format!("Synthesis response image is not valid base64: {e}")))
}

/// Image generation adapter backed by a Gemini-compatible generateContent
/// API. The key travels as a query parameter, per that API's convention.
#[derive(Clone)]
pub struct GeminiImageGen {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl GeminiImageGen {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ImageGenAdapter for GeminiImageGen {
    #[instrument(skip(self, image, instructions))]
    async fn stylize(&self, image: &[u8], mime_type: &str, instructions: &str) -> Result<Vec<u8>> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);

        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![
                    RequestPart::Text(instructions),
                    RequestPart::InlineData {
                        mime_type,
                        data: encoded,
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["Text", "Image"],
            },
        };

        let response = self
            .http
            .post(&self.api_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| StageError::adapter(format!("Synthesis API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::adapter(format!("Synthesis API error: {body}")));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            StageError::adapter(format!("Synthesis API returned malformed JSON: {e}"))
        })?;

        let bytes = extract_inline_image(&parsed)?;
        debug!(bytes = bytes.len(), "Synthesized derivative received");

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn response_with_image(data: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here is your image"},
                        {"inlineData": {"mimeType": "image/png", "data": data}}
                    ]
                }
            }]
        })
    }

    #[test]
    fn extracts_first_inline_image_part() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"png-bytes");
        let response: GenerateResponse =
            serde_json::from_value(response_with_image(&encoded)).unwrap();

        let bytes = extract_inline_image(&response).unwrap();
        assert_eq!(bytes, b"png-bytes");
    }

    #[test]
    fn missing_inline_part_is_fatal_parse_error() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "no image, sorry"}]}}]
        }))
        .unwrap();

        let err = extract_inline_image(&response).unwrap_err();
        match err {
            StageError::Adapter { message } => {
                assert!(message.contains("No image returned"))
            }
            other => panic!("expected adapter error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_base64_is_adapter_error() {
        let response: GenerateResponse =
            serde_json::from_value(response_with_image("not-base64!!!")).unwrap();
        assert!(matches!(
            extract_inline_image(&response),
            Err(StageError::Adapter { .. })
        ));
    }

    #[tokio::test]
    async fn round_trips_through_http() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"sticker");
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("key", "gemini-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_with_image(&encoded)))
            .mount(&server)
            .await;

        let adapter = GeminiImageGen::new(server.uri(), "gemini-key");
        let bytes = adapter
            .stylize(b"source", "image/jpeg", "make it cute")
            .await
            .unwrap();
        assert_eq!(bytes, b"sticker");
    }

    #[tokio::test]
    async fn transport_error_is_distinct_from_missing_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
            .mount(&server)
            .await;

        let adapter = GeminiImageGen::new(server.uri(), "gemini-key");
        let err = adapter
            .stylize(b"source", "image/jpeg", "make it cute")
            .await
            .unwrap_err();
        match err {
            StageError::Adapter { message } => assert!(message.contains("backend exploded")),
            other => panic!("expected adapter error, got {other:?}"),
        }
    }
}
