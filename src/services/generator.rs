use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Largest slice of an error body kept in a job's error message.
const MAX_ERROR_BODY: usize = 512;

/// Image returned by a generation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    /// Hosted image the backend already published.
    Url(String),
    /// Inline image payload.
    Bytes { mime_type: String, data: Vec<u8> },
}

impl GeneratedImage {
    /// URL stored on the job. Inline bytes become a `data:` URL.
    pub fn into_image_url(self) -> String {
        match self {
            GeneratedImage::Url(url) => url,
            GeneratedImage::Bytes { mime_type, data } => format!(
                "data:{};base64,{}",
                mime_type,
                base64::engine::general_purpose::STANDARD.encode(data)
            ),
        }
    }
}

/// Boundary to an external image generation service.
///
/// Implementations hold no per-job state and may be called concurrently.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError>;
}

/// Run a generation call, failing with [`GenerationError::Timeout`] once
/// `deadline` elapses.
pub async fn generate_with_deadline(
    generator: &dyn ImageGenerator,
    prompt: &str,
    deadline: Duration,
) -> Result<GeneratedImage, GenerationError> {
    match tokio::time::timeout(deadline, generator.generate(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(deadline)),
    }
}

/// Client for the Gemini `generateContent` API with image output.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(GenerationError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        let request_body = serde_json::json!({
            "contents": [{
                "parts": [{ "text": format!("Generate an image: {}", prompt) }]
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "temperature": 1,
                "topK": 40,
                "topP": 0.95
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(GenerationError::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(GenerationError::Http)?;

        if !status.is_success() {
            return Err(GenerationError::Api {
                status,
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        parse_generate_response(&body)
    }
}

/// Extract the first inline image from a `generateContent` response body.
fn parse_generate_response(body: &str) -> Result<GeneratedImage, GenerationError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::Malformed(format!("unparseable response: {}", e)))?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::Rejected(format!("prompt blocked: {}", reason)));
    }

    let inline = parsed
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|c| c.parts.iter())
        .find_map(|p| p.inline_data.as_ref());

    let Some(inline) = inline else {
        let refusal = parsed
            .candidates
            .iter()
            .filter_map(|c| c.finish_reason.as_deref())
            .find(|r| matches!(*r, "SAFETY" | "PROHIBITED_CONTENT" | "IMAGE_SAFETY" | "BLOCKLIST"));

        return Err(match refusal {
            Some(reason) => GenerationError::Rejected(format!("generation stopped: {}", reason)),
            None => GenerationError::Malformed("No image generated in response".to_string()),
        });
    };

    let data = base64::engine::general_purpose::STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| GenerationError::Malformed(format!("invalid base64 image data: {}", e)))?;

    image::guess_format(&data)
        .map_err(|_| GenerationError::Malformed("response payload is not an image".to_string()))?;

    Ok(GeneratedImage::Bytes {
        mime_type: inline.mime_type.clone(),
        data,
    })
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Generation API error (status {status}): {body}")]
    Api { status: StatusCode, body: String },

    #[error("Prompt rejected by generation service: {0}")]
    Rejected(String),

    #[error("Malformed generation response: {0}")]
    Malformed(String),

    #[error("Generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl GenerationError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Http(_) | GenerationError::Timeout(_) => true,
            GenerationError::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            GenerationError::Rejected(_) | GenerationError::Malformed(_) => false,
        }
    }
}
