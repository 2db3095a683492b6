use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::error::TransformError;
use crate::imaging::{placeholder_image, EncodedImage};
use crate::models::{DesignIntensity, StyleOption};
use crate::transform::{build_design_prompt, build_edit_prompt, ImageTransformer};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image";

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable(value: &serde_json::Value) -> String {
    let mut copy = value.clone();
    truncate_base64_in_json(&mut copy);
    copy.to_string()
}

pub struct GeminiClient {
    client: Client,
    /// `None` runs in demo mode: placeholders instead of API calls.
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            error!("❌ Could not build HTTP client with timeout ({}), using defaults", e);
            Client::new()
        });
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn is_demo(&self) -> bool { self.api_key.is_none() }

    async fn perform_api_call(&self, api_key: &str, image: &EncodedImage, prompt: &str, aspect_ratio: Option<&str>) -> Result<EncodedImage, TransformError> {
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, self.model, api_key);
        info!("🔗 Making request to: {}", url.replace(api_key, "***"));

        let mut generation_config = json!({ "responseModalities": ["TEXT", "IMAGE"] });
        if let Some(ratio) = aspect_ratio {
            generation_config["imageConfig"] = json!({ "aspectRatio": ratio });
        }
        let request_body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": image.mime_type(), "data": image.to_base64() } },
                    { "text": prompt }
                ]
            }],
            "generationConfig": generation_config
        });
        debug!("📤 Request body: {}", loggable(&request_body));

        let response = self.client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| TransformError::Http(e.to_string().replace(api_key, "***")))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ API Error response: {}", error_body);
            return Err(TransformError::Status { status: status.as_u16(), body: error_body });
        }

        let response_text = response.text().await
            .map_err(|e| TransformError::Http(e.to_string()))?;

        let parsed: GeminiResponse = serde_json::from_str(&response_text).map_err(|e| {
            let preview: String = response_text.chars().take(200).collect();
            TransformError::Other(format!("parse error: {}: {}", e, preview))
        })?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&response_text) {
                debug!("📥 Raw Gemini API response: {}", loggable(&value));
            }
        }

        let inline = extract_first_image(&parsed).ok_or(TransformError::EmptyResponse)?;
        let image = EncodedImage::from_base64(inline.mime_type.clone(), &inline.data)
            .map_err(|e| TransformError::Other(e.to_string()))?;
        if image.is_empty() {
            return Err(TransformError::EmptyResponse);
        }
        info!("🖼️ Extracted {} image from API response ({} bytes)", image.mime_type(), image.len());
        Ok(image)
    }

    fn placeholder(label: &str) -> Result<EncodedImage, TransformError> {
        placeholder_image(label).map_err(|e| TransformError::Other(e.to_string()))
    }
}

#[async_trait]
impl ImageTransformer for GeminiClient {
    async fn generate(&self, image: &EncodedImage, style: &StyleOption, intensity: DesignIntensity) -> Result<EncodedImage, TransformError> {
        let Some(api_key) = self.api_key.as_deref() else {
            info!("Using demo mode - placeholder for '{}'", style);
            return Self::placeholder(style.name());
        };
        let prompt = build_design_prompt(style, intensity);
        info!("🎯 Generating '{}' ({}) with prompt: {}", style, intensity, prompt.chars().take(100).collect::<String>());
        self.perform_api_call(api_key, image, &prompt, Some("16:9")).await
    }

    async fn edit(&self, image: &EncodedImage, instruction: &str) -> Result<EncodedImage, TransformError> {
        let Some(api_key) = self.api_key.as_deref() else {
            info!("Using demo mode - placeholder for edit");
            return Self::placeholder(instruction);
        };
        info!("✏️ Editing design: {}", instruction);
        self.perform_api_call(api_key, image, &build_edit_prompt(instruction), None).await
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize)]
#[serde(untagged)]
#[allow(dead_code)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text { text: String },
    Other(serde_json::Value)
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_first_image(resp: &GeminiResponse) -> Option<&InlineData> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Inline { inline_data } = p {
                return Some(inline_data);
            }
        }
    }
    info!("⚠️ No inline image data found in response structure");
    None
}
