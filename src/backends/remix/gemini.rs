// SPDX-License-Identifier: MPL-2.0

//! Gemini `generateContent` remix backend

use super::{RemixRequest, RemixService};
use crate::backends::cloud::http_client;
use crate::constants::remix::REQUEST_TIMEOUT;
use crate::errors::RemixError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// Closest aspect ratio the image model accepts to 4:5
const REQUESTED_ASPECT_RATIO: &str = "3:4";

/// Gemini image model client
#[derive(Clone)]
pub struct GeminiRemix {
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiRemix {
    pub fn new(endpoint: &str, model: &str, api_key: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl std::fmt::Debug for GeminiRemix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiRemix")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

/// First inline image of the first candidate
fn extract_image(response: GenerateResponse) -> Result<Vec<u8>, RemixError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(RemixError::EmptyResponse)?;

    let data = candidate
        .content
        .into_iter()
        .flat_map(|content| content.parts)
        .find_map(|part| part.inline_data)
        .ok_or(RemixError::NoImage)?
        .data;

    STANDARD
        .decode(data.trim())
        .map_err(|e| RemixError::InvalidRaster(e.to_string()))
}

#[async_trait]
impl RemixService for GeminiRemix {
    async fn remix(&self, request: RemixRequest) -> Result<Vec<u8>, RemixError> {
        let body = json!({
            "contents": [{
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": request.mime_type,
                            "data": STANDARD.encode(&request.raster_bytes),
                        }
                    },
                    { "text": request.style.instruction() }
                ]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": REQUESTED_ASPECT_RATIO }
            }
        });

        debug!(model = %self.model, style = request.style.tag(), "Calling remix service");

        let response = http_client()
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RemixError::Request(format!("HTTP {}: {}", status, detail)));
        }

        let parsed: GenerateResponse = response.json().await?;
        extract_image(parsed)
    }
}
