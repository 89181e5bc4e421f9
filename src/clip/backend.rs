//! Remote CLIP inference backends.

use serde::Serialize;
use serde_json::Value;

use crate::config::{ClipConfig, HttpConfig};
use crate::error::{Error, Result};
use crate::http::build_agent;

/// One image-text similarity call against an external model.
///
/// A single attempt only; retries belong to [`super::ClipScorer`].
pub trait ScoringBackend: Send + Sync {
    /// Score a base64-encoded image against `prompt`. The value may be
    /// outside [0, 1]; the scorer clamps it.
    fn score_once(&self, image_base64: &str, prompt: &str) -> Result<f32>;

    /// Get the backend name for display
    fn backend_name(&self) -> &'static str;
}

/// Hugging Face hosted inference for `sentence-transformers/clip-ViT-B-32`.
pub struct HuggingFaceClip {
    endpoint: String,
    api_token: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: InferenceInputs<'a>,
}

#[derive(Debug, Serialize)]
struct InferenceInputs<'a> {
    image: &'a str,
    text: &'a str,
}

impl HuggingFaceClip {
    pub fn new(endpoint: &str, api_token: Option<&str>, timeout_secs: u64) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            api_token: api_token.map(|t| t.to_string()),
            agent: build_agent(timeout_secs, crate::http::BROWSER_USER_AGENT),
        }
    }

    /// The token is passed explicitly; `clip.api_token` is only a fallback
    /// the caller may choose to forward.
    pub fn from_config(clip: &ClipConfig, http: &HttpConfig, api_token: Option<&str>) -> Self {
        Self::new(&clip.endpoint, api_token, http.timeout_secs)
    }
}

impl ScoringBackend for HuggingFaceClip {
    fn score_once(&self, image_base64: &str, prompt: &str) -> Result<f32> {
        let request = InferenceRequest {
            inputs: InferenceInputs {
                image: image_base64,
                text: prompt,
            },
        };

        let mut req = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json");

        if let Some(ref token) = self.api_token {
            req = req.set("Authorization", &format!("Bearer {}", token));
        }

        let response = match req.send_json(&request) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(Error::Inference(format!("CLIP error {}: {}", code, body.trim())));
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(Error::Inference(format!("CLIP exception: {}", transport)));
            }
        };

        let status = response.status();
        let body: Value = response
            .into_json()
            .map_err(|e| Error::Inference(format!("CLIP exception: {}", e)))?;

        parse_score(&body).ok_or_else(|| {
            Error::Inference(format!("CLIP error {}: unexpected response {}", status, body))
        })
    }

    fn backend_name(&self) -> &'static str {
        "Hugging Face CLIP"
    }
}

/// Extract the score from an inference response.
///
/// The hosted pipeline answers with a list of `{label, score}` entries; the
/// first entry is the prompt's. A first entry without `score` counts as 0.0.
/// Some deployments return a bare `{score}` object, accepted as well.
pub fn parse_score(body: &Value) -> Option<f32> {
    match body {
        Value::Array(entries) => {
            let first = entries.first()?;
            Some(
                first
                    .get("score")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0) as f32,
            )
        }
        Value::Object(map) => map.get("score").and_then(Value::as_f64).map(|s| s as f32),
        _ => None,
    }
}
