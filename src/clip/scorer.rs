use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::Arc;
use std::time::Duration;

use super::backend::ScoringBackend;
use crate::config::ClipConfig;

/// Delay between failed scoring attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `initial + step * (attempt - 1)` after the n-th failed attempt.
    Linear { initial: Duration, step: Duration },
}

impl Backoff {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Linear { initial, step } => {
                initial + step.saturating_mul(attempt.saturating_sub(1))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn from_config(clip: &ClipConfig) -> Self {
        let initial = Duration::from_millis(clip.backoff_ms);
        let backoff = if clip.backoff_step_ms == 0 {
            Backoff::Fixed(initial)
        } else {
            Backoff::Linear {
                initial,
                step: Duration::from_millis(clip.backoff_step_ms),
            }
        };

        Self {
            max_attempts: clip.max_attempts.max(1),
            backoff,
        }
    }

    /// No delay between attempts. Used by tests and probes.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Backoff::Fixed(Duration::from_secs(1)),
        }
    }
}

/// Image-text scorer with bounded retry.
///
/// Never fails: once every attempt is spent the image scores 0.0, so a single
/// bad image cannot abort a search.
#[derive(Clone)]
pub struct ClipScorer {
    backend: Arc<dyn ScoringBackend>,
    policy: RetryPolicy,
}

impl ClipScorer {
    pub fn new(backend: Arc<dyn ScoringBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Score with the configured retry policy. Each failed attempt is reported
    /// through `on_warning`.
    pub fn score(&self, image: &[u8], prompt: &str, on_warning: &mut dyn FnMut(String)) -> f32 {
        self.score_with_policy(image, prompt, self.policy, on_warning)
    }

    pub fn score_with_policy(
        &self,
        image: &[u8],
        prompt: &str,
        policy: RetryPolicy,
        on_warning: &mut dyn FnMut(String),
    ) -> f32 {
        if image.is_empty() || prompt.trim().is_empty() {
            on_warning("CLIP skipped: empty image or prompt".to_string());
            return 0.0;
        }

        let encoded = BASE64.encode(image);
        let attempts = policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.backend.score_once(&encoded, prompt) {
                Ok(raw) => {
                    let score = clamp_score(raw);
                    tracing::debug!(attempt, raw, score, "CLIP score");
                    return score;
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts = attempts, error = %e, "CLIP attempt failed");
                    on_warning(e.to_string());
                }
            }

            if attempt < attempts {
                let delay = policy.backoff.delay(attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
        }

        0.0
    }
}

/// Clamp into [0, 1]. NaN scores as 0.0.
fn clamp_score(raw: f32) -> f32 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}
