//! CLIP (Contrastive Language-Image Pre-training) scoring
//!
//! Image-text similarity is delegated to a hosted model; this module owns the
//! transport adapter and the retry policy around it.

mod backend;
mod scorer;

pub use backend::{parse_score, HuggingFaceClip, ScoringBackend};
pub use scorer::{Backoff, ClipScorer, RetryPolicy};
