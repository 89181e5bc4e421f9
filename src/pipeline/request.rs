use serde::{Deserialize, Serialize};

use crate::config::SearchDefaults;
use crate::error::{Error, Result};

/// Caller-supplied parameters of one search invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keyword: String,
    /// Minimum CLIP score, in (0, 1].
    pub threshold: f32,
    pub max_channels: usize,
    pub max_blocks_per_channel: usize,
    /// Worker threads for per-block fetch+score. 1 is sequential.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

fn default_parallelism() -> usize {
    1
}

impl SearchRequest {
    pub fn new(keyword: &str, threshold: f32) -> Self {
        let defaults = SearchDefaults::default();
        Self {
            keyword: keyword.to_string(),
            threshold,
            max_channels: defaults.max_channels,
            max_blocks_per_channel: defaults.max_blocks_per_channel,
            parallelism: defaults.parallelism,
        }
    }

    pub fn from_defaults(keyword: &str, defaults: &SearchDefaults) -> Self {
        Self {
            keyword: keyword.to_string(),
            threshold: defaults.threshold,
            max_channels: defaults.max_channels,
            max_blocks_per_channel: defaults.max_blocks_per_channel,
            parallelism: defaults.parallelism,
        }
    }

    pub fn with_limits(mut self, max_channels: usize, max_blocks_per_channel: usize) -> Self {
        self.max_channels = max_channels;
        self.max_blocks_per_channel = max_blocks_per_channel;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyword.trim().is_empty() {
            return Err(Error::InvalidRequest("Please enter a keyword.".into()));
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(Error::InvalidRequest(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.max_channels == 0 || self.max_blocks_per_channel == 0 {
            return Err(Error::InvalidRequest(
                "max_channels and max_blocks_per_channel must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Upper bound on blocks examined by one run.
    pub fn block_budget(&self) -> usize {
        self.max_channels.saturating_mul(self.max_blocks_per_channel)
    }
}

/// An image that cleared the threshold and decodes.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredImage {
    pub bytes: Vec<u8>,
    pub caption: String,
    pub score: f32,
    pub title: Option<String>,
    pub source_url: String,
    pub channel_slug: String,
}

/// `"{title}\nScore: 0.42"`, or only the score line when there is no title.
pub fn format_caption(title: Option<&str>, score: f32) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!("{}\nScore: {:.2}", title, score),
        None => format!("Score: {:.2}", score),
    }
}
