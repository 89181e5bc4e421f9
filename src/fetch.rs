//! Downloading block images.

use std::io::Read;

use crate::config::HttpConfig;
use crate::error::{describe_ureq, Error, Result};
use crate::http::build_agent;

/// Largest image body read into memory (32 MiB).
const MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;

/// Raw image payload with the content type the origin declared.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FetchedImage {
    /// Whether the origin declared a static image (`image/*`).
    pub fn is_image(&self) -> bool {
        self.content_type
            .trim_start()
            .to_ascii_lowercase()
            .starts_with("image/")
    }
}

pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

/// Plain HTTP GET with a browser-like User-Agent.
pub struct HttpImageSource {
    agent: ureq::Agent,
    max_bytes: u64,
}

impl HttpImageSource {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Self {
        Self {
            agent: build_agent(timeout_secs, user_agent),
            max_bytes: MAX_IMAGE_BYTES,
        }
    }

    pub fn from_config(http: &HttpConfig) -> Self {
        Self::new(http.image_timeout_secs, &http.user_agent)
    }

    /// Reject bodies larger than `max_bytes` instead of the 32 MiB default.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

/// Read at most `limit` bytes. `None` when the body is longer than that.
fn read_capped(reader: impl Read, limit: u64) -> std::io::Result<Option<Vec<u8>>> {
    let mut bytes = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        Ok(None)
    } else {
        Ok(Some(bytes))
    }
}

impl ImageSource for HttpImageSource {
    fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| Error::Fetch(format!("{}: {}", url, describe_ureq(e))))?;

        let content_type = response.header("Content-Type").unwrap_or("").to_string();

        let bytes = read_capped(response.into_reader(), self.max_bytes)
            .map_err(|e| Error::Fetch(format!("{}: {}", url, e)))?
            .ok_or_else(|| {
                Error::Fetch(format!("{}: body exceeds {} bytes", url, self.max_bytes))
            })?;

        Ok(FetchedImage {
            content_type,
            bytes,
        })
    }
}
