use serde::Deserialize;

use super::types::{Block, BlockKind, Channel};
use crate::config::{ArenaConfig, HttpConfig};
use crate::error::{describe_ureq, Error, Result};
use crate::http::build_agent;

/// Source of channels and their contents.
///
/// Implementations fetch only; they neither retry nor filter by block kind.
pub trait ChannelDirectory: Send + Sync {
    /// Search channels by keyword, returning at most `limit` of them.
    fn search_channels(&self, keyword: &str, limit: usize) -> Result<Vec<Channel>>;

    /// List up to `limit` blocks of one channel.
    fn fetch_blocks(&self, channel_slug: &str, limit: usize) -> Result<Vec<Block>>;
}

/// Are.na v2 REST client.
pub struct ArenaClient {
    base_url: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    channels: Vec<ChannelEntry>,
}

#[derive(Debug, Deserialize)]
struct ChannelEntry {
    slug: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    contents: Vec<BlockEntry>,
}

#[derive(Debug, Deserialize)]
struct BlockEntry {
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    image: Option<ImageEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    #[serde(default)]
    original: Option<ImageVersion>,
}

#[derive(Debug, Deserialize)]
struct ImageVersion {
    #[serde(default)]
    url: Option<String>,
}

impl From<ChannelEntry> for Channel {
    fn from(entry: ChannelEntry) -> Self {
        Channel {
            slug: entry.slug,
            title: entry.title.unwrap_or_default(),
        }
    }
}

impl From<BlockEntry> for Block {
    fn from(entry: BlockEntry) -> Self {
        Block {
            kind: BlockKind::from_class(entry.class.as_deref()),
            title: entry.title.filter(|t| !t.is_empty()),
            image_url: entry.image.and_then(|i| i.original).and_then(|o| o.url),
        }
    }
}

impl ArenaClient {
    pub fn new(base_url: &str, timeout_secs: u64, user_agent: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: build_agent(timeout_secs, user_agent),
        }
    }

    pub fn from_config(arena: &ArenaConfig, http: &HttpConfig) -> Self {
        Self::new(&arena.base_url, http.timeout_secs, &http.user_agent)
    }
}

impl ChannelDirectory for ArenaClient {
    fn search_channels(&self, keyword: &str, limit: usize) -> Result<Vec<Channel>> {
        let url = format!("{}/search/channels", self.base_url);
        tracing::debug!(%keyword, %url, "Searching Are.na channels");

        let response = self
            .agent
            .get(&url)
            .query("q", keyword)
            .call()
            .map_err(|e| Error::Search(describe_ureq(e)))?;

        let body: SearchResponse = response
            .into_json()
            .map_err(|e| Error::Search(format!("failed to parse search response: {}", e)))?;

        Ok(take_channels(body, limit))
    }

    fn fetch_blocks(&self, channel_slug: &str, limit: usize) -> Result<Vec<Block>> {
        let url = contents_url(&self.base_url, channel_slug);
        tracing::debug!(channel = %channel_slug, "Fetching channel contents");

        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| Error::Channel(format!("{}: {}", channel_slug, describe_ureq(e))))?;

        let body: ContentsResponse = response.into_json().map_err(|e| {
            Error::Channel(format!("{}: failed to parse contents: {}", channel_slug, e))
        })?;

        Ok(take_blocks(body, limit))
    }
}

fn contents_url(base_url: &str, channel_slug: &str) -> String {
    format!(
        "{}/channels/{}/contents",
        base_url,
        urlencoding::encode(channel_slug)
    )
}

fn take_channels(body: SearchResponse, limit: usize) -> Vec<Channel> {
    body.channels
        .into_iter()
        .take(limit)
        .map(Channel::from)
        .collect()
}

fn take_blocks(body: ContentsResponse, limit: usize) -> Vec<Block> {
    body.contents.into_iter().take(limit).map(Block::from).collect()
}
