use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub arena: ArenaConfig,

    #[serde(default)]
    pub clip: ClipConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub search: SearchDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    #[serde(default = "default_arena_base_url")]
    pub base_url: String,
}

fn default_arena_base_url() -> String {
    "https://api.are.na/v2".to_string()
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            base_url: default_arena_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    #[serde(default = "default_clip_endpoint")]
    pub endpoint: String,

    /// Bearer token for the inference endpoint. `--token` and
    /// `ARENA_LENS_HF_TOKEN` take precedence.
    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Extra delay added per retry. Zero keeps the backoff fixed.
    #[serde(default)]
    pub backoff_step_ms: u64,
}

fn default_clip_endpoint() -> String {
    "https://api-inference.huggingface.co/models/sentence-transformers/clip-ViT-B-32".to_string()
}

fn default_max_attempts() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            endpoint: default_clip_endpoint(),
            api_token: None,
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            backoff_step_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout for Are.na and inference calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for downloading block images.
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,

    /// Some image hosts reject default client agents.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_image_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    crate::http::BROWSER_USER_AGENT.to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            image_timeout_secs: default_image_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDefaults {
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    #[serde(default = "default_max_channels")]
    pub max_channels: usize,

    #[serde(default = "default_max_blocks_per_channel")]
    pub max_blocks_per_channel: usize,

    /// Worker threads for fetch+score within a channel. 1 keeps the run sequential.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

fn default_threshold() -> f32 {
    0.3
}

fn default_max_channels() -> usize {
    5
}

fn default_max_blocks_per_channel() -> usize {
    20
}

fn default_parallelism() -> usize {
    1
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_channels: default_max_channels(),
            max_blocks_per_channel: default_max_blocks_per_channel(),
            parallelism: default_parallelism(),
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults there on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Pick the inference token: explicit flag, then environment, then file.
    /// Blank values are ignored.
    pub fn resolve_api_token(&self, flag: Option<&str>, env: Option<String>) -> Option<String> {
        flag.map(|t| t.to_string())
            .into_iter()
            .chain(env)
            .chain(self.clip.api_token.clone())
            .map(|t| t.trim().to_string())
            .find(|t| !t.is_empty())
    }

    /// Copy with the token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.clip.api_token.is_some() {
            config.clip.api_token = Some("***".to_string());
        }
        config
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("arena-lens")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
