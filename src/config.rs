use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub space_key: String,
    pub username: String,
    /// Set via `QUARRY_SOURCE_TOKEN` rather than the config file.
    pub api_token: String,
    pub page_size: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            space_key: String::new(),
            username: String::new(),
            api_token: String::new(),
            page_size: 50,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Set via `QUARRY_LLM_API_KEY` rather than the config file.
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub embed_batch_size: usize,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-3-small".into(),
            max_tokens: 512,
            embed_batch_size: 16,
            max_retries: 3,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub qdrant_url: String,
    pub collection: String,
    pub state_path: String,
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub min_chars: usize,
    pub concurrency: usize,
    pub stale_labels: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            qdrant_url: "http://localhost:6334".into(),
            collection: "quarry_chunks".into(),
            state_path: "./data/quarry.db".into(),
            max_chars: 1800,
            overlap_chars: 200,
            min_chars: 20,
            concurrency: 4,
            stale_labels: vec!["outdated".into(), "deprecated".into()],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: usize,
    pub fan_out: usize,
    pub vector_weight: f32,
    pub title_weight: f32,
    pub content_weight: f32,
    pub include_stale: bool,
    pub stale_markers: Vec<String>,
    pub context_budget_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            fan_out: 4,
            vector_weight: 0.7,
            title_weight: 0.2,
            content_weight: 0.1,
            include_stale: false,
            stale_markers: vec!["[outdated]".into(), "[deprecated]".into()],
            context_budget_chars: 6000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_SOURCE_BASE_URL") {
            self.source.base_url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_SOURCE_SPACE") {
            self.source.space_key = v;
        }
        if let Ok(v) = std::env::var("QUARRY_SOURCE_USERNAME") {
            self.source.username = v;
        }
        if let Ok(v) = std::env::var("QUARRY_SOURCE_TOKEN") {
            self.source.api_token = v;
        }
        if let Ok(v) = std::env::var("QUARRY_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("QUARRY_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("QUARRY_QDRANT_URL") {
            self.index.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_STATE_PATH") {
            self.index.state_path = v;
        }
    }

    /// Check everything a real run needs before touching the network.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing or inconsistent value.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.source.base_url.is_empty(),
            "source.base_url is required (or QUARRY_SOURCE_BASE_URL)"
        );
        anyhow::ensure!(
            !self.source.space_key.is_empty(),
            "source.space_key is required (or QUARRY_SOURCE_SPACE)"
        );
        anyhow::ensure!(
            !self.llm.api_key.is_empty(),
            "llm.api_key is required (set QUARRY_LLM_API_KEY)"
        );
        anyhow::ensure!(
            self.index.overlap_chars < self.index.max_chars,
            "index.overlap_chars must be smaller than index.max_chars"
        );
        anyhow::ensure!(
            self.llm.request_timeout_secs > 0,
            "llm.request_timeout_secs must be positive"
        );
        anyhow::ensure!(self.query.top_k > 0, "query.top_k must be positive");
        Ok(())
    }
}
