use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::metadata::DEFAULT_FALLBACK_IMAGE;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&text)?;
        Ok(config)
    }

    /// 設定ファイルが無ければデフォルト設定で動かす
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::var("REDIS_URL").ok());
    }

    fn apply_overrides(&mut self, redis_url: Option<String>) {
        if let Some(url) = redis_url {
            self.store.redis_url = url;
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,
    pub store: StoreConfig,
    pub metadata: MetadataConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            store: StoreConfig::default(),
            metadata: MetadataConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            data_dir: "public/metadata".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    File,
    Memory,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub fallback_image: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            fallback_image: DEFAULT_FALLBACK_IMAGE.to_string(),
        }
    }
}
