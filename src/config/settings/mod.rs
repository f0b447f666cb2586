
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::extractor::layout::ExtractionConfig;
use crate::index::builder::IndexingConfig;
use crate::retriever::RetrievalConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub chat_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "nomic-embed-text:latest".to_string(),
            chat_model: "llama3.1:8b".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid worker count: {0} (must be between 1 and 64)")]
    InvalidWorkerCount(usize),
    #[error("Invalid token budget: {0} (must be between 100 and 100000)")]
    InvalidTokenBudget(usize),
    #[error("Invalid index chunk size: {0} bytes (must be between 1 KiB and 64 MiB)")]
    InvalidChunkSize(usize),
    #[error("Invalid retry attempts: {0} (must be between 1 and 100)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid retrieval weights: {0} + {1} must sum to 1.0")]
    InvalidWeights(f64, f64),
    #[error("Invalid candidate count: {0} (must be between 1 and 1000)")]
    InvalidCandidateCount(usize),
    #[error("Invalid header/footer margin: {0} (must be non-negative)")]
    InvalidMargin(f32),
    #[error("Invalid paragraph gap: {0} (must be positive)")]
    InvalidParagraphGap(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory (`~/.config/qadocs` on Linux)
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("qadocs"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load() -> Result<Self> {
        let dir = Self::config_dir().context("Failed to resolve configuration directory")?;
        Self::load_from(&dir)
    }

    #[inline]
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;

        let indexing = &self.indexing;
        if indexing.max_parallel_requests == 0 || indexing.max_parallel_requests > 64 {
            return Err(ConfigError::InvalidWorkerCount(
                indexing.max_parallel_requests,
            ));
        }
        if !(100..=100_000).contains(&indexing.target_tokens_per_batch) {
            return Err(ConfigError::InvalidTokenBudget(
                indexing.target_tokens_per_batch,
            ));
        }
        if !(1024..=64 * 1024 * 1024).contains(&indexing.max_chunk_bytes) {
            return Err(ConfigError::InvalidChunkSize(indexing.max_chunk_bytes));
        }
        if indexing.max_batch_retries == 0 || indexing.max_batch_retries > 100 {
            return Err(ConfigError::InvalidRetryAttempts(indexing.max_batch_retries));
        }

        let retrieval = &self.retrieval;
        if retrieval.lexical_weight < 0.0
            || retrieval.vector_weight < 0.0
            || (retrieval.lexical_weight + retrieval.vector_weight - 1.0).abs() > 1e-6
        {
            return Err(ConfigError::InvalidWeights(
                retrieval.lexical_weight,
                retrieval.vector_weight,
            ));
        }
        if retrieval.candidate_k == 0 || retrieval.candidate_k > 1000 {
            return Err(ConfigError::InvalidCandidateCount(retrieval.candidate_k));
        }

        let extraction = &self.extraction;
        if extraction.header_footer_margin < 0.0 {
            return Err(ConfigError::InvalidMargin(extraction.header_footer_margin));
        }
        if extraction.paragraph_gap <= 0.0 {
            return Err(ConfigError::InvalidParagraphGap(extraction.paragraph_gap));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Path of the SQLite database holding documents, index chunks and feedback
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("qadocs.db")
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }
}
