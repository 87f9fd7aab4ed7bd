use config::{Config, File};
use serde::Deserialize;

use crate::error::ParacadError;

#[derive(Debug, Deserialize, Clone)]
pub struct ParacadConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub ollama: OllamaConfig,
    pub embedding: EmbeddingSettings,
    pub parser: ParserConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingSettings {
    pub model: String,
    pub dimensions: u32,
    pub backfill_batch_size: u32,
    pub backfill_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParserConfig {
    pub model: String,
    pub max_retries: u32,
    /// Responses with more parsed objects than this are treated as runaway
    /// generation and rejected outright.
    pub max_instructions: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            model: "gemma3:4b".to_string(),
            max_retries: 3,
            max_instructions: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub num_predict: u32,
    pub timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5-coder:7b".to_string(),
            temperature: 0.1,
            num_predict: 1500,
            timeout_seconds: 120,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    pub top_k: u32,
    pub max_limit: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_limit: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Directory generated scripts are written to. Supports `~` expansion.
    pub script_dir: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            script_dir: "./generated".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8791,
        }
    }
}

impl ParacadConfig {
    pub fn load(path: &str) -> Result<Self, ParacadError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        Ok(s.try_deserialize()?)
    }
}
