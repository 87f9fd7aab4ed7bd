use thiserror::Error;

use crate::completion::CompletionError;
use crate::embeddings::EmbeddingError;

#[derive(Error, Debug)]
pub enum ParacadError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Other error: {0}")]
    Other(String),
}
