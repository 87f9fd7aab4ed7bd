pub mod completion;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod instruction;
pub mod ipc;
pub mod models;

pub use completion::{
    CompletionBackend, CompletionConfig, CompletionError, OllamaCompletionClient,
};
pub use config::ParacadConfig;
pub use embeddings::{
    create_backend, BackendConfig, EmbeddingBackend, EmbeddingConfig, EmbeddingError,
    FallbackEmbeddingClient, OllamaEmbeddingClient, OLLAMA_DIMENSIONS,
};
pub use error::ParacadError;
pub use instruction::{extract_json, screen_candidates, Instruction, InstructionError};
