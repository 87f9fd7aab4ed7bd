use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored code example. The `document` column holds the combined searchable
/// text the embedding is computed over; `embedding` stays NULL until the
/// background embedder has run.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Snippet {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: serde_json::Value,
    pub parameters: serde_json::Value,
    pub code: String,
    pub document: String,
    pub model_name: Option<String>,
}
