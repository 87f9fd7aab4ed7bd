use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::instruction::Instruction;

/// Result of one pipeline run: the refined script plus everything that went
/// into producing it. The script itself is an opaque text blob handed to the
/// CAD host; there is no retention or versioning beyond the optional file on
/// disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedScript {
    pub code: String,
    pub instructions: Vec<Instruction>,
    pub search_query: String,
    pub examples_used: usize,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub saved_path: Option<String>,
}
