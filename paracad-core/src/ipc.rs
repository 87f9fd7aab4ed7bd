use serde::{Deserialize, Serialize};

use crate::instruction::Instruction;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ParacadRequest {
    Ping,
    Health,
    Parse {
        text: String,
    },
    AddSnippet {
        payload: serde_json::Value,
    },
    Search {
        query: String,
        limit: Option<u32>,
    },
    ListSnippets,
    DeleteSnippet {
        id: uuid::Uuid,
    },
    Stats,
    Generate {
        instructions: Vec<Instruction>,
    },
    Run {
        text: String,
        #[serde(default)]
        save: bool,
    },
    Embed {
        id: uuid::Uuid,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ParacadResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl ParacadResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }
}
