use crate::subsystems::{embedder, generate, parse, pipeline, store};
use paracad_core::completion::{CompletionBackend, OllamaCompletionClient};
use paracad_core::ipc::{ParacadRequest, ParacadResponse};
use sqlx::PgPool;

/// Dispatch one IPC request to its subsystem.
pub async fn handle_request(
    request: ParacadRequest,
    pool: &PgPool,
    config: &paracad_core::ParacadConfig,
) -> ParacadResponse {
    match request {
        ParacadRequest::Ping => ParacadResponse::pong(),
        ParacadRequest::Health => {
            let pg_ver = match paracad_core::db::health_check(pool).await {
                Ok(v) => v,
                Err(e) => return ParacadResponse::err(format!("DB health check failed: {}", e)),
            };
            let vec_ver = match paracad_core::db::check_pgvector(pool).await {
                Ok(v) => v,
                Err(e) => return ParacadResponse::err(format!("pgvector check failed: {}", e)),
            };
            ParacadResponse::ok(serde_json::json!({
                "postgresql": pg_ver,
                "pgvector": vec_ver,
                "status": "healthy"
            }))
        }
        ParacadRequest::Parse { text } => {
            let backend = match OllamaCompletionClient::new(pipeline::parser_completion_config(config)) {
                Ok(b) => b,
                Err(e) => return ParacadResponse::err(e.to_string()),
            };
            match parse::parse_instructions(&text, &backend, config.parser.max_instructions).await {
                Ok(outcome) => match serde_json::to_value(&outcome) {
                    Ok(data) => ParacadResponse::ok(data),
                    Err(e) => ParacadResponse::err(e.to_string()),
                },
                Err(e) => ParacadResponse::err(e.to_string()),
            }
        }
        ParacadRequest::AddSnippet { payload } => {
            match store::add_snippet(payload, pool, Some(config)).await {
                Ok(id) => ParacadResponse::ok(serde_json::json!({
                    "stored": true,
                    "id": id
                })),
                Err(e) => ParacadResponse::err(e.to_string()),
            }
        }
        ParacadRequest::Search { query, limit } => {
            let backend = match embedder::create_query_backend(config) {
                Ok(b) => b,
                Err(e) => return ParacadResponse::err(e.to_string()),
            };
            match store::search_snippets(&query, limit, pool, backend.as_ref(), &config.retrieval)
                .await
            {
                Ok(data) => ParacadResponse::ok(data),
                Err(e) => ParacadResponse::err(e.to_string()),
            }
        }
        ParacadRequest::ListSnippets => match store::list_snippets(pool).await {
            Ok(snippets) => ParacadResponse::ok(serde_json::json!({
                "count": snippets.len(),
                "snippets": snippets
            })),
            Err(e) => ParacadResponse::err(e.to_string()),
        },
        ParacadRequest::DeleteSnippet { id } => match store::delete_snippet(id, pool).await {
            Ok(deleted) => ParacadResponse::ok(serde_json::json!({
                "deleted": deleted,
                "id": id
            })),
            Err(e) => ParacadResponse::err(e.to_string()),
        },
        ParacadRequest::Stats => match store::stats(pool).await {
            Ok(data) => ParacadResponse::ok(data),
            Err(e) => ParacadResponse::err(e.to_string()),
        },
        ParacadRequest::Generate { instructions } => {
            let backend = match OllamaCompletionClient::new(pipeline::codegen_completion_config(config)) {
                Ok(b) => b,
                Err(e) => return ParacadResponse::err(e.to_string()),
            };
            // Direct generation skips retrieval; callers that want examples
            // use Run.
            match generate::generate_code(&instructions, &[], &backend).await {
                Ok(code) => ParacadResponse::ok(serde_json::json!({
                    "code": code,
                    "model": backend.model()
                })),
                Err(e) => ParacadResponse::err(e.to_string()),
            }
        }
        ParacadRequest::Run { text, save } => {
            match pipeline::run_pipeline(&text, save, pool, config).await {
                Ok(script) => match serde_json::to_value(&script) {
                    Ok(data) => ParacadResponse::ok(data),
                    Err(e) => ParacadResponse::err(e.to_string()),
                },
                Err(e) => ParacadResponse::err(e.to_string()),
            }
        }
        ParacadRequest::Embed { id } => {
            let backend = match embedder::create_backend_from_config(config) {
                Ok(b) => b,
                Err(e) => return ParacadResponse::err(e.to_string()),
            };
            match embedder::embed_by_id(id, pool, backend.as_ref()).await {
                Ok(embedded) => ParacadResponse::ok(serde_json::json!({
                    "embedded": embedded,
                    "id": id
                })),
                Err(e) => ParacadResponse::err(e.to_string()),
            }
        }
    }
}
