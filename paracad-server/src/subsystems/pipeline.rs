//! Pipeline subsystem — text to executable CAD script, end to end
//!
//! Sequential composition of the other subsystems: parse the request text,
//! derive a retrieval query from the first instruction, pull the top-k
//! snippets, generate and refine the script, optionally write it to the
//! configured script directory for the operator to run inside the CAD host.
//! Execution inside the host is out of reach — the handoff is a file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use paracad_core::completion::{CompletionBackend, CompletionConfig, OllamaCompletionClient};
use paracad_core::embeddings::EmbeddingBackend;
use paracad_core::instruction::Instruction;
use paracad_core::models::GeneratedScript;
use paracad_core::ParacadConfig;
use sqlx::PgPool;

use crate::subsystems::{embedder, generate, parse, store};

/// Retrieval terms associated with each feature name.
fn feature_terms(feature: &str) -> &'static [&'static str] {
    match feature {
        "Extrude1" => &["extrude"],
        "Revolve1" => &["revolve", "sphere"],
        "Cut1" => &["cut"],
        "Fillet1" => &["fillet"],
        "Chamfer1" => &["chamfer"],
        "Shell1" => &["shell", "hollow"],
        "Sweep1" => &["sweep"],
        "Loft1" => &["loft"],
        "Mirror1" => &["mirror"],
        "Pattern1" => &["pattern"],
        "Draft1" => &["draft"],
        "Hole1" => &["hole"],
        "Thicken1" => &["thicken"],
        "Wrap1" => &["wrap"],
        _ => &[],
    }
}

/// Retrieval terms associated with each parameter name.
fn parameter_terms(parameter: &str) -> &'static [&'static str] {
    match parameter {
        "Length" => &["length", "height"],
        "Width" => &["width"],
        "Height" => &["height", "length"],
        "Diameter" => &["diameter", "circle"],
        "Radius" => &["radius", "circle"],
        "Thickness" => &["thickness"],
        "Angle" => &["angle"],
        _ => &[],
    }
}

/// Build the snippet-store query for an instruction.
///
/// Part name first, then the parameter and its mapped terms, then the
/// feature's mapped terms; deduplicated in order and capped at five terms so
/// one verbose instruction cannot drown the part name.
pub fn enhanced_search_query(instruction: &Instruction) -> String {
    let mut terms: Vec<String> = Vec::new();

    if !instruction.part.is_empty() {
        terms.push(instruction.part.clone());
    }

    if !instruction.parameter.is_empty() {
        terms.push(instruction.parameter.to_lowercase());
        terms.extend(parameter_terms(&instruction.parameter).iter().map(|s| s.to_string()));
    }

    terms.extend(feature_terms(&instruction.feature).iter().map(|s| s.to_string()));

    let mut unique: Vec<String> = Vec::new();
    for term in terms {
        if !unique.contains(&term) {
            unique.push(term);
        }
    }
    unique.truncate(5);

    unique.join(" ")
}

/// Write the script into the (shell-expanded) script directory as
/// `fusion_generated_<unix-ts>.py`.
pub fn save_script(code: &str, script_dir: &str) -> Result<PathBuf> {
    let expanded = shellexpand::tilde(script_dir).into_owned();
    let dir = Path::new(&expanded);
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create script directory {}", dir.display()))?;

    let filename = format!("fusion_generated_{}.py", chrono::Utc::now().timestamp());
    let path = dir.join(filename);
    std::fs::write(&path, code)
        .with_context(|| format!("Failed to write script to {}", path.display()))?;

    tracing::info!(path = %path.display(), "Saved generated script");
    Ok(path)
}

/// Run the full pipeline with explicit backends (testable without config).
pub async fn run_pipeline_with_backends(
    text: &str,
    save: bool,
    pool: &PgPool,
    config: &ParacadConfig,
    parser_backend: &dyn CompletionBackend,
    codegen_backend: &dyn CompletionBackend,
    embed_backend: &dyn EmbeddingBackend,
) -> Result<GeneratedScript> {
    // Step 1: text -> instructions
    let outcome =
        parse::parse_instructions(text, parser_backend, config.parser.max_instructions).await?;

    // Step 2: retrieval query from the first instruction
    let search_query = enhanced_search_query(&outcome.instructions[0]);
    tracing::info!(query = %search_query, "Pipeline retrieval query");

    // Step 3: top-k snippets
    let matches = match embed_backend.embed_query(&search_query).await? {
        Some(vector) => {
            store::nearest_snippets(
                &pgvector::Vector::from(vector),
                config.retrieval.top_k as i64,
                pool,
            )
            .await?
        }
        None => {
            tracing::warn!("Embedding unavailable — generating without retrieved examples");
            Vec::new()
        }
    };
    tracing::info!(count = matches.len(), "Retrieved examples");

    // Step 4: generate + refine
    let code = generate::generate_code(&outcome.instructions, &matches, codegen_backend).await?;

    // Step 5: persist for the CAD host, if asked
    let saved_path = if save {
        Some(
            save_script(&code, &config.pipeline.script_dir)?
                .display()
                .to_string(),
        )
    } else {
        None
    };

    Ok(GeneratedScript {
        code,
        instructions: outcome.instructions,
        search_query,
        examples_used: matches.len(),
        model: codegen_backend.model().to_string(),
        created_at: chrono::Utc::now(),
        saved_path,
    })
}

/// Run the full pipeline with backends built from the application config.
pub async fn run_pipeline(
    text: &str,
    save: bool,
    pool: &PgPool,
    config: &ParacadConfig,
) -> Result<GeneratedScript> {
    let parser_backend = OllamaCompletionClient::new(parser_completion_config(config))?;
    let codegen_backend = OllamaCompletionClient::new(codegen_completion_config(config))?;
    let embed_backend = embedder::create_query_backend(config)?;

    run_pipeline_with_backends(
        text,
        save,
        pool,
        config,
        &parser_backend,
        &codegen_backend,
        embed_backend.as_ref(),
    )
    .await
}

/// Completion settings for the parser model: short, deterministic output.
pub fn parser_completion_config(config: &ParacadConfig) -> CompletionConfig {
    CompletionConfig {
        base_url: config.ollama.base_url.clone(),
        model: config.parser.model.clone(),
        temperature: 0.1,
        num_predict: 512,
        timeout_seconds: 30,
        max_retries: config.parser.max_retries as usize,
        retry_delay_ms: 1000,
    }
}

/// Completion settings for the coder model.
pub fn codegen_completion_config(config: &ParacadConfig) -> CompletionConfig {
    CompletionConfig {
        base_url: config.ollama.base_url.clone(),
        model: config.generation.model.clone(),
        temperature: config.generation.temperature,
        num_predict: config.generation.num_predict,
        timeout_seconds: config.generation.timeout_seconds,
        max_retries: config.generation.max_retries as usize,
        retry_delay_ms: 1000,
    }
}

// ============================================================================
// TESTS
// ============================================================================
