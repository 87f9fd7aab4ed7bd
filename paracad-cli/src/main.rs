//! paracad — CLI frontend for the paracad server
//!
//! Talks to the server's HTTP API. The typical flow is `paracad run "<edit
//! request>" --save`, which parses the request, retrieves similar snippets,
//! generates a Fusion script, and drops it in the server's script directory;
//! the operator then runs that file from Fusion's Scripts and Add-Ins dialog.
//!
//! # Subcommands
//! - `run <text> [--save] [--output <path>] [--json]` — full pipeline
//! - `parse <text> [--json]`                          — text to instructions
//! - `search <query> [-n <limit>] [--json]`           — semantic snippet search
//! - `add --file <path> --title <t> [...]`            — store a snippet
//! - `list` / `delete <id>` / `stats` / `status`      — store management

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8791";
const DEFAULT_LIMIT: usize = 5;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "paracad",
    version,
    about = "Natural-language parametric CAD edits — paracad server frontend"
)]
struct Cli {
    /// Paracad HTTP server URL (overrides PARACAD_HTTP_URL env var)
    #[arg(long, env = "PARACAD_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full pipeline: text to generated CAD script
    Run {
        /// The edit request, e.g. "change cylinder length to 100mm"
        text: String,

        /// Ask the server to persist the script in its script directory
        #[arg(long)]
        save: bool,

        /// Also write the generated script to a local file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Parse an edit request into structured instructions
    Parse {
        /// The edit request text
        text: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Search stored snippets semantically
    Search {
        /// Query text to search for
        query: String,

        /// Maximum number of results to return
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Add a code snippet to the example store
    Add {
        /// File containing the snippet code
        #[arg(long)]
        file: PathBuf,

        /// Snippet title
        #[arg(long)]
        title: String,

        /// Snippet description
        #[arg(long, default_value = "")]
        description: String,

        /// Snippet category
        #[arg(long, default_value = "general")]
        category: String,

        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,
    },

    /// List all stored snippets
    List,

    /// Delete a snippet by id
    Delete {
        /// Snippet UUID
        id: String,
    },

    /// Show snippet store statistics
    Stats,

    /// Show paracad server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// A single snippet match from POST /search
#[derive(Debug, Deserialize)]
pub struct SnippetMatch {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub code: String,
    pub score: f64,
}

/// The full search response from POST /search
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SnippetMatch>,
    pub query: String,
    pub count: usize,
    pub took_ms: Option<u64>,
}

/// A parsed instruction from POST /parse
#[derive(Debug, Deserialize)]
pub struct ParsedInstruction {
    pub part: String,
    pub feature: String,
    pub parameter: String,
    pub new_value: Option<f64>,
    pub delta: Option<f64>,
    pub unit: String,
    pub confidence: f64,
}

/// The full parse response from POST /parse
#[derive(Debug, Deserialize)]
pub struct ParseResponse {
    pub instructions: Vec<ParsedInstruction>,
    pub rejected: usize,
    pub model: String,
}

/// The pipeline response from POST /run
#[derive(Debug, Deserialize)]
pub struct RunResponse {
    pub code: String,
    pub instructions: Vec<ParsedInstruction>,
    pub search_query: String,
    pub examples_used: usize,
    pub model: String,
    pub saved_path: Option<String>,
}

// ============================================================================
// Output formatting
// ============================================================================

/// One line per instruction: "shaft Extrude1 Diameter -> 35 mm (95%)".
pub fn render_instruction(i: &ParsedInstruction) -> String {
    let change = match (i.new_value, i.delta) {
        (Some(v), _) => format!("-> {} {}", v, i.unit),
        (None, Some(d)) if d >= 0.0 => format!("+{} {}", d, i.unit),
        (None, Some(d)) => format!("{} {}", d, i.unit),
        (None, None) => "?".to_string(),
    };
    format!(
        "{} {} {} {} ({:.0}%)",
        i.part,
        i.feature,
        i.parameter,
        change,
        i.confidence * 100.0
    )
}

/// Human-readable block for one search result.
pub fn render_match(m: &SnippetMatch) -> String {
    let preview: String = m.code.chars().take(200).collect();
    format!(
        "[{category}] {title}  ({score:.0}%)\n{id}\n{description}\n\n{preview}\n",
        category = m.category,
        title = m.title,
        score = m.score * 100.0,
        id = m.id,
        description = m.description,
        preview = preview,
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn post_json(
    server: &str,
    endpoint: &str,
    body: serde_json::Value,
    timeout_secs: u64,
) -> anyhow::Result<reqwest::blocking::Response> {
    let client = http_client(timeout_secs)?;
    let url = format!("{}{}", server, endpoint);

    let resp = match client.post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("paracad: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("paracad: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    Ok(resp)
}

/// Full pipeline: POST /run.
fn do_run(
    server: &str,
    text: &str,
    save: bool,
    output: Option<PathBuf>,
    json_output: bool,
) -> anyhow::Result<()> {
    // Generation chains two model calls; give it plenty of rope.
    let resp = post_json(
        server,
        "/run",
        serde_json::json!({ "text": text, "save": save }),
        300,
    )?;

    if json_output {
        let raw: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    let run: RunResponse = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("paracad: failed to parse run response: {}", e);
            std::process::exit(1);
        }
    };

    println!("Instructions:");
    for i in &run.instructions {
        println!("  {}", render_instruction(i));
    }
    println!(
        "\nRetrieved {} example(s) for query \"{}\" — generated with {}",
        run.examples_used, run.search_query, run.model
    );
    println!("\n{}\n{}\n{}", "-".repeat(60), run.code, "-".repeat(60));

    if let Some(path) = &run.saved_path {
        println!("\nSaved on server: {}", path);
        println!("Run it from Fusion 360: Scripts and Add-Ins > Run Script");
    }

    if let Some(path) = output {
        std::fs::write(&path, &run.code)?;
        println!("Written locally: {}", path.display());
    }

    Ok(())
}

/// POST /parse.
fn do_parse(server: &str, text: &str, json_output: bool) -> anyhow::Result<()> {
    let resp = post_json(server, "/parse", serde_json::json!({ "text": text }), 60)?;

    if json_output {
        let raw: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    let parsed: ParseResponse = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("paracad: failed to parse response: {}", e);
            std::process::exit(1);
        }
    };

    for i in &parsed.instructions {
        println!("{}", render_instruction(i));
    }
    if parsed.rejected > 0 {
        eprintln!("({} candidate(s) rejected by schema validation)", parsed.rejected);
    }

    Ok(())
}

/// POST /search.
fn do_search(server: &str, query: &str, limit: usize, json_output: bool) -> anyhow::Result<()> {
    let resp = post_json(
        server,
        "/search",
        serde_json::json!({ "query": query, "limit": limit }),
        60,
    )?;

    if json_output {
        let raw: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    let search: SearchResponse = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("paracad: failed to parse search response: {}", e);
            std::process::exit(1);
        }
    };

    if search.results.is_empty() {
        eprintln!("No results found for: {}", search.query);
        return Ok(());
    }

    for m in &search.results {
        println!("{}", render_match(m));
    }
    if let Some(ms) = search.took_ms {
        eprintln!("{} result(s) in {} ms", search.count, ms);
    }

    Ok(())
}

/// POST /snippets.
fn do_add(
    server: &str,
    file: &PathBuf,
    title: &str,
    description: &str,
    category: &str,
    tags: &str,
) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(file)?;
    let tags: Vec<&str> = tags
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let resp = post_json(
        server,
        "/snippets",
        serde_json::json!({
            "code": code,
            "title": title,
            "description": description,
            "category": category,
            "tags": tags,
        }),
        30,
    )?;

    let body: serde_json::Value = resp.json()?;
    println!(
        "Stored snippet {} ({} chars)",
        body["id"].as_str().unwrap_or("?"),
        code.len()
    );

    Ok(())
}

/// GET /snippets.
fn do_list(server: &str) -> anyhow::Result<()> {
    let client = http_client(30)?;
    let url = format!("{}/snippets", server);

    let resp = client.get(&url).send()?;
    if !resp.status().is_success() {
        eprintln!("paracad: server returned {}", resp.status());
        std::process::exit(1);
    }

    let body: serde_json::Value = resp.json()?;
    let empty = Vec::new();
    let snippets = body["snippets"].as_array().unwrap_or(&empty);

    if snippets.is_empty() {
        println!("Store is empty.");
        return Ok(());
    }

    for s in snippets {
        println!(
            "[{}] {}  {}",
            s["category"].as_str().unwrap_or("?"),
            s["title"].as_str().unwrap_or("?"),
            s["id"].as_str().unwrap_or("?"),
        );
    }
    println!("\n{} snippet(s)", snippets.len());

    Ok(())
}

/// DELETE /snippets/{id}.
fn do_delete(server: &str, id: &str) -> anyhow::Result<()> {
    let client = http_client(30)?;
    let url = format!("{}/snippets/{}", server, id);

    let resp = client.delete(&url).send()?;
    if !resp.status().is_success() {
        eprintln!("paracad: server returned {}", resp.status());
        std::process::exit(1);
    }

    let body: serde_json::Value = resp.json()?;
    if body["deleted"].as_bool().unwrap_or(false) {
        println!("Deleted {}", id);
    } else {
        eprintln!("No snippet with id {}", id);
    }

    Ok(())
}

/// GET /stats.
fn do_stats(server: &str) -> anyhow::Result<()> {
    let client = http_client(30)?;
    let url = format!("{}/stats", server);

    let resp = client.get(&url).send()?;
    if !resp.status().is_success() {
        eprintln!("paracad: server returned {}", resp.status());
        std::process::exit(1);
    }

    let body: serde_json::Value = resp.json()?;
    println!(
        "Snippets:  {} total, {} embedded",
        body["total_snippets"], body["embedded_snippets"]
    );
    if let Some(categories) = body["categories"].as_object() {
        for (category, count) in categories {
            println!("  {:<16} {}", category, count);
        }
    }

    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = http_client(10)?;
    let url = format!("{}/health", server);
    let resp = client.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Paracad server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("PostgreSQL:     {}", body["postgresql"].as_str().unwrap_or("?"));
            println!("pgvector:       {}", body["pgvector"].as_str().unwrap_or("?"));
            println!("Socket:         {}", body["socket"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("paracad: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("paracad: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Run {
            text,
            save,
            output,
            json,
        } => do_run(&server, &text, save, output, json),
        Commands::Parse { text, json } => do_parse(&server, &text, json),
        Commands::Search { query, limit, json } => do_search(&server, &query, limit, json),
        Commands::Add {
            file,
            title,
            description,
            category,
            tags,
        } => do_add(&server, &file, &title, &description, &category, &tags),
        Commands::List => do_list(&server),
        Commands::Delete { id } => do_delete(&server, &id),
        Commands::Stats => do_stats(&server),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("paracad: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(new_value: Option<f64>, delta: Option<f64>) -> ParsedInstruction {
        ParsedInstruction {
            part: "shaft".to_string(),
            feature: "Extrude1".to_string(),
            parameter: "Diameter".to_string(),
            new_value,
            delta,
            unit: "mm".to_string(),
            confidence: 0.95,
        }
    }

    fn snippet(title: &str, code: &str, score: f64) -> SnippetMatch {
        SnippetMatch {
            id: "7b5c24ab-1234-5678-9abc-def012345678".to_string(),
            title: title.to_string(),
            description: "A description".to_string(),
            category: "extrude".to_string(),
            code: code.to_string(),
            score,
        }
    }

    #[test]
    fn test_render_instruction_absolute_value() {
        let line = render_instruction(&instruction(Some(35.0), None));
        assert_eq!(line, "shaft Extrude1 Diameter -> 35 mm (95%)");
    }

    #[test]
    fn test_render_instruction_positive_delta() {
        let line = render_instruction(&instruction(None, Some(5.0)));
        assert_eq!(line, "shaft Extrude1 Diameter +5 mm (95%)");
    }

    #[test]
    fn test_render_instruction_negative_delta() {
        let line = render_instruction(&instruction(None, Some(-5.0)));
        assert_eq!(line, "shaft Extrude1 Diameter -5 mm (95%)");
    }

    #[test]
    fn test_render_match_shows_score_as_percent() {
        let block = render_match(&snippet("Cylinder extrude", "import adsk.core", 0.87));
        assert!(block.contains("(87%)"));
        assert!(block.contains("[extrude] Cylinder extrude"));
        assert!(block.contains("import adsk.core"));
    }

    #[test]
    fn test_render_match_truncates_long_code() {
        let long_code = "x".repeat(500);
        let block = render_match(&snippet("Long", &long_code, 0.5));
        assert!(!block.contains(&long_code), "code must be truncated");
        assert!(block.contains(&"x".repeat(200)));
    }

    #[test]
    fn test_run_response_deserializes() {
        let json = serde_json::json!({
            "code": "import adsk.core",
            "instructions": [{
                "part": "shaft", "feature": "Extrude1", "parameter": "Diameter",
                "new_value": 35.0, "unit": "mm", "confidence": 0.95
            }],
            "search_query": "shaft diameter circle extrude",
            "examples_used": 3,
            "model": "qwen2.5-coder:7b",
            "created_at": "2026-08-07T10:00:00Z",
            "saved_path": null
        });
        let run: RunResponse = serde_json::from_value(json).unwrap();
        assert_eq!(run.examples_used, 3);
        assert_eq!(run.instructions.len(), 1);
        assert!(run.saved_path.is_none());
    }
}
