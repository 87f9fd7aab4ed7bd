use clap::Parser;
use paracad_core::completion::OllamaCompletionClient;
use paracad_core::ParacadConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use paracad_server::server;
use paracad_server::subsystems::{embedder, pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "paracad.toml")]
    config: String,

    #[arg(long)]
    health: bool,

    /// Drop and recreate the snippet store schema, then exit. Destructive.
    #[arg(long)]
    reset_store: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match ParacadConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect to DB
    let pool = match paracad_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match paracad_core::db::health_check(&pool).await {
            Ok(v) => println!("PostgreSQL connected: {}", v),
            Err(e) => {
                println!("PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        match paracad_core::db::check_pgvector(&pool).await {
            Ok(v) => println!("pgvector version: {}", v),
            Err(e) => {
                println!("pgvector check failed: {}", e);
                std::process::exit(1);
            }
        }

        let probe = OllamaCompletionClient::new(pipeline::codegen_completion_config(&config))?;
        match probe.check_server().await {
            Ok(v) => println!("Ollama reachable: v{}", v),
            Err(e) => println!("Ollama unreachable: {}", e),
        }

        println!("Paracad health check passed");
        return Ok(());
    }

    if args.reset_store {
        paracad_core::db::reset_schema(&pool, config.embedding.dimensions).await?;
        println!("Snippet store schema reset");
        return Ok(());
    }

    paracad_core::db::ensure_schema(&pool, config.embedding.dimensions).await?;

    // Warn early when the model server is down; requests will still retry.
    let probe = OllamaCompletionClient::new(pipeline::codegen_completion_config(&config))?;
    match probe.check_server().await {
        Ok(v) => tracing::info!(version = %v, "Ollama server reachable"),
        Err(e) => tracing::warn!(error = %e, "Ollama server unreachable — model calls will fail until it is up"),
    }

    // Shutdown plumbing
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Spawn embedding backfill worker
    match embedder::create_backend_from_config(&config) {
        Ok(backend) => {
            let backfill_pool = pool.clone();
            let backend: std::sync::Arc<dyn paracad_core::embeddings::EmbeddingBackend> =
                std::sync::Arc::from(backend);
            let batch_size = config.embedding.backfill_batch_size;
            let interval = config.embedding.backfill_interval_seconds;
            tokio::spawn(embedder::run_backfill_worker(
                backfill_pool,
                backend,
                batch_size,
                interval,
            ));
        }
        Err(e) => {
            tracing::warn!("Backfill worker skipped: failed to create embedding backend: {}", e);
        }
    }

    // Spawn HTTP REST API server if enabled
    if config.http.enabled {
        let http_pool = pool.clone();
        let http_config = config.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) =
                paracad_server::http::start_http_server(http_pool, http_config, http_shutdown).await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, pool, config, tx.subscribe()).await?;

    Ok(())
}
