//! sqlgate command line: serve the HTTP API or build a schema index.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use sqlgate_core::{GateConfig, Proposer, RetrievalConfig, RetrievalIndex};
use sqlgate_database::{PgDatabase, build_schema_index, save_schema_index};
use sqlgate_memory::KeywordIndex;
use sqlgate_model::create_proposer;
use sqlgate_runner::ConversationEngine;
use sqlgate_server::{AppState, ReadinessCheck, create_router};
use sqlgate_telemetry::{init_telemetry, shutdown_telemetry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "sqlgate",
    version,
    about = "Natural-language SQL with confirmation for every data change"
)]
struct Cli {
    /// Config file; defaults to config.toml searched upward from the working directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server until Ctrl+C
    Serve,

    /// Describe a database's tables for retrieval and write the schema index
    BuildIndex {
        /// Database to index; defaults to database.default_db
        #[arg(long)]
        db: Option<String>,

        /// Schema index output file; defaults to schema_index_<db>.json
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = GateConfig::load_from(cli.config.as_deref()).context("Failed to load config")?;
    init_telemetry(&config.observability).context("Failed to initialize telemetry")?;

    let result = match cli.command {
        Command::Serve => serve(config).await,
        Command::BuildIndex { db, output } => build_index(config, db, output).await,
    };

    shutdown_telemetry();
    result
}

async fn serve(config: GateConfig) -> Result<()> {
    let index = Arc::new(retrieval_index(&config.retrieval));
    index.load().await.context("Failed to load retrieval index")?;

    let db = Arc::new(PgDatabase::new(config.database.clone()));
    let proposer = create_proposer(&config.model).context("Failed to create proposer")?;
    tracing::info!(proposer = %proposer.name(), model = %config.model.model_name, "Proposer ready");

    let engine = ConversationEngine::builder()
        .schema_source(db.clone())
        .proposer(proposer)
        .executor(db.clone())
        .audit_log(db.clone())
        .retrieval_index(index.clone())
        .config(config.conversation.clone())
        .build()
        .context("Failed to create conversation engine")?;

    let default_db = config.database.default_db.clone();
    let state = AppState::new(Arc::new(engine), default_db.clone()).with_readiness_check(
        Arc::new(DatabaseProbe {
            db: db.clone(),
            db_name: default_db,
        }),
    );
    let app = create_router(state, Duration::from_secs(config.server.request_timeout_secs));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    index.save().await.context("Failed to save retrieval index")?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn build_index(config: GateConfig, db: Option<String>, output: Option<PathBuf>) -> Result<()> {
    let db_name = db.unwrap_or_else(|| config.database.default_db.clone());
    let output = output.unwrap_or_else(|| PathBuf::from(format!("schema_index_{}.json", db_name)));

    let pg = PgDatabase::new(config.database.clone());
    let schema_index = build_schema_index(&pg, &db_name, &config.retrieval)
        .await
        .with_context(|| format!("Failed to index database '{}'", db_name))?;
    save_schema_index(&schema_index, &output)?;

    let index = retrieval_index(&config.retrieval);
    index.load().await.context("Failed to load retrieval index")?;
    let added = index.add_schema_index(&schema_index).await?;
    index.save().await.context("Failed to save retrieval index")?;

    tracing::info!(
        db = %db_name,
        tables = schema_index.tables.len(),
        documents_added = added,
        output = %output.display(),
        "Schema index built"
    );
    Ok(())
}

fn retrieval_index(config: &RetrievalConfig) -> KeywordIndex {
    match &config.index_path {
        Some(path) => KeywordIndex::with_path(path),
        None => KeywordIndex::new(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
    }
    tracing::info!("Shutdown requested");
}

/// Readiness probe against the default database.
struct DatabaseProbe {
    db: Arc<PgDatabase>,
    db_name: String,
}

#[async_trait]
impl ReadinessCheck for DatabaseProbe {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> sqlgate_core::Result<()> {
        self.db.ping(&self.db_name).await
    }
}
