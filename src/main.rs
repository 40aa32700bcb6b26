use std::path::PathBuf;
use std::sync::Arc;

use kbrecall::cli::{Cli, Commands, ConfigAction};
use kbrecall::config::Config;
use kbrecall::embedding::{EmbeddingProvider, HttpEmbeddingProvider};
use kbrecall::error::{KbRecallError, Result};
use kbrecall::ingest;
use kbrecall::retrieval::{HybridSearcher, SearchRequest};
use kbrecall::server::{self, AppState};
use kbrecall::store::{SqliteStore, Store, StoreError};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(cli.config, host, port)?;
        }
        Commands::Search {
            query,
            mode,
            vector_results,
            metadata,
            metadata_results,
            rerank_url,
            rerank_api_key,
            json,
        } => {
            let request = SearchRequest {
                query,
                n_vector_results: vector_results,
                metadata_keyword: metadata,
                n_metadata_results: metadata_results,
                rerank_url,
                rerank_api_key,
                recall_mode: mode,
            };
            cmd_search(cli.config, request, json)?;
        }
        Commands::Load { files } => {
            cmd_load(cli.config, files)?;
        }
        Commands::Files => {
            cmd_files(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "kbrecall=debug" } else { "kbrecall=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| KbRecallError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn cmd_serve(config_path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = load_config(config_path)?;
    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port)
    );

    let state = AppState::new(
        Arc::new(open_searcher(&config)?),
        config.storage.knowledge_base_path()?,
        config.indexing.upsert_batch_size,
    );

    runtime()?.block_on(server::serve(state, &addr))
}

fn cmd_search(config_path: Option<PathBuf>, request: SearchRequest, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let searcher = open_searcher(&config)?;

    let hits = runtime()?.block_on(searcher.search(&request))?;

    if json {
        let output = serde_json::to_string_pretty(&hits).map_err(|e| KbRecallError::Json {
            source: e,
            context: "Failed to serialize results".to_string(),
        })?;
        println!("{}", output);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!("{}. {}", rank + 1, hit.document);
        for (key, value) in &hit.metadata {
            println!("   {}: {}", key, value);
        }
        println!();
    }

    Ok(())
}

fn cmd_load(config_path: Option<PathBuf>, files: Vec<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let kb_dir = config.storage.knowledge_base_path()?;

    let summary = runtime()?.block_on(ingest::load_documents(
        &store,
        &kb_dir,
        &files,
        config.indexing.upsert_batch_size,
    ))?;

    println!("✓ {}", summary.message());
    println!(
        "  {} loaded, {} skipped, {} batches",
        summary.loaded, summary.skipped, summary.batches
    );
    println!("  Collection now holds {} documents", store.len()?);

    Ok(())
}

fn cmd_files(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let kb_dir = config.storage.knowledge_base_path()?;

    let files = ingest::list_files(&kb_dir)?;
    if files.is_empty() {
        println!("No knowledge-base files in {}", kb_dir.display());
    }
    for name in files {
        println!("{}", name);
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| KbRecallError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Collection: {}", config.storage.collection_path()?.display());
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| KbRecallError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            let kb_dir = config.storage.knowledge_base_path()?;
            std::fs::create_dir_all(&kb_dir).map_err(|e| KbRecallError::Io {
                source: e,
                context: format!("Failed to create knowledge base directory: {:?}", kb_dir),
            })?;

            println!("✓ Configuration initialized at: {}", path.display());
            println!("  Knowledge base directory: {}", kb_dir.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'kbrecall config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(
        HttpEmbeddingProvider::from_config(&config.embedding).map_err(StoreError::from)?,
    );
    let db_path = config.storage.collection_path()?;
    tracing::debug!("Opening collection at {}", db_path.display());

    Ok(SqliteStore::open(&db_path, embedder, &config.indexing)?)
}

fn open_searcher(config: &Config) -> Result<HybridSearcher> {
    let store: Arc<dyn Store> = Arc::new(open_store(config)?);
    Ok(HybridSearcher::new(
        store,
        config.retrieval.clone(),
        &config.rerank,
    )?)
}
