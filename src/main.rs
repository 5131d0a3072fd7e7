//! Connected Community API server

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use connected_community::{
    config::Args,
    db::MongoClient,
    logging::AuditLogger,
    server::{self, AppState},
    store::{MemoryStore, MongoStore, Store},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("connected_community={},info", log_level).into()),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Connected Community");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Client origin: {}", args.client_origin);
    if !args.memory_store {
        info!("MongoDB: {} (db {})", args.mongodb_uri, args.mongodb_db);
    }
    info!("======================================");

    let store: Arc<dyn Store> = if args.memory_store {
        info!("Using in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        match connect_mongo(&args).await {
            Ok(store) => Arc::new(store),
            Err(e) if args.dev_mode => {
                warn!("MongoDB unavailable (dev mode, using in-memory store): {}", e);
                Arc::new(MemoryStore::new())
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let audit = AuditLogger::new();
    if let Some(path) = &args.audit_log_path {
        audit.init_file(path.clone()).await?;
    }

    let state = Arc::new(AppState::new(args, store, audit)?);
    server::run(state).await?;
    Ok(())
}

async fn connect_mongo(args: &Args) -> connected_community::Result<MongoStore> {
    let mongo = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;
    info!("MongoDB connected successfully");
    MongoStore::new(mongo).await
}
