//! Topo Bridge - staging gateway between TopoManager and GeODOC

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use topo_bridge::{
    config::Args,
    db::{
        redact_uri, IdentityDirectory, MemoryStore, MongoClient, MongoStore, RegistryReader,
        StagingStore,
    },
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("topo_bridge={},info", args.log_level).into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Topo Bridge - TopoManager -> GeODOC");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} (db {})", redact_uri(&args.mongodb_uri), args.mongodb_db);
    info!("Upload root: {}", args.upload_dir.display());
    info!("Max upload size: {} MB", args.max_file_size_mb);
    info!("CORS origins: {}", args.cors_origin_list().join(", "));
    info!("======================================");

    let (directory, registry, staging) = open_stores(&args).await?;

    let state = Arc::new(AppState::with_stores(args, directory, registry, staging)?);

    server::run(state).await?;

    Ok(())
}

type Stores = (
    Arc<dyn IdentityDirectory>,
    Arc<dyn RegistryReader>,
    Arc<dyn StagingStore>,
);

/// MongoDB, or an empty in-memory store in dev mode when MongoDB is down
async fn open_stores(args: &Args) -> anyhow::Result<Stores> {
    let connected = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => MongoStore::open(client).await,
        Err(e) => Err(e),
    };

    match connected {
        Ok(store) => {
            info!("MongoDB connected successfully");
            Ok(shared(Arc::new(store)))
        }
        Err(e) if args.dev_mode => {
            warn!("MongoDB unavailable (dev mode, using in-memory store): {}", e);
            Ok(shared(Arc::new(MemoryStore::new())))
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            Err(e.into())
        }
    }
}

fn shared<S>(store: Arc<S>) -> Stores
where
    S: IdentityDirectory + RegistryReader + StagingStore + 'static,
{
    let directory: Arc<dyn IdentityDirectory> = store.clone();
    let registry: Arc<dyn RegistryReader> = store.clone();
    let staging: Arc<dyn StagingStore> = store;
    (directory, registry, staging)
}
