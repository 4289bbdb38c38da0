//! Configuration for the bridge
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use jsonwebtoken::Algorithm;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

const DEV_FIELD_SECRET: &str = "dev-only-topomanager-secret-not-for-production";
const DEV_REGISTRY_SECRET: &str = "dev-only-geodoc-secret-not-for-production";

/// TopoManager ↔ GeODOC staging bridge
#[derive(Parser, Debug, Clone)]
#[command(name = "topo-bridge")]
#[command(about = "Stages field submissions for review before they enter the land registry")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "geodoc")]
    pub mongodb_db: String,

    /// Signing secret for TopoManager (field system) tokens
    #[arg(long, env = "SECRET_KEY")]
    pub field_secret: Option<String>,

    /// Signing secret for GeODOC (registry system) tokens
    #[arg(long, env = "GEODOC_SECRET_KEY")]
    pub registry_secret: Option<String>,

    /// Token signing algorithm (HS256, HS384, HS512)
    #[arg(long, env = "ALGORITHM", default_value = "HS256")]
    pub algorithm: String,

    /// Token lifetime in minutes
    #[arg(long, env = "ACCESS_TOKEN_EXPIRE_MINUTES", default_value = "60")]
    pub token_expire_minutes: u64,

    /// Root directory for staged uploads (one subdirectory per import)
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads/topo_staging")]
    pub upload_dir: PathBuf,

    /// Maximum size of one uploaded file, in megabytes
    #[arg(long, env = "MAX_FILE_SIZE_MB", default_value = "10")]
    pub max_file_size_mb: u64,

    /// Comma-separated list of allowed CORS origins ("*" allows any)
    #[arg(
        long,
        env = "CORS_ORIGINS",
        default_value = "http://localhost:8000,http://127.0.0.1:8000"
    )]
    pub cors_origins: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Enable development mode (default secrets, in-memory store if MongoDB is down)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,
}

impl Args {
    /// Effective field-system secret (uses a default in dev mode)
    pub fn field_secret(&self) -> String {
        self.field_secret
            .clone()
            .unwrap_or_else(|| DEV_FIELD_SECRET.to_string())
    }

    /// Effective registry-system secret (uses a default in dev mode)
    pub fn registry_secret(&self) -> String {
        self.registry_secret
            .clone()
            .unwrap_or_else(|| DEV_REGISTRY_SECRET.to_string())
    }

    /// Parsed signing algorithm
    pub fn algorithm(&self) -> Result<Algorithm, String> {
        let algorithm = Algorithm::from_str(&self.algorithm.to_uppercase())
            .map_err(|_| format!("Unknown token algorithm: {}", self.algorithm))?;

        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
            other => Err(format!(
                "Token algorithm {:?} needs key pairs; only HS256/HS384/HS512 are supported",
                other
            )),
        }
    }

    /// Token lifetime in seconds
    pub fn token_ttl_seconds(&self) -> u64 {
        self.token_expire_minutes * 60
    }

    /// Maximum upload size in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Allowed CORS origins
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.field_secret.as_deref().map_or(true, str::is_empty) {
                return Err("SECRET_KEY is required in production mode".to_string());
            }
            if self.registry_secret.as_deref().map_or(true, str::is_empty) {
                return Err("GEODOC_SECRET_KEY is required in production mode".to_string());
            }
        }

        if self.field_secret() == self.registry_secret() {
            return Err("SECRET_KEY and GEODOC_SECRET_KEY must differ".to_string());
        }

        self.algorithm()?;

        if self.token_expire_minutes == 0 {
            return Err("ACCESS_TOKEN_EXPIRE_MINUTES must be greater than zero".to_string());
        }

        if self.max_file_size_mb == 0 {
            return Err("MAX_FILE_SIZE_MB must be greater than zero".to_string());
        }

        Ok(())
    }
}
