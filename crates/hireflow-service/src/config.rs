//! Service configuration.

use serde::Deserialize;
use std::path::Path;

/// Default number of compare-and-append attempts per ledger write.
pub const DEFAULT_MAX_APPEND_ATTEMPTS: u32 = 8;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection string. Selects the PostgreSQL backend.
    pub database_url: Option<String>,

    /// Maximum PostgreSQL pool size.
    pub database_max_connections: u32,

    /// `RocksDB` data directory. Used when built with `rocksdb-backend`.
    pub data_dir: Option<String>,

    /// HS256 secret used to validate user JWTs.
    pub auth_jwt_secret: Option<String>,

    /// Expected JWT audience (default: "hireflow").
    pub auth_audience: String,

    /// Service API key for service-to-service auth (CV ingestion).
    pub service_api_key: Option<String>,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// Paddle webhook secret. Signatures are only checked when set.
    pub paddle_webhook_secret: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Attempts before a contended ledger write gives up.
    pub ledger_max_append_attempts: u32,
}

/// Paddle secrets file structure.
#[derive(Debug, Deserialize)]
struct PaddleSecrets {
    webhook_secret: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections: parsed_var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            data_dir: non_empty_var("DATA_DIR"),
            auth_jwt_secret: non_empty_var("AUTH_JWT_SECRET"),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or(defaults.auth_audience),
            service_api_key: non_empty_var("SERVICE_API_KEY"),
            admin_api_key: non_empty_var("ADMIN_API_KEY"),
            paddle_webhook_secret: load_paddle_secret(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: parsed_var("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: parsed_var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            ledger_max_append_attempts: parsed_var("LEDGER_MAX_APPEND_ATTEMPTS")
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.ledger_max_append_attempts),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Load the Paddle webhook secret from file or environment.
fn load_paddle_secret() -> Option<String> {
    let secret_paths = [
        ".secrets/paddle.json",
        "hireflow/.secrets/paddle.json",
        "../.secrets/paddle.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<PaddleSecrets>(path) {
            tracing::info!(path = %path, "Loaded Paddle secrets from file");
            return Some(secrets.webhook_secret);
        }
    }

    tracing::debug!("Paddle secrets file not found, using environment variables");
    non_empty_var("PADDLE_WEBHOOK_SECRET")
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            database_max_connections: 10,
            data_dir: None,
            auth_jwt_secret: None,
            auth_audience: "hireflow".into(),
            service_api_key: None,
            admin_api_key: None,
            paddle_webhook_secret: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            ledger_max_append_attempts: DEFAULT_MAX_APPEND_ATTEMPTS,
        }
    }
}
