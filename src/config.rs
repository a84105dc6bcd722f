//! Environment-driven configuration (§6 "Configuration: bind address,
//! database path"). Out of scope for the core's semantics, but every binary
//! wiring the service together needs it, so it lives in the same
//! `env::var`-reading idiom as the rest of the ambient stack.

use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub default_predictor_min_samples: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let bind_addr = env::var("INVENTORY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());

        let database_path = resolve_data_path(
            env::var("INVENTORY_DB_PATH").ok(),
            "inventory_core.db",
        );

        let default_predictor_min_samples = env::var("INVENTORY_PREDICTOR_MIN_SAMPLES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Self {
            bind_addr,
            database_path,
            default_predictor_min_samples,
        }
    }
}

/// Relative paths are resolved against the crate root rather than the
/// caller's cwd, so running the binary from a different working directory
/// doesn't scatter database files around the filesystem.
fn resolve_data_path(raw: Option<String>, default_name: &str) -> PathBuf {
    let raw = raw.unwrap_or_else(|| default_name.to_string());
    let path = PathBuf::from(&raw);
    if path.is_absolute() {
        return path;
    }
    Path::new(env!("CARGO_MANIFEST_DIR")).join(path)
}

/// Loads `.env` from the current directory and the crate root, in that
/// order — either may be absent.
pub fn load_env() {
    let _ = dotenv::dotenv();
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

/// Initializes the global tracing subscriber from `RUST_LOG`, falling back
/// to a sensible default for this crate.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inventory_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
