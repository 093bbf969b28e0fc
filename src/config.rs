//! Startup configuration from environment variables.
//!
//! Read once when the server starts; nothing is reloaded. Unset variables
//! fall back to their defaults (and say so in the log), values that are set
//! but do not parse are an [`Error::Config`].
//!
//! | variable | default |
//! |---|---|
//! | `PORT` | `3001` |
//! | `CASHPOT_BACKEND` | `file` (or `document`) |
//! | `CASHPOT_DATA_FILE` | `data.json` |
//! | `DATABASE_URL` | `memory://` |
//! | `CASHPOT_FLUSH` | `immediate` |
//! | `CASHPOT_PRETTY` | `true` |
//! | `JWT_SECRET` | development secret |
//! | `JWT_TTL_SECS` | `604800` (7 days) |
//! | `CASHPOT_REQUIRE_AUTH` | `false` |

use crate::codec::JsonCodec;
use crate::error::{Error, Result};
use crate::flush::FlushPolicy;
use crate::server::auth::AuthConfig;
use crate::store::document::Backing;
use crate::store::{DocumentStore, FileStore, Store};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

const DEV_SECRET: &str = "cashpot-development-secret";
const ISSUER: &str = "cashpot";

/// Which store the server persists to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// One JSON file holding every entity.
    #[default]
    File,
    /// Schema-checked collections, in memory or one file per entity.
    Document,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Backend::File),
            "document" | "mongo" | "mongodb" => Ok(Backend::Document),
            other => Err(Error::Config(format!("unknown backend: {other}"))),
        }
    }
}

/// Server settings, read from `CASHPOT_*` variables with defaults.
#[derive(Clone)]
pub struct Config {
    /// Listen port.
    pub port: u16,
    /// Store the server persists to.
    pub backend: Backend,
    /// Data file of the file backend.
    pub data_file: PathBuf,
    /// Where the document backend keeps its collections.
    pub database_url: String,
    /// When collection writes reach disk.
    pub flush: FlushPolicy,
    /// Pretty-print data files.
    pub pretty: bool,
    /// HS256 signing secret.
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_ttl_secs: i64,
    /// Entity routes need a bearer token.
    pub require_auth: bool,
}

impl Config {
    /// Read the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.trim().is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set, using the development secret");
                DEV_SECRET.to_string()
            }
        };
        let jwt_ttl_secs: i64 = try_load(&lookup, "JWT_TTL_SECS", "604800")?;
        if jwt_ttl_secs <= 0 {
            return Err(Error::Config("JWT_TTL_SECS must be positive".into()));
        }

        Ok(Self {
            port: try_load(&lookup, "PORT", "3001")?,
            backend: try_load(&lookup, "CASHPOT_BACKEND", "file")?,
            data_file: try_load(&lookup, "CASHPOT_DATA_FILE", "data.json")?,
            database_url: try_load(&lookup, "DATABASE_URL", "memory://")?,
            flush: try_load(&lookup, "CASHPOT_FLUSH", "immediate")?,
            pretty: try_load(&lookup, "CASHPOT_PRETTY", "true")?,
            jwt_secret,
            jwt_ttl_secs,
            require_auth: try_load(&lookup, "CASHPOT_REQUIRE_AUTH", "false")?,
        })
    }

    /// Open the configured store.
    pub fn open_store(&self) -> Result<Arc<dyn Store>> {
        match self.backend {
            Backend::File => {
                info!(path = %self.data_file.display(), "using file store");
                let store = FileStore::open_with(&self.data_file, JsonCodec::with_pretty(self.pretty))?;
                Ok(Arc::new(store))
            }
            Backend::Document => {
                let backing = Backing::parse(&self.database_url)?;
                info!(?backing, flush = ?self.flush, "using document store");
                let store = DocumentStore::with_options(backing, self.flush.clone(), self.pretty)?;
                Ok(Arc::new(store))
            }
        }
    }

    /// Token settings for the HTTP layer.
    pub fn auth(&self) -> AuthConfig {
        AuthConfig {
            secret: self.jwt_secret.clone(),
            issuer: ISSUER.to_string(),
            ttl_secs: self.jwt_ttl_secs,
            require_auth: self.require_auth,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("backend", &self.backend)
            .field("data_file", &self.data_file)
            .field("database_url", &self.database_url)
            .field("flush", &self.flush)
            .field("pretty", &self.pretty)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_ttl_secs", &self.jwt_ttl_secs)
            .field("require_auth", &self.require_auth)
            .finish()
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {key} value {raw:?}: {e}")))
}
