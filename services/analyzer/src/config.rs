//! Environment-based configuration.
//!
//! - `BIND_ADDR`: listen address, default `0.0.0.0:8001`
//! - `DATABASE_URL`: sqlite URL, default `sqlite:///./database.db`
//! - `LOG_LEVEL`: tracing filter, default `info`
//! - `CEM_MODEL_ID`: id of the emulated CEM, default `cem-mock`; set empty
//!   to run without the simple CEM.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:///./database.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub log_level: String,
    pub cem_model_id: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let cem_model_id = match env::var("CEM_MODEL_ID") {
            Ok(id) if id.is_empty() => None,
            Ok(id) => Some(id),
            Err(_) => Some("cem-mock".to_owned()),
        };
        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8001".to_owned()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_owned()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
            cem_model_id,
        }
    }
}

/// Resolve the on-disk path from a `sqlite:` URL.
///
/// Accepts `sqlite:///relative/or/absolute`, `sqlite://path`, `sqlite:path`,
/// and a bare path.  `:memory:` is passed through for an in-memory database.
pub fn sqlite_path(database_url: &str) -> PathBuf {
    let stripped = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    PathBuf::from(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_path_strips_url_schemes() {
        assert_eq!(
            sqlite_path("sqlite:///./database.db"),
            PathBuf::from("./database.db")
        );
        assert_eq!(sqlite_path("sqlite:///var/db.sqlite"), PathBuf::from("var/db.sqlite"));
        assert_eq!(sqlite_path("sqlite::memory:"), PathBuf::from(":memory:"));
        assert_eq!(sqlite_path("plain.db"), PathBuf::from("plain.db"));
    }
}
