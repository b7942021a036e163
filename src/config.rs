//! Run configuration
//!
//! Credentials come from environment variables (optionally seeded from a
//! `.env` file by the binary). Pipeline settings come from an optional TOML
//! file overlaid with `SHARE_ETL__*` environment variables; every setting has
//! a default.

use crate::error::{EtlError, Result};
use crate::normalize::{EntitySchema, FlattenConfig};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Deployment label; names both the source collection and the table prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Production,
    Staging,
    Beta,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Beta => "beta",
        }
    }

    /// Destination table for an entity, e.g. `production_users`
    pub fn table_name(&self, entity: &str) -> String {
        format!("{}_{}", self.as_str(), entity)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "beta" => Ok(Environment::Beta),
            other => Err(EtlError::UnknownEnvironment(other.to_string())),
        }
    }
}

/// Read a required variable through `lookup`
fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EtlError::MissingEnv(name.to_string()))
}

/// MongoDB connection settings
#[derive(Clone)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
}

impl fmt::Debug for MongoSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoSettings")
            .field("uri", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

impl MongoSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// `MONGO_URI` wins; otherwise the SRV URI is assembled from
    /// `MONGO_USER`, `MONGO_PASSWORD` and `MONGO_HOST`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = required(&lookup, "MONGO_DB_NAME")?;
        let uri = match lookup("MONGO_URI").filter(|v| !v.is_empty()) {
            Some(uri) => uri,
            None => {
                let user = required(&lookup, "MONGO_USER")?;
                let password = required(&lookup, "MONGO_PASSWORD")?;
                let host = required(&lookup, "MONGO_HOST")?;
                format!(
                    "mongodb+srv://{}:{}@{}/{}?retryWrites=true&w=majority",
                    user, password, host, database
                )
            }
        };
        Ok(MongoSettings { uri, database })
    }
}

/// PostgreSQL connection settings
#[derive(Clone)]
pub struct PostgresSettings {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub dbname: String,
}

impl fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .finish()
    }
}

impl PostgresSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = required(&lookup, "POSTGRES_PORT")?;
        let port = port
            .parse::<u16>()
            .map_err(|_| EtlError::MissingEnv(format!("POSTGRES_PORT (not a port: {})", port)))?;

        Ok(PostgresSettings {
            user: required(&lookup, "POSTGRES_USERNAME")?,
            password: required(&lookup, "POSTGRES_PASSWORD")?,
            host: required(&lookup, "POSTGRES_HOST")?,
            port,
            dbname: required(&lookup, "POSTGRES_DB_NAME")?,
        })
    }

    pub fn to_pg_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config
            .user(&self.user)
            .password(&self.password)
            .host(&self.host)
            .port(self.port)
            .dbname(&self.dbname);
        config
    }
}

/// Which source documents a run selects
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Document field holding the event time in epoch milliseconds
    pub time_field: String,

    /// Only documents newer than now minus this many hours
    pub lookback_hours: u32,

    /// Ignore the time window and read the whole collection
    pub fetch_all: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            time_field: String::from("event_time"),
            lookback_hours: 24,
            fetch_all: false,
        }
    }
}

/// Everything that shapes a run apart from credentials
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub flatten: FlattenConfig,
    pub fetch: FetchSettings,
    pub schema: EntitySchema,

    /// Directory for per-entity CSV side files
    pub csv_dir: Option<PathBuf>,
}

impl PipelineSettings {
    /// Load from an optional TOML file and `SHARE_ETL__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("SHARE_ETL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
