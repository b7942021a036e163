use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Unknown environment label: {0}")]
    UnknownEnvironment(String),

    #[error("Document store error: {0}")]
    Source(#[from] mongodb::error::Error),

    #[error("Failed to read dump file: {0}")]
    Dump(String),

    #[error("Database error: {0}")]
    Sink(#[from] postgres::Error),

    #[error("Duplicate key on {table} table")]
    DuplicateKey { table: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;

/// Status object reported once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub code: u16,
    pub message: String,
}

impl RunStatus {
    pub fn ok() -> Self {
        RunStatus {
            code: 200,
            message: String::from("Migration completed"),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        RunStatus {
            code: 500,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code < 400
    }
}

impl EtlError {
    /// Collapse the error into the coarse status the job reports.
    pub fn status(&self) -> RunStatus {
        match self {
            EtlError::Source(_) | EtlError::Dump(_) => {
                RunStatus::failure("Error connecting to MongoDB")
            }
            EtlError::Sink(_) | EtlError::DuplicateKey { .. } => {
                RunStatus::failure("Error inserting into Postgres DB")
            }
            other => RunStatus::failure(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages() {
        let err = EtlError::Dump("missing.json".to_string());
        assert_eq!(err.status().code, 500);
        assert_eq!(err.status().message, "Error connecting to MongoDB");

        let err = EtlError::DuplicateKey { table: "production_users".to_string() };
        assert_eq!(err.status().message, "Error inserting into Postgres DB");

        let err = EtlError::MissingEnv("POSTGRES_HOST".to_string());
        assert!(err.status().message.contains("POSTGRES_HOST"));
        assert!(RunStatus::ok().is_ok());
    }
}
