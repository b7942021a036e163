//! # share-etl - daily share-event migration
//!
//! Extracts share events from a MongoDB collection, reshapes the nested
//! documents into relational tables and appends them to PostgreSQL.
//!
//! ## Modules
//!
//! - **normalize**: flatten, split, clean, resolve and deduplicate documents
//! - **source**: read documents from MongoDB or a dump file
//! - **sink**: append tables to PostgreSQL, write CSV side files
//! - **pipeline**: run the whole job for one environment
//!
//! ## Quick Start
//!
//! ```rust
//! use share_etl::normalize::{EntitySchema, FlattenConfig, Normalizer};
//! use serde_json::json;
//!
//! let normalizer = Normalizer::new(FlattenConfig::default(), EntitySchema::default());
//! let batch = normalizer.normalize(vec![json!({
//!     "insert_id": "i1",
//!     "user_id": "u1",
//!     "event_type": "https://x.io/show",
//!     "country": "Norway",
//!     "user_properties": {"organization": {"_id": "o1", "name": "Acme"}}
//! })]);
//!
//! assert_eq!(batch.events.rows()[0]["event_type"], "Share Show Room:Studio");
//! assert_eq!(batch.users.rows()[0]["organization_id"], "o1");
//! assert_eq!(batch.countries.rows()[0]["country_code"], "NOR");
//! ```

pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod sink;
pub mod source;

// Re-export commonly used types for convenience
pub use config::{Environment, MongoSettings, PipelineSettings, PostgresSettings};
pub use error::{EtlError, Result, RunStatus};
pub use normalize::{Batch, EntitySchema, Normalizer, Table};
pub use pipeline::{run_status, Pipeline, RunReport, TableOutcome};
pub use sink::{CsvWriter, PostgresSink, TableSink};
pub use source::{DocumentSource, DumpSource, FetchWindow, MongoSource};
