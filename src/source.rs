//! Document sources
//!
//! [`MongoSource`] reads the live collection for an environment.
//! [`DumpSource`] reads an exported JSON array, single document or NDJSON
//! file for offline runs.

use crate::config::{FetchSettings, MongoSettings};
use crate::error::{EtlError, Result};
use chrono::{Duration, Utc};
use mongodb::bson::{doc, Bson, Document};
use mongodb::sync::Client;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use tracing::{debug, info};

/// Which documents of a collection to read
#[derive(Debug, Clone, PartialEq)]
pub enum FetchWindow {
    /// Every document
    All,
    /// Documents whose `field` (epoch millis) is strictly greater than `after_ms`
    Since { field: String, after_ms: i64 },
}

impl FetchWindow {
    /// Window ending now, as configured
    pub fn from_settings(settings: &FetchSettings) -> Self {
        if settings.fetch_all {
            return FetchWindow::All;
        }
        let cutoff = Utc::now() - Duration::hours(i64::from(settings.lookback_hours));
        FetchWindow::Since {
            field: settings.time_field.clone(),
            after_ms: cutoff.timestamp_millis(),
        }
    }

    pub fn to_filter(&self) -> Document {
        match self {
            FetchWindow::All => Document::new(),
            FetchWindow::Since { field, after_ms } => {
                let mut filter = Document::new();
                filter.insert(field.clone(), doc! { "$gt": *after_ms });
                filter
            }
        }
    }

    /// Whether a JSON document falls inside the window
    pub fn admits(&self, document: &Value) -> bool {
        match self {
            FetchWindow::All => true,
            FetchWindow::Since { field, after_ms } => document
                .get(field)
                .and_then(Value::as_f64)
                .map_or(false, |t| t > *after_ms as f64),
        }
    }
}

/// Anything that can hand over the raw documents of a collection
pub trait DocumentSource {
    fn fetch(&mut self, collection: &str, window: &FetchWindow) -> Result<Vec<Value>>;
}

/// Reads from a MongoDB database through the synchronous driver
pub struct MongoSource {
    client: Client,
    database: String,
}

impl MongoSource {
    pub fn connect(settings: &MongoSettings) -> Result<Self> {
        let client = Client::with_uri_str(&settings.uri)?;
        client
            .database(&settings.database)
            .run_command(doc! { "ping": 1 }, None)?;
        info!(database = %settings.database, "Connected to Mongo");

        Ok(MongoSource {
            client,
            database: settings.database.clone(),
        })
    }
}

impl DocumentSource for MongoSource {
    fn fetch(&mut self, collection: &str, window: &FetchWindow) -> Result<Vec<Value>> {
        let filter = window.to_filter();
        debug!(collection, ?filter, "Querying collection");

        let cursor = self
            .client
            .database(&self.database)
            .collection::<Document>(collection)
            .find(filter, None)?;

        let mut documents = Vec::new();
        for document in cursor {
            documents.push(document_to_json(document?));
        }

        info!(collection, documents = documents.len(), "Fetched documents");
        Ok(documents)
    }
}

/// Convert a BSON document into plain JSON
///
/// Object ids become their hex string and datetimes RFC 3339 strings, so
/// they flatten into single scalar columns.
pub fn document_to_json(document: Document) -> Value {
    let map: Map<String, Value> = document
        .into_iter()
        .map(|(k, v)| (k, bson_to_json(v)))
        .collect();
    Value::Object(map)
}

fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Document(doc) => document_to_json(doc),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}

/// Reads documents from a dump file instead of the live store
///
/// The collection name is ignored; the time window is applied in memory.
pub struct DumpSource {
    path: PathBuf,
}

impl DumpSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DumpSource { path: path.into() }
    }
}

impl DocumentSource for DumpSource {
    fn fetch(&mut self, collection: &str, window: &FetchWindow) -> Result<Vec<Value>> {
        let file = File::open(&self.path)
            .map_err(|e| EtlError::Dump(format!("{}: {}", self.path.display(), e)))?;
        let mut content = Vec::new();
        BufReader::new(file).read_to_end(&mut content)?;

        let documents: Vec<Value> = parse_documents(content)?
            .into_iter()
            .filter(|d| window.admits(d))
            .collect();

        info!(
            collection,
            path = %self.path.display(),
            documents = documents.len(),
            "Loaded documents from dump"
        );
        Ok(documents)
    }
}

/// Parse a JSON array, a single document, or NDJSON
pub fn parse_documents(mut content: Vec<u8>) -> Result<Vec<Value>> {
    // simd-json parses in place, so keep an untouched copy for the NDJSON fallback
    let original = content.clone();

    match simd_json::serde::from_slice::<Value>(&mut content) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(single) => Ok(vec![single]),
        Err(_) => {
            let text = String::from_utf8_lossy(&original);
            let mut documents = Vec::new();
            for (idx, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let value: Value = serde_json::from_str(line)
                    .map_err(|e| EtlError::Dump(format!("line {}: {}", idx + 1, e)))?;
                documents.push(value);
            }
            Ok(documents)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use serde_json::json;

    #[test]
    fn test_window_filter() {
        let window = FetchWindow::Since {
            field: "event_time".to_string(),
            after_ms: 1_000,
        };

        assert_eq!(window.to_filter(), doc! { "event_time": { "$gt": 1_000_i64 } });
        assert_eq!(FetchWindow::All.to_filter(), Document::new());
    }

    #[test]
    fn test_window_from_settings() {
        let mut settings = FetchSettings::default();
        let before = Utc::now().timestamp_millis() - 86_400_000;

        match FetchWindow::from_settings(&settings) {
            FetchWindow::Since { field, after_ms } => {
                assert_eq!(field, "event_time");
                assert!(after_ms >= before);
                assert!(after_ms < before + 60_000);
            }
            other => panic!("unexpected window {:?}", other),
        }

        settings.fetch_all = true;
        assert_eq!(FetchWindow::from_settings(&settings), FetchWindow::All);
    }

    #[test]
    fn test_window_admits() {
        let window = FetchWindow::Since {
            field: "event_time".to_string(),
            after_ms: 1_000,
        };

        assert!(window.admits(&json!({"event_time": 1001})));
        assert!(!window.admits(&json!({"event_time": 1000})));
        assert!(!window.admits(&json!({"other": 5000})));
        assert!(FetchWindow::All.admits(&json!({})));
    }

    #[test]
    fn test_bson_conversion() {
        let oid = ObjectId::new();
        let document = doc! {
            "_id": oid,
            "insert_id": "i1",
            "event_time": 1_700_000_000_000_i64,
            "user_properties": { "name": "Ann", "tags": ["a", "b"] },
        };

        let value = document_to_json(document);

        assert_eq!(value["_id"], json!(oid.to_hex()));
        assert_eq!(value["event_time"], json!(1_700_000_000_000_i64));
        assert_eq!(value["user_properties"]["name"], json!("Ann"));
        assert_eq!(value["user_properties"]["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_parse_array_and_ndjson() {
        let array = br#"[{"insert_id": "i1"}, {"insert_id": "i2"}]"#.to_vec();
        assert_eq!(parse_documents(array).unwrap().len(), 2);

        let single = br#"{"insert_id": "i1"}"#.to_vec();
        assert_eq!(parse_documents(single).unwrap().len(), 1);

        let ndjson = b"{\"insert_id\": \"i1\"}\n\n{\"insert_id\": \"i2\"}\n".to_vec();
        let docs = parse_documents(ndjson).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["insert_id"], json!("i2"));
    }

    #[test]
    fn test_parse_garbage_fails() {
        let garbage = b"{not json".to_vec();

        assert!(matches!(parse_documents(garbage), Err(EtlError::Dump(_))));
    }
}
