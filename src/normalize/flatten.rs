use crate::normalize::table::{Row, Table};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Configuration for flattening nested documents
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlattenConfig {
    /// Separator placed between a group name and its field
    pub separator: String,

    /// Maximum nesting depth to expand; deeper objects stay whole
    pub max_depth: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        FlattenConfig {
            separator: String::from("_"),
            max_depth: 10,
        }
    }
}

/// Turns nested documents into single-level rows
///
/// `{"user_properties": {"organization": {"_id": "o1"}}}` and
/// `{"user_properties.organization._id": "o1"}` both become the column
/// `user_properties_organization__id` with the default separator.
pub struct Flattener {
    config: FlattenConfig,
}

impl Flattener {
    pub fn new(config: FlattenConfig) -> Self {
        Flattener { config }
    }

    pub fn separator(&self) -> &str {
        &self.config.separator
    }

    /// Flatten a batch of documents into a table, one row per object document
    pub fn flatten_all(&self, name: &str, documents: Vec<Value>) -> Table {
        let total = documents.len();
        let rows: Vec<Row> = documents
            .into_iter()
            .enumerate()
            .filter_map(|(idx, doc)| match doc {
                Value::Object(obj) => Some(self.flatten(obj)),
                other => {
                    warn!(index = idx, kind = kind_of(&other), "Skipping non-object document");
                    None
                }
            })
            .collect();

        debug!(documents = total, rows = rows.len(), "Flattened documents");
        Table::from_rows(name, rows)
    }

    /// Flatten one document into a row
    pub fn flatten(&self, obj: Map<String, Value>) -> Row {
        let mut row = Row::new();
        self.flatten_object(obj, None, 0, &mut row);
        row
    }

    fn flatten_object(
        &self,
        obj: Map<String, Value>,
        prefix: Option<&str>,
        depth: usize,
        row: &mut Row,
    ) {
        for (key, value) in obj.into_iter() {
            let column = self.join(prefix, &key);

            match value {
                Value::Object(nested) if depth < self.config.max_depth => {
                    self.flatten_object(nested, Some(&column), depth + 1, row);
                }
                other => {
                    row.insert(column, other);
                }
            }
        }
    }

    /// Join a parent column name and a (possibly dotted) key
    fn join(&self, prefix: Option<&str>, key: &str) -> String {
        let sep = &self.config.separator;
        let key = if key.contains('.') && sep != "." {
            key.split('.').collect::<Vec<_>>().join(sep)
        } else {
            key.to_string()
        };

        match prefix {
            Some(p) => format!("{}{}{}", p, sep, key),
            None => key,
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_nested_object() {
        let flattener = Flattener::new(FlattenConfig::default());
        let row = flattener.flatten(obj(json!({
            "insert_id": "i1",
            "user_properties": {
                "name": "Ann",
                "organization": {"_id": "o1", "name": "Acme"}
            }
        })));

        assert_eq!(row.get("insert_id").unwrap(), "i1");
        assert_eq!(row.get("user_properties_name").unwrap(), "Ann");
        assert_eq!(row.get("user_properties_organization__id").unwrap(), "o1");
        assert_eq!(row.get("user_properties_organization_name").unwrap(), "Acme");
        assert!(!row.contains_key("user_properties"));
    }

    #[test]
    fn test_dotted_keys_match_nested_form() {
        let flattener = Flattener::new(FlattenConfig::default());
        let dotted = flattener.flatten(obj(json!({
            "user_properties.organization._id": "o1"
        })));
        let nested = flattener.flatten(obj(json!({
            "user_properties": {"organization": {"_id": "o1"}}
        })));

        assert_eq!(dotted, nested);
    }

    #[test]
    fn test_dot_separator() {
        let flattener = Flattener::new(FlattenConfig {
            separator: ".".to_string(),
            ..FlattenConfig::default()
        });
        let row = flattener.flatten(obj(json!({"event_properties": {"room": "r1"}})));

        assert_eq!(row.get("event_properties.room").unwrap(), "r1");
    }

    #[test]
    fn test_arrays_are_leaf_values() {
        let flattener = Flattener::new(FlattenConfig::default());
        let row = flattener.flatten(obj(json!({"tags": ["a", "b"], "groups": []})));

        assert_eq!(row.get("tags").unwrap(), &json!(["a", "b"]));
        assert_eq!(row.get("groups").unwrap(), &json!([]));
    }

    #[test]
    fn test_max_depth_keeps_deep_objects_whole() {
        let flattener = Flattener::new(FlattenConfig {
            max_depth: 1,
            ..FlattenConfig::default()
        });
        let row = flattener.flatten(obj(json!({"a": {"b": {"c": 1}}})));

        assert_eq!(row.get("a_b").unwrap(), &json!({"c": 1}));
    }

    #[test]
    fn test_flatten_all_preserves_order_and_skips_scalars() {
        let flattener = Flattener::new(FlattenConfig::default());
        let table = flattener.flatten_all(
            "events",
            vec![
                json!({"insert_id": "i1"}),
                json!("not a document"),
                json!({"insert_id": "i2", "country": "Norway"}),
            ],
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].get("insert_id").unwrap(), "i1");
        assert_eq!(table.rows()[1].get("insert_id").unwrap(), "i2");
        assert!(table.rows()[0].get("country").unwrap().is_null());
    }
}
