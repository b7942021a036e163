use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// One flat record: column name to value
pub type Row = Map<String, Value>;

/// An in-memory relational table built from flattened documents
///
/// Every row carries every column of the table; values absent from the
/// source document are stored as `null`. Column order is first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    /// The entity name (e.g., "share_events", "users")
    pub name: String,

    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a table whose column universe is the union of all row keys
    pub fn from_rows(name: impl Into<String>, rows: Vec<Row>) -> Self {
        let mut columns = Vec::new();
        let mut seen = HashSet::new();
        for row in &rows {
            for key in row.keys() {
                if seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = rows
            .into_iter()
            .map(|mut row| {
                for column in &columns {
                    if !row.contains_key(column) {
                        row.insert(column.clone(), Value::Null);
                    }
                }
                row
            })
            .collect();

        Table {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Value of `column` in every row, or `None` when the column is absent
    pub fn column_values(&self, column: &str) -> Option<Vec<&Value>> {
        if !self.has_column(column) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|row| row.get(column).unwrap_or(&Value::Null))
                .collect(),
        )
    }

    /// Copy the named columns into a new table, skipping any that are absent
    pub fn select(&self, name: impl Into<String>, columns: &[String]) -> Table {
        let kept: Vec<String> = columns
            .iter()
            .filter(|c| self.has_column(c))
            .cloned()
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                kept.iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();

        Table {
            name: name.into(),
            columns: kept,
            rows,
        }
    }

    /// Columns for which `predicate` holds, in table order
    pub fn columns_matching<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        self.columns
            .iter()
            .filter(|c| predicate(c))
            .cloned()
            .collect()
    }

    /// Drop columns; names that are not present are ignored
    pub fn drop_columns(&mut self, columns: &[String]) {
        let dropping: HashSet<&str> = columns.iter().map(String::as_str).collect();
        self.columns.retain(|c| !dropping.contains(c.as_str()));
        for row in &mut self.rows {
            row.retain(|k, _| !dropping.contains(k.as_str()));
        }
    }

    /// Append a column, one value per row. Replaces an existing column of the same name.
    pub fn push_column(&mut self, column: impl Into<String>, values: Vec<Value>) {
        let column = column.into();
        debug_assert_eq!(values.len(), self.rows.len());

        if !self.has_column(&column) {
            self.columns.push(column.clone());
        }
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(column.clone(), value);
        }
    }

    /// Rename columns with `rename`; columns it maps to `None` keep their name
    ///
    /// Every target is looked up against the original names, so chained or
    /// swapped renames do not read each other's output. When two columns
    /// collapse onto one name the later column wins.
    pub fn rename_columns<F>(&mut self, rename: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let targets: HashMap<String, String> = self
            .columns
            .iter()
            .filter_map(|c| rename(c).map(|to| (c.clone(), to)))
            .filter(|(from, to)| from != to)
            .collect();

        if targets.is_empty() {
            return;
        }

        let target_of = |column: &String| targets.get(column).unwrap_or(column).clone();

        for row in &mut self.rows {
            let mut original = std::mem::take(row);
            let mut renamed = Row::new();
            for column in &self.columns {
                if let Some(value) = original.remove(column) {
                    renamed.insert(target_of(column), value);
                }
            }
            *row = renamed;
        }

        let mut columns = Vec::with_capacity(self.columns.len());
        let mut seen = HashSet::new();
        for column in &self.columns {
            let renamed = target_of(column);
            if seen.insert(renamed.clone()) {
                columns.push(renamed);
            }
        }
        self.columns = columns;
    }

    /// Rename `<prefix><field>` to `<field>`, leaving other columns untouched
    pub fn strip_prefix(&mut self, prefix: &str) {
        self.rename_columns(|c| {
            c.strip_prefix(prefix)
                .filter(|rest| !rest.is_empty())
                .map(str::to_string)
        });
    }

    /// Rewrite every cell of `column` through `f`. Missing column is a no-op.
    pub fn map_column<F>(&mut self, column: &str, mut f: F)
    where
        F: FnMut(&Value) -> Option<Value>,
    {
        if !self.has_column(column) {
            return;
        }
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(column) {
                if let Some(replacement) = f(cell) {
                    *cell = replacement;
                }
            }
        }
    }

    /// Keep only rows for which `keep` holds, preserving order
    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_column_union_fills_nulls() {
        let table = Table::from_rows(
            "t",
            vec![row(json!({"a": 1})), row(json!({"b": 2}))],
        );

        assert_eq!(table.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(table.rows()[0].get("b").unwrap(), &Value::Null);
        assert_eq!(table.rows()[1].get("a").unwrap(), &Value::Null);
    }

    #[test]
    fn test_drop_absent_columns_is_tolerated() {
        let mut table = Table::from_rows("t", vec![row(json!({"a": 1, "b": 2}))]);
        table.drop_columns(&["b".to_string(), "missing".to_string()]);

        assert_eq!(table.columns(), &["a".to_string()]);
        assert!(!table.rows()[0].contains_key("b"));
    }

    #[test]
    fn test_strip_prefix_only_touches_matching_columns() {
        let mut table = Table::from_rows(
            "t",
            vec![row(json!({"user_properties_name": "Ann", "user_id": "u1"}))],
        );
        table.strip_prefix("user_properties_");

        assert_eq!(table.columns(), &["name".to_string(), "user_id".to_string()]);
        assert_eq!(table.rows()[0].get("name").unwrap(), "Ann");
    }

    #[test]
    fn test_strip_prefix_with_nested_group_name() {
        let mut table = Table::from_rows(
            "users",
            vec![row(json!({
                "user_properties_user_properties_a": 1,
                "user_properties_a": 2,
                "user_id": "u1"
            }))],
        );
        table.strip_prefix("user_properties_");

        assert_eq!(
            table.columns(),
            &["user_properties_a".to_string(), "a".to_string(), "user_id".to_string()]
        );
        assert_eq!(table.rows()[0].get("user_properties_a").unwrap(), &json!(1));
        assert_eq!(table.rows()[0].get("a").unwrap(), &json!(2));
        assert_eq!(table.rows()[0].len(), 3);
    }

    #[test]
    fn test_swapped_renames_read_original_values() {
        let mut table = Table::from_rows("t", vec![row(json!({"a": 1, "b": 2}))]);
        table.rename_columns(|c| match c {
            "a" => Some("b".to_string()),
            "b" => Some("a".to_string()),
            _ => None,
        });

        assert_eq!(table.columns(), &["b".to_string(), "a".to_string()]);
        assert_eq!(table.rows()[0].get("b").unwrap(), &json!(1));
        assert_eq!(table.rows()[0].get("a").unwrap(), &json!(2));
    }

    #[test]
    fn test_select_skips_missing_columns() {
        let table = Table::from_rows("t", vec![row(json!({"a": 1, "b": 2}))]);
        let selected = table.select("s", &["b".to_string(), "zzz".to_string()]);

        assert_eq!(selected.name, "s");
        assert_eq!(selected.columns(), &["b".to_string()]);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_map_column_leaves_other_rows() {
        let mut table = Table::from_rows(
            "t",
            vec![row(json!({"a": "x"})), row(json!({"a": null}))],
        );
        table.map_column("a", |v| v.as_str().map(|_| json!("y")));

        assert_eq!(table.rows()[0].get("a").unwrap(), "y");
        assert!(table.rows()[1].get("a").unwrap().is_null());
    }
}
