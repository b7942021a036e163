use crate::normalize::table::Table;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Drop later rows whose key tuple repeats an earlier one
///
/// The first occurrence of each key survives and row order is preserved.
/// `null` is an ordinary key value here; use [`drop_missing_keys`] first
/// when a null key should not be stored at all. Keys compare by their JSON
/// text, so `1` and `1.0` are different keys; natural keys here are strings.
/// Returns the number of rows removed.
pub fn deduplicate(table: &mut Table, keys: &[&str]) -> usize {
    let before = table.len();
    let mut seen = HashSet::with_capacity(before);

    table.retain_rows(|row| {
        let key: Vec<&Value> = keys
            .iter()
            .map(|k| row.get(*k).unwrap_or(&Value::Null))
            .collect();
        // Value is not Hash; its canonical JSON text is.
        let fingerprint = serde_json::to_string(&key).unwrap_or_default();
        seen.insert(fingerprint)
    });

    let removed = before - table.len();
    if removed > 0 {
        debug!(table = %table.name, removed, "Dropped duplicate rows");
    }
    removed
}

/// Drop rows whose `key` is null or absent
pub fn drop_missing_keys(table: &mut Table, key: &str) -> usize {
    let before = table.len();
    table.retain_rows(|row| !row.get(key).map_or(true, Value::is_null));
    before - table.len()
}
