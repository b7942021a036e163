//! Table sinks
//!
//! [`PostgresSink`] appends tables to the warehouse. [`CsvWriter`] writes the
//! same tables to one delimited file per entity for inspection.

use crate::error::{EtlError, Result};
use crate::normalize::Table;
use postgres::error::SqlState;
use postgres::types::Json;
use postgres::Client;
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Destination for cleaned tables
pub trait TableSink {
    /// Append every row of `table` to `destination`, returning rows written
    ///
    /// A uniqueness conflict must surface as [`EtlError::DuplicateKey`] so the
    /// caller can skip the table and carry on.
    fn append(&mut self, destination: &str, table: &Table) -> Result<u64>;
}

/// Appends to pre-existing PostgreSQL tables
///
/// Rows travel as one JSON array parameter and are expanded server-side
/// with `json_populate_recordset`, so column types come from the
/// destination table. Each append runs in its own transaction.
pub struct PostgresSink<'c> {
    client: &'c mut Client,
}

impl<'c> PostgresSink<'c> {
    pub fn new(client: &'c mut Client) -> Self {
        PostgresSink { client }
    }
}

impl TableSink for PostgresSink<'_> {
    fn append(&mut self, destination: &str, table: &Table) -> Result<u64> {
        let sql = insert_statement(destination, table.columns());
        let payload = Value::Array(table.rows().iter().cloned().map(Value::Object).collect());

        let mut tx = self.client.transaction()?;
        let written = match tx.execute(sql.as_str(), &[&Json(&payload)]) {
            Ok(n) => n,
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                debug!(destination, error = %e, "Unique violation");
                return Err(EtlError::DuplicateKey {
                    table: destination.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit()?;

        Ok(written)
    }
}

/// Double-quote an identifier
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `INSERT ... SELECT ... FROM json_populate_recordset(NULL::dest, $1)`
pub fn insert_statement(destination: &str, columns: &[String]) -> String {
    let table = quote_ident(destination);
    let cols = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {table} ({cols}) SELECT {cols} FROM json_populate_recordset(NULL::{table}, $1)",
        table = table,
        cols = cols
    )
}

/// Writes each table to `<dir>/<entity>.csv`
pub struct CsvWriter {
    dir: PathBuf,
}

impl CsvWriter {
    /// Create a writer for a directory, creating it if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(CsvWriter {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn path_for(&self, table: &Table) -> PathBuf {
        self.dir.join(format!("{}.csv", table.name))
    }

    pub fn write_table(&self, table: &Table) -> Result<PathBuf> {
        let path = self.path_for(table);
        let file = File::create(&path)?;
        write_csv(file, table)?;
        info!(table = %table.name, path = %path.display(), rows = table.len(), "Wrote side file");
        Ok(path)
    }
}

/// Render a table as CSV with a header row
///
/// Strings are written raw, nulls as empty fields and nested values as JSON.
pub fn write_csv<W: Write>(writer: W, table: &Table) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(table.columns())?;

    for row in table.rows() {
        let record: Vec<String> = table
            .columns()
            .iter()
            .map(|c| match row.get(c) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        out.write_record(&record)?;
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Row;
    use serde_json::json;

    fn table() -> Table {
        let rows: Vec<Row> = vec![
            json!({"user_id": "u1", "name": "Ann, Jr.", "score": 3, "tags": ["a"]}),
            json!({"user_id": "u2", "name": null}),
        ]
        .into_iter()
        .map(|r| serde_json::from_value(r).unwrap())
        .collect();
        Table::from_rows("users", rows)
    }

    #[test]
    fn test_insert_statement() {
        let sql = insert_statement(
            "production_users",
            &["user_id".to_string(), "odd\"name".to_string()],
        );

        assert_eq!(
            sql,
            "INSERT INTO \"production_users\" (\"user_id\", \"odd\"\"name\") \
             SELECT \"user_id\", \"odd\"\"name\" \
             FROM json_populate_recordset(NULL::\"production_users\", $1)"
        );
    }

    #[test]
    fn test_write_csv() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &table()).unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "user_id,name,score,tags");
        assert_eq!(lines[1], "u1,\"Ann, Jr.\",3,\"[\"\"a\"\"]\"");
        assert_eq!(lines[2], "u2,,,");
    }

    #[test]
    fn test_csv_writer_names_file_after_entity() {
        let dir = std::env::temp_dir().join(format!("share-etl-csv-{}", std::process::id()));
        let writer = CsvWriter::new(&dir).unwrap();

        let path = writer.write_table(&table()).unwrap();

        assert_eq!(path, dir.join("users.csv"));
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("user_id,"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
