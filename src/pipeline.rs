use crate::config::{Environment, FetchSettings, PipelineSettings};
use crate::error::{EtlError, Result, RunStatus};
use crate::normalize::{Batch, Normalizer, Table};
use crate::sink::{CsvWriter, TableSink};
use crate::source::{DocumentSource, FetchWindow};
use tracing::{error, info, warn};

/// What happened to one destination table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// Rows appended
    Written(u64),
    /// Nothing to write
    Empty,
    /// The destination rejected the batch on a uniqueness constraint
    SkippedDuplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub destination: String,
    pub rows: usize,
    pub outcome: TableOutcome,
}

/// Summary of one environment run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub environment: Environment,
    pub documents: usize,
    pub tables: Vec<TableReport>,
}

impl RunReport {
    pub fn skipped(&self) -> impl Iterator<Item = &TableReport> {
        self.tables
            .iter()
            .filter(|t| t.outcome == TableOutcome::SkippedDuplicate)
    }
}

/// Extract, normalize and load one environment at a time
pub struct Pipeline {
    normalizer: Normalizer,
    fetch: FetchSettings,
    csv: Option<CsvWriter>,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Result<Self> {
        let csv = match &settings.csv_dir {
            Some(dir) => Some(CsvWriter::new(dir)?),
            None => None,
        };

        Ok(Pipeline {
            normalizer: Normalizer::new(settings.flatten, settings.schema),
            fetch: settings.fetch,
            csv,
        })
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Run the whole job for one environment
    ///
    /// The collection read is named after the environment and every table is
    /// appended to `{environment}_{entity}`.
    pub fn run<S, K>(&self, environment: Environment, source: &mut S, sink: &mut K) -> Result<RunReport>
    where
        S: DocumentSource + ?Sized,
        K: TableSink + ?Sized,
    {
        info!(%environment, "Starting migration");

        let window = FetchWindow::from_settings(&self.fetch);
        let documents = source
            .fetch(environment.as_str(), &window)
            .map_err(|e| {
                error!(%environment, error = %e, "Failed to read source documents");
                e
            })?;
        let count = documents.len();

        let batch = self.normalizer.normalize(documents);

        if let Some(csv) = &self.csv {
            for table in batch.tables() {
                csv.write_table(table)?;
            }
        }

        let tables = write_batch(environment, &batch, sink)?;

        info!(%environment, documents = count, "Migration finished");
        Ok(RunReport {
            environment,
            documents: count,
            tables,
        })
    }
}

/// Append every table of a batch, in write order
///
/// A duplicate-key conflict skips that table only. Any other failure stops
/// the run; tables already written stay written.
pub fn write_batch<K>(environment: Environment, batch: &Batch, sink: &mut K) -> Result<Vec<TableReport>>
where
    K: TableSink + ?Sized,
{
    let mut reports = Vec::new();
    for table in batch.tables() {
        reports.push(write_table(environment, table, sink)?);
    }
    Ok(reports)
}

fn write_table<K>(environment: Environment, table: &Table, sink: &mut K) -> Result<TableReport>
where
    K: TableSink + ?Sized,
{
    let destination = environment.table_name(&table.name);
    let rows = table.len();

    if table.is_empty() {
        warn!(destination = %destination, "No rows to write");
        return Ok(TableReport {
            destination,
            rows,
            outcome: TableOutcome::Empty,
        });
    }

    let outcome = match sink.append(&destination, table) {
        Ok(written) => {
            info!(destination = %destination, rows = written, "Appended rows");
            TableOutcome::Written(written)
        }
        Err(EtlError::DuplicateKey { table: conflicted }) => {
            info!("Duplicate key on {} table", conflicted);
            TableOutcome::SkippedDuplicate
        }
        Err(e) => {
            error!(destination = %destination, error = %e, "Failed to write table");
            return Err(e);
        }
    };

    Ok(TableReport {
        destination,
        rows,
        outcome,
    })
}

/// Status object for a finished run
pub fn run_status(result: &Result<RunReport>) -> RunStatus {
    match result {
        Ok(_) => RunStatus::ok(),
        Err(e) => e.status(),
    }
}
