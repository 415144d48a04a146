//! Census table loader.
//!
//! This module reads the delimited census table into population records,
//! keeping only rows inside the configured region and only the columns the
//! engine knows about.

use crate::error::EngineError;
use crate::models::{AgeBand, PopulationRecord, TOTAL_COLUMN};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rows between spinner updates.
const PROGRESS_INTERVAL: usize = 5_000;

/// Configuration for table loading.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Field delimiter.
    pub delimiter: u8,
    /// Column holding the geographic code.
    pub code_column: String,
    /// Region prefixes; empty keeps every row.
    pub region_prefixes: Vec<String>,
    /// Whether to show a spinner while reading.
    pub show_progress: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            delimiter: b';',
            code_column: "CODGEO".to_string(),
            region_prefixes: Vec::new(),
            show_progress: false,
        }
    }
}

impl TryFrom<&crate::config::DataConfig> for LoadConfig {
    type Error = anyhow::Error;

    /// The csv reader splits on a single byte, so the delimiter must be ASCII.
    fn try_from(config: &crate::config::DataConfig) -> Result<Self> {
        if !config.delimiter.is_ascii() {
            anyhow::bail!(
                "Delimiter must be a single ASCII character, got {:?}",
                config.delimiter
            );
        }

        Ok(Self {
            delimiter: config.delimiter as u8,
            code_column: config.code_column.clone(),
            region_prefixes: config.region_prefixes.clone(),
            show_progress: true,
        })
    }
}

/// Counters describing a load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Data rows read from the file.
    pub rows_read: usize,
    /// Rows dropped because their code is outside the region.
    pub rows_out_of_region: usize,
    /// Rows dropped because a numeric cell was blank or invalid.
    pub rows_skipped: usize,
    /// Band columns found in the header.
    pub bands_present: Vec<AgeBand>,
}

/// Records plus the load summary.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub records: Vec<PopulationRecord>,
    pub summary: LoadSummary,
}

/// Column positions resolved from the header row.
struct ColumnIndex {
    code: usize,
    total: usize,
    bands: Vec<(AgeBand, usize)>,
}

impl ColumnIndex {
    fn resolve(headers: &csv::StringRecord, code_column: &str) -> Result<Self, EngineError> {
        let position = |name: &str| headers.iter().position(|h| h == name);

        let code = position(code_column)
            .ok_or_else(|| EngineError::MissingColumn(code_column.to_string()))?;
        let total = position(TOTAL_COLUMN)
            .ok_or_else(|| EngineError::MissingColumn(TOTAL_COLUMN.to_string()))?;
        let mut bands: Vec<(AgeBand, usize)> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| AgeBand::from_column(h).map(|band| (band, i)))
            .collect();
        bands.sort_by_key(|(band, _)| *band);
        bands.dedup_by_key(|(band, _)| *band);

        Ok(Self { code, total, bands })
    }
}

/// Parse a population count; blank, non-numeric and negative cells yield `None`.
fn parse_count(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }

    let value: f64 = cell.replace(',', ".").parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

/// Loader for census tables.
pub struct TableLoader {
    config: LoadConfig,
}

impl TableLoader {
    /// Create a new loader.
    pub fn new(config: LoadConfig) -> Self {
        Self { config }
    }

    /// Load a table from a file.
    pub fn load(&self, path: &Path) -> Result<LoadedTable> {
        info!("Loading census table: {}", path.display());

        let file = File::open(path)
            .with_context(|| format!("Failed to open census table: {}", path.display()))?;

        self.load_from_reader(file)
            .with_context(|| format!("Failed to load census table: {}", path.display()))
    }

    /// Load a table from any reader.
    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<LoadedTable> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers().context("Failed to read header row")?.clone();
        let columns = ColumnIndex::resolve(&headers, &self.config.code_column)?;

        let mut summary = LoadSummary {
            bands_present: columns.bands.iter().map(|(band, _)| *band).collect(),
            ..LoadSummary::default()
        };
        debug!("Band columns present: {:?}", summary.bands_present);

        let spinner = self.spinner();
        let mut records = Vec::new();

        for result in rdr.records() {
            let row = result.context("Failed to read census row")?;
            summary.rows_read += 1;

            if summary.rows_read % PROGRESS_INTERVAL == 0 {
                if let Some(ref pb) = spinner {
                    pb.set_message(format!("{} rows read", summary.rows_read));
                }
            }

            let code = row.get(columns.code).unwrap_or("");
            if !self.in_region(code) {
                summary.rows_out_of_region += 1;
                continue;
            }

            match Self::parse_row(&row, code, &columns) {
                Some(record) => records.push(record),
                None => {
                    debug!("Skipping row {} ({}): invalid count", summary.rows_read, code);
                    summary.rows_skipped += 1;
                }
            }
        }

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        if summary.rows_skipped > 0 {
            warn!(
                "Skipped {} rows with blank or invalid population counts",
                summary.rows_skipped
            );
        }
        info!(
            "Loaded {} records ({} rows read, {} outside region)",
            records.len(),
            summary.rows_read,
            summary.rows_out_of_region
        );

        Ok(LoadedTable { records, summary })
    }

    /// Check whether a code belongs to the configured region.
    fn in_region(&self, code: &str) -> bool {
        self.config.region_prefixes.is_empty()
            || self
                .config
                .region_prefixes
                .iter()
                .any(|prefix| code.starts_with(prefix.as_str()))
    }

    fn parse_row(
        row: &csv::StringRecord,
        code: &str,
        columns: &ColumnIndex,
    ) -> Option<PopulationRecord> {
        let total = parse_count(row.get(columns.total)?)?;
        let mut record = PopulationRecord::new(code, total);

        for (band, index) in &columns.bands {
            let count = parse_count(row.get(*index)?)?;
            record = record.with_band(*band, count);
        }

        Some(record)
    }

    fn spinner(&self) -> Option<ProgressBar> {
        if !self.config.show_progress {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Reading census table...");
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }
}
