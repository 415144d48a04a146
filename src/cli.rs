//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Agedensity - elderly-population density reports from INSEE census tables
///
/// Computes the mean density of elderly residents per arrondissement, the
/// age distribution of selected communes and the communes with the highest
/// density. Markdown/JSON reports.
///
/// Examples:
///   agedensity --data data/dossier_complet.csv
///   agedensity --data data/dossier_complet.csv --selector 60+ --top 20
///   agedensity --data data/dossier_complet.csv --codes 14118,50129 --format json
///   agedensity --data data/dossier_complet.csv --dry-run
///   agedensity --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the census table (semicolon-delimited CSV)
    ///
    /// Overrides `data.path` from the configuration file.
    #[arg(short, long, value_name = "FILE", env = "AGEDENSITY_DATA")]
    pub data: Option<PathBuf>,

    /// Age group for density computations (60+, 75+, 90+)
    #[arg(short, long, value_name = "GROUP", env = "AGEDENSITY_SELECTOR")]
    pub selector: Option<String>,

    /// Restrict the age distribution to these exact area codes (comma-separated)
    ///
    /// Example: --codes 14118,50129
    #[arg(long, value_name = "CODES", value_delimiter = ',')]
    pub codes: Option<Vec<String>>,

    /// Number of communes in the density ranking
    #[arg(short, long, value_name = "COUNT")]
    pub top: Option<usize>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Field delimiter of the census table
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<char>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .agedensity.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Dry run: load and validate the table without writing a report
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .agedensity.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(top) = self.top {
            if top == 0 {
                return Err("Top must be at least 1".to_string());
            }
        }

        if let Some(ref codes) = self.codes {
            if codes.iter().any(|c| c.trim().is_empty()) {
                return Err("Area codes must not be empty".to_string());
            }
        }

        if let Some(delimiter) = self.delimiter {
            if !delimiter.is_ascii() {
                return Err("Delimiter must be a single ASCII character".to_string());
            }
        }

        if let Some(ref data) = self.data {
            if !data.exists() {
                return Err(format!("Data file does not exist: {}", data.display()));
            }
            if !data.is_file() {
                return Err(format!("Data path is not a file: {}", data.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `verbose_by_default` comes from `general.verbose` in the config file;
    /// `--quiet` still wins over it.
    pub fn log_level(&self, verbose_by_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_by_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Area codes selected for the distribution, empty for all.
    pub fn selected_codes(&self) -> Vec<String> {
        self.codes
            .as_ref()
            .map(|codes| codes.iter().map(|c| c.trim().to_string()).collect())
            .unwrap_or_default()
    }
}
