//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.agedensity.toml` files.

use crate::models::{AreaCodeGroup, AreaPrefix};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".agedensity.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Dataset settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Departments and their arrondissements.
    #[serde(default = "default_regions")]
    pub regions: Vec<AreaCodeGroup>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            data: DataConfig::default(),
            report: ReportConfig::default(),
            regions: default_regions(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "density_report.md".to_string()
}

/// Census table settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Path to the census table.
    #[serde(default = "default_data_path")]
    pub path: String,

    /// Field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Column holding the geographic code.
    #[serde(default = "default_code_column")]
    pub code_column: String,

    /// Rows whose code starts with none of these are dropped at load time.
    #[serde(default = "default_region_prefixes")]
    pub region_prefixes: Vec<String>,

    /// Absolute tolerance when checking that bands add up to the total.
    #[serde(default = "default_quality_tolerance")]
    pub quality_tolerance: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            delimiter: default_delimiter(),
            code_column: default_code_column(),
            region_prefixes: default_region_prefixes(),
            quality_tolerance: default_quality_tolerance(),
        }
    }
}

fn default_data_path() -> String {
    "data/dossier_complet/dossier_complet.csv".to_string()
}

fn default_delimiter() -> char {
    ';'
}

fn default_code_column() -> String {
    "CODGEO".to_string()
}

fn default_region_prefixes() -> Vec<String> {
    vec!["14", "27", "50", "61", "76"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_quality_tolerance() -> f64 {
    0.5
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Age group for densities: "60+", "75+" or "90+".
    #[serde(default = "default_selector")]
    pub selector: String,

    /// Number of communes in the ranking.
    #[serde(default = "default_top_communes")]
    pub top_communes: usize,

    /// Include the data-quality section.
    #[serde(default = "default_true")]
    pub include_quality: bool,

    /// Maximum data-quality findings listed individually.
    #[serde(default = "default_quality_samples")]
    pub max_quality_samples: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            selector: default_selector(),
            top_communes: default_top_communes(),
            include_quality: true,
            max_quality_samples: default_quality_samples(),
        }
    }
}

fn default_selector() -> String {
    "75+".to_string()
}

fn default_top_communes() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_quality_samples() -> usize {
    20
}

/// The five departments of Normandy and their arrondissements.
fn default_regions() -> Vec<AreaCodeGroup> {
    let group = |name: &str, areas: &[(&str, &str)]| AreaCodeGroup {
        name: name.to_string(),
        areas: areas
            .iter()
            .map(|(code, name)| AreaPrefix::new(code, name))
            .collect(),
    };

    vec![
        group(
            "Calvados",
            &[
                ("141", "Bayeux"),
                ("142", "Caen"),
                ("143", "Lisieux"),
                ("144", "Vire"),
            ],
        ),
        group(
            "Eure",
            &[("271", "Les Andelys"), ("272", "Bernay"), ("273", "Evreux")],
        ),
        group(
            "La Manche",
            &[
                ("501", "Avranches"),
                ("502", "Cherbourg"),
                ("503", "Coutances"),
                ("504", "Saint-Lô"),
            ],
        ),
        group(
            "Orne",
            &[
                ("611", "Alençon"),
                ("612", "Argentan"),
                ("613", "Mortagne-au-Perche"),
            ],
        ),
        group(
            "Seine-Maritime",
            &[("761", "Dieppe"), ("762", "Le Havre"), ("763", "Rouen")],
        ),
    ]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data) = args.data {
            self.data.path = data.display().to_string();
        }
        if let Some(delimiter) = args.delimiter {
            self.data.delimiter = delimiter;
        }
        if let Some(ref selector) = args.selector {
            self.report.selector = selector.clone();
        }
        if let Some(top) = args.top {
            self.report.top_communes = top;
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
