//! Data models for the census aggregation.
//!
//! This module contains the core data structures used throughout the
//! application: age bands, population records, derived metrics and the
//! report itself.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column holding the total population of a geographic unit.
pub const TOTAL_COLUMN: &str = "P20_POP";

/// One of the seven fixed age bands of the census table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    #[serde(rename = "0-14")]
    Age0To14,
    #[serde(rename = "15-29")]
    Age15To29,
    #[serde(rename = "30-44")]
    Age30To44,
    #[serde(rename = "45-59")]
    Age45To59,
    #[serde(rename = "60-74")]
    Age60To74,
    #[serde(rename = "75-89")]
    Age75To89,
    #[serde(rename = "90+")]
    Age90Plus,
}

impl AgeBand {
    /// All bands, youngest first. This order aligns fraction vectors with labels.
    pub const ALL: [AgeBand; 7] = [
        AgeBand::Age0To14,
        AgeBand::Age15To29,
        AgeBand::Age30To44,
        AgeBand::Age45To59,
        AgeBand::Age60To74,
        AgeBand::Age75To89,
        AgeBand::Age90Plus,
    ];

    /// Position of the band in [`AgeBand::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Source column name in the census table.
    pub fn column(self) -> &'static str {
        match self {
            AgeBand::Age0To14 => "P20_POP0014",
            AgeBand::Age15To29 => "P20_POP1529",
            AgeBand::Age30To44 => "P20_POP3044",
            AgeBand::Age45To59 => "P20_POP4559",
            AgeBand::Age60To74 => "P20_POP6074",
            AgeBand::Age75To89 => "P20_POP7589",
            AgeBand::Age90Plus => "P20_POP90P",
        }
    }

    /// Display label used by the report.
    pub fn label(self) -> &'static str {
        match self {
            AgeBand::Age0To14 => "Ages 0-14",
            AgeBand::Age15To29 => "Ages 15-29",
            AgeBand::Age30To44 => "Ages 30-44",
            AgeBand::Age45To59 => "Ages 45-59",
            AgeBand::Age60To74 => "Ages 60-74",
            AgeBand::Age75To89 => "Ages 75-89",
            AgeBand::Age90Plus => "Ages 90+",
        }
    }

    /// Look up a band by its source column name.
    pub fn from_column(column: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.column() == column)
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Age-group selector for density computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgeGroupSelector {
    #[serde(rename = "60+")]
    SixtyPlus,
    #[default]
    #[serde(rename = "75+")]
    SeventyFivePlus,
    #[serde(rename = "90+")]
    NinetyPlus,
}

impl AgeGroupSelector {
    /// Bands summed by this selector.
    pub fn bands(self) -> &'static [AgeBand] {
        match self {
            AgeGroupSelector::SixtyPlus => &[
                AgeBand::Age60To74,
                AgeBand::Age75To89,
                AgeBand::Age90Plus,
            ],
            AgeGroupSelector::SeventyFivePlus => &[AgeBand::Age75To89, AgeBand::Age90Plus],
            AgeGroupSelector::NinetyPlus => &[AgeBand::Age90Plus],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgeGroupSelector::SixtyPlus => "60+",
            AgeGroupSelector::SeventyFivePlus => "75+",
            AgeGroupSelector::NinetyPlus => "90+",
        }
    }
}

impl fmt::Display for AgeGroupSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgeGroupSelector {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "60+" => Ok(AgeGroupSelector::SixtyPlus),
            "75+" => Ok(AgeGroupSelector::SeventyFivePlus),
            "90+" => Ok(AgeGroupSelector::NinetyPlus),
            other => Err(EngineError::InvalidSelector(other.to_string())),
        }
    }
}

/// One row of the census table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    /// Geographic code of the unit (commune code).
    pub area_code: String,
    /// Total population (`P20_POP`).
    pub total: f64,
    /// Per-band counts in [`AgeBand::ALL`] order; `None` when the column was not loaded.
    pub bands: [Option<f64>; 7],
}

impl PopulationRecord {
    /// Creates a record with no band counts.
    pub fn new(area_code: impl Into<String>, total: f64) -> Self {
        Self {
            area_code: area_code.into(),
            total,
            bands: [None; 7],
        }
    }

    /// Builder-style setter for a band count.
    pub fn with_band(mut self, band: AgeBand, count: f64) -> Self {
        self.bands[band.index()] = Some(count);
        self
    }

    /// Count for a band, if supplied.
    pub fn band(&self, band: AgeBand) -> Option<f64> {
        self.bands[band.index()]
    }
}

/// A named set of area-code prefixes (a department and its arrondissements).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaCodeGroup {
    /// Group name, e.g. "Calvados".
    pub name: String,
    /// Prefixes with their display names, in report order.
    pub areas: Vec<AreaPrefix>,
}

/// A single area-code prefix and its display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaPrefix {
    pub code: String,
    pub name: String,
}

impl AreaPrefix {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }

    /// Label in the form `Bayeux (141)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.code)
    }
}

/// Per-record densities plus their mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityResult {
    /// Density percentage per input record; `None` for zero-population records.
    pub values: Vec<Option<f64>>,
    /// Mean over the defined values.
    pub mean: Option<f64>,
    /// Number of records excluded from the mean.
    pub excluded: usize,
}

/// Per-record fraction vectors plus the column-wise mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FractionResult {
    /// Bands in output order.
    pub bands: Vec<AgeBand>,
    /// Fractions per record, aligned with `bands`; `None` for zero-population records.
    pub rows: Vec<Option<Vec<f64>>>,
    /// Column-wise mean over the defined rows.
    pub mean: Option<Vec<f64>>,
    /// Number of records excluded from the mean.
    pub excluded: usize,
}

impl FractionResult {
    /// Labels zipped with mean fractions, for presentation.
    pub fn labelled_mean(&self) -> Vec<BandShare> {
        match self.mean {
            Some(ref mean) => self
                .bands
                .iter()
                .zip(mean)
                .map(|(band, fraction)| BandShare {
                    band: *band,
                    label: band.label().to_string(),
                    fraction: *fraction,
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Mean density for one area-code prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDensity {
    /// Name of the owning group (department).
    pub group: String,
    /// Prefix code, e.g. "141".
    pub code: String,
    /// Display label, e.g. "Bayeux (141)".
    pub label: String,
    /// Number of records matching the prefix.
    pub records: usize,
    /// Mean density in percent; `None` if no record contributed.
    pub mean: Option<f64>,
}

/// A commune ranked by density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedArea {
    pub area_code: String,
    pub total: f64,
    pub density: f64,
}

/// One entry of a distribution, ready for a pie chart or table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandShare {
    pub band: AgeBand,
    pub label: String,
    pub fraction: f64,
}

/// Kind of data-quality problem found by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityKind {
    /// Total population is zero; densities are undefined.
    ZeroTotal,
    /// A single band exceeds the total.
    BandExceedsTotal,
    /// The band counts do not add up to the total.
    BandSumMismatch,
}

impl fmt::Display for QualityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityKind::ZeroTotal => write!(f, "Zero total population"),
            QualityKind::BandExceedsTotal => write!(f, "Band exceeds total"),
            QualityKind::BandSumMismatch => write!(f, "Band sum mismatch"),
        }
    }
}

/// A data-quality finding for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityIssue {
    pub area_code: String,
    pub kind: QualityKind,
    pub detail: String,
}

/// Summary of data-quality findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    /// Total number of findings.
    pub total: usize,
    /// Distinct records with at least one finding.
    pub records: usize,
    /// Findings by kind.
    pub by_kind: std::collections::BTreeMap<QualityKind, usize>,
    /// First few findings, for display.
    pub samples: Vec<DataQualityIssue>,
}

impl QualitySummary {
    /// Creates a summary keeping at most `max_samples` findings.
    pub fn from_issues(issues: &[DataQualityIssue], max_samples: usize) -> Self {
        let mut summary = Self {
            total: issues.len(),
            ..Self::default()
        };

        let mut codes = std::collections::BTreeSet::new();
        for issue in issues {
            *summary.by_kind.entry(issue.kind).or_insert(0) += 1;
            codes.insert(issue.area_code.as_str());
        }
        summary.records = codes.len();
        summary.samples = issues.iter().take(max_samples).cloned().collect();

        summary
    }
}

/// Age distribution section of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    /// Exact codes the distribution was restricted to; empty means all records.
    pub codes: Vec<String>,
    /// Records that entered the computation.
    pub records: usize,
    /// Records excluded for zero population.
    pub excluded: usize,
    /// Mean share per band.
    pub shares: Vec<BandShare>,
}

/// Metadata about the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the census table.
    pub dataset: String,
    /// Date and time of the run.
    pub analysis_date: DateTime<Utc>,
    /// Age group used for densities.
    pub selector: AgeGroupSelector,
    /// Rows kept by the loader.
    pub records_loaded: usize,
    /// Rows skipped by the loader.
    pub records_skipped: usize,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete density report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    /// Mean density per arrondissement, grouped by department.
    pub densities: Vec<GroupDensity>,
    /// Age distribution of the selected records.
    pub distribution: Option<Distribution>,
    /// Communes with the highest density.
    pub top_areas: Vec<RankedArea>,
    /// Data-quality findings.
    pub quality: QualitySummary,
}
