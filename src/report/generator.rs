//! Markdown and JSON report generation.
//!
//! Each table carries the labels and values the dashboard charts plotted:
//! densities per arrondissement, the age distribution and the top communes.

use crate::models::{
    Distribution, GroupDensity, QualitySummary, RankedArea, Report, ReportMetadata,
};
use anyhow::Result;

/// Width of the text bars in the density table.
const BAR_WIDTH: usize = 20;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Elderly Population Density Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_density_section(
        &report.densities,
        &report.metadata,
    ));
    output.push_str(&generate_distribution_section(report.distribution.as_ref()));
    output.push_str(&generate_top_areas_section(
        &report.top_areas,
        &report.metadata,
    ));
    output.push_str(&generate_quality_section(&report.quality));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Dataset:** `{}`\n", metadata.dataset));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Age Group:** {}\n", metadata.selector));
    section.push_str(&format!(
        "- **Records Loaded:** {}\n",
        metadata.records_loaded
    ));
    if metadata.records_skipped > 0 {
        section.push_str(&format!(
            "- **Rows Skipped:** {}\n",
            metadata.records_skipped
        ));
    }
    section.push_str(&format!(
        "- **Duration:** {:.2}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Text bar proportional to `value / max`.
fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 {
        return String::new();
    }
    let filled = ((value / max) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(filled.min(BAR_WIDTH))
}

/// Generate the density-by-arrondissement section.
fn generate_density_section(densities: &[GroupDensity], metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "## Density of People Aged {} by Arrondissement\n\n",
        metadata.selector
    ));

    if densities.is_empty() {
        section.push_str("No arrondissements configured.\n\n");
        return section;
    }

    let max = densities
        .iter()
        .filter_map(|d| d.mean)
        .fold(0.0_f64, f64::max);

    section.push_str("| Department | Arrondissement | Communes | Density (%) | |\n");
    section.push_str("|:---|:---|:---:|---:|:---|\n");

    for density in densities {
        let (value, chart) = match density.mean {
            Some(mean) => (format!("{:.2}", mean), bar(mean, max)),
            None => ("n/a".to_string(), String::new()),
        };
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            density.group, density.label, density.records, value, chart
        ));
    }
    section.push('\n');

    section
}

/// Generate the age distribution section.
fn generate_distribution_section(distribution: Option<&Distribution>) -> String {
    let mut section = String::new();

    section.push_str("## Population Distribution by Age Group\n\n");

    let distribution = match distribution {
        Some(d) => d,
        None => {
            section.push_str(
                "Not available: no record matched the selected area codes, \
                 or the table lacks some age-band columns.\n\n",
            );
            return section;
        }
    };

    if distribution.codes.is_empty() {
        section.push_str(&format!(
            "*All {} communes in the region*\n\n",
            distribution.records
        ));
    } else {
        section.push_str(&format!(
            "*Area codes: {}*\n\n",
            distribution.codes.join(", ")
        ));
    }

    if distribution.excluded > 0 {
        section.push_str(&format!(
            "{} communes with zero population were left out.\n\n",
            distribution.excluded
        ));
    }

    if distribution.shares.is_empty() {
        section.push_str("No commune with a non-zero population.\n\n");
        return section;
    }

    section.push_str("| Age Group | Share (%) |\n");
    section.push_str("|:---|---:|\n");
    for share in &distribution.shares {
        section.push_str(&format!(
            "| {} | {:.2} |\n",
            share.label,
            share.fraction * 100.0
        ));
    }
    section.push('\n');

    section
}

/// Generate the top communes section.
fn generate_top_areas_section(top_areas: &[RankedArea], metadata: &ReportMetadata) -> String {
    if top_areas.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str(&format!(
        "## Top {} Communes by Density of People Aged {}\n\n",
        top_areas.len(),
        metadata.selector
    ));
    section.push_str("| Rank | Commune | Population | Density (%) |\n");
    section.push_str("|:---:|:---|---:|---:|\n");

    for (i, area) in top_areas.iter().enumerate() {
        section.push_str(&format!(
            "| {} | `{}` | {:.0} | {:.2} |\n",
            i + 1,
            area.area_code,
            area.total,
            area.density
        ));
    }
    section.push('\n');

    section
}

/// Generate the data-quality section.
fn generate_quality_section(quality: &QualitySummary) -> String {
    if quality.total == 0 {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Data Quality\n\n");
    section.push_str(&format!(
        "{} data-quality findings across {} records. They are reported, not corrected.\n\n",
        quality.total, quality.records
    ));

    section.push_str("| Finding | Count |\n");
    section.push_str("|:---|:---:|\n");
    for (kind, count) in &quality.by_kind {
        section.push_str(&format!("| {} | {} |\n", kind, count));
    }
    section.push('\n');

    if !quality.samples.is_empty() {
        for issue in &quality.samples {
            section.push_str(&format!(
                "- `{}` {}: {}\n",
                issue.area_code, issue.kind, issue.detail
            ));
        }
        if quality.samples.len() < quality.total {
            section.push_str(&format!(
                "- ... and {} more\n",
                quality.total - quality.samples.len()
            ));
        }
        section.push('\n');
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Source: INSEE, dossier complet (population by age, 2020 census)*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AgeBand, AgeGroupSelector, BandShare, DataQualityIssue, QualityKind,
    };
    use chrono::Utc;

    fn create_metadata() -> ReportMetadata {
        ReportMetadata {
            dataset: "data/dossier_complet.csv".to_string(),
            analysis_date: Utc::now(),
            selector: AgeGroupSelector::SeventyFivePlus,
            records_loaded: 2650,
            records_skipped: 3,
            duration_seconds: 0.42,
        }
    }

    fn create_test_report() -> Report {
        let issues = vec![DataQualityIssue {
            area_code: "14999".to_string(),
            kind: QualityKind::ZeroTotal,
            detail: "total population is zero".to_string(),
        }];

        Report {
            metadata: create_metadata(),
            densities: vec![
                GroupDensity {
                    group: "Calvados".to_string(),
                    code: "141".to_string(),
                    label: "Bayeux (141)".to_string(),
                    records: 140,
                    mean: Some(12.5),
                },
                GroupDensity {
                    group: "Calvados".to_string(),
                    code: "144".to_string(),
                    label: "Vire (144)".to_string(),
                    records: 0,
                    mean: None,
                },
            ],
            distribution: Some(Distribution {
                codes: vec!["14118".to_string()],
                records: 1,
                excluded: 0,
                shares: vec![
                    BandShare {
                        band: AgeBand::Age0To14,
                        label: "Ages 0-14".to_string(),
                        fraction: 0.75,
                    },
                    BandShare {
                        band: AgeBand::Age90Plus,
                        label: "Ages 90+".to_string(),
                        fraction: 0.25,
                    },
                ],
            }),
            top_areas: vec![RankedArea {
                area_code: "14300".to_string(),
                total: 10.0,
                density: 30.0,
            }],
            quality: QualitySummary::from_issues(&issues, 10),
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Elderly Population Density Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("Density of People Aged 75+ by Arrondissement"));
        assert!(markdown.contains("| Calvados | Bayeux (141) | 140 | 12.50 |"));
        assert!(markdown.contains("| Calvados | Vire (144) | 0 | n/a |"));
        assert!(markdown.contains("| Ages 0-14 | 75.00 |"));
        assert!(markdown.contains("Top 1 Communes"));
        assert!(markdown.contains("`14300`"));
        assert!(markdown.contains("## Data Quality"));
    }

    #[test]
    fn test_generate_metadata_section() {
        let section = generate_metadata_section(&create_metadata());

        assert!(section.contains("data/dossier_complet.csv"));
        assert!(section.contains("**Age Group:** 75+"));
        assert!(section.contains("2650"));
        assert!(section.contains("Rows Skipped:"));
    }

    #[test]
    fn test_distribution_section_without_match() {
        let section = generate_distribution_section(None);
        assert!(section.contains("Not available"));
    }

    #[test]
    fn test_quality_section_counts_findings_and_records() {
        let issue = |kind| DataQualityIssue {
            area_code: "14555".to_string(),
            kind,
            detail: String::new(),
        };
        let issues = vec![
            issue(QualityKind::BandExceedsTotal),
            issue(QualityKind::BandSumMismatch),
        ];

        let section = generate_quality_section(&QualitySummary::from_issues(&issues, 10));
        assert!(section.contains("2 data-quality findings across 1 records"));
    }

    #[test]
    fn test_quality_section_omitted_when_clean() {
        assert!(generate_quality_section(&QualitySummary::default()).is_empty());
    }

    #[test]
    fn test_bar() {
        assert_eq!(bar(10.0, 10.0).chars().count(), BAR_WIDTH);
        assert_eq!(bar(5.0, 10.0).chars().count(), BAR_WIDTH / 2);
        assert!(bar(5.0, 0.0).is_empty());
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"densities\""));
        assert!(json.contains("\"selector\": \"75+\""));
        assert!(json.contains("\"zero_total\""));
    }
}
