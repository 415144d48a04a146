//! Density and fraction aggregation over population records.
//!
//! Every function here is pure: inputs are borrowed, outputs are new values,
//! and nothing is cached between calls.

use crate::error::{EngineError, EngineResult};
use crate::models::{
    AgeBand, AgeGroupSelector, AreaCodeGroup, DataQualityIssue, DensityResult, Distribution,
    FractionResult, GroupDensity, PopulationRecord, QualityKind, RankedArea,
};
use tracing::{debug, warn};

/// Keep records whose area code starts with any of the prefixes.
pub fn filter_by_prefix<S: AsRef<str>>(
    records: &[PopulationRecord],
    prefixes: &[S],
) -> Vec<PopulationRecord> {
    records
        .iter()
        .filter(|r| prefixes.iter().any(|p| r.area_code.starts_with(p.as_ref())))
        .cloned()
        .collect()
}

/// Keep records whose area code equals one of the codes.
pub fn filter_by_exact_codes<S: AsRef<str>>(
    records: &[PopulationRecord],
    codes: &[S],
) -> Vec<PopulationRecord> {
    records
        .iter()
        .filter(|r| codes.iter().any(|c| r.area_code == c.as_ref()))
        .cloned()
        .collect()
}

/// Fetch a band count, failing if the loader did not supply the column.
fn require_band(record: &PopulationRecord, band: AgeBand) -> EngineResult<f64> {
    record
        .band(band)
        .ok_or_else(|| EngineError::MissingColumn(band.column().to_string()))
}

/// Density of one record in percent, `None` when the total is zero.
fn record_density(
    record: &PopulationRecord,
    selector: AgeGroupSelector,
) -> EngineResult<Option<f64>> {
    let mut selected = 0.0;
    for band in selector.bands() {
        selected += require_band(record, *band)?;
    }

    if record.total == 0.0 {
        return Ok(None);
    }
    Ok(Some(selected / record.total * 100.0))
}

/// Arithmetic mean of the defined values.
fn mean_defined(values: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Compute per-record elderly density and its mean.
///
/// Records with a zero total population yield `None` and are left out of
/// the mean.
pub fn compute_density(
    records: &[PopulationRecord],
    selector: AgeGroupSelector,
) -> EngineResult<DensityResult> {
    if records.is_empty() {
        return Err(EngineError::EmptyInput);
    }

    let values = records
        .iter()
        .map(|r| record_density(r, selector))
        .collect::<EngineResult<Vec<_>>>()?;

    let excluded = values.iter().filter(|v| v.is_none()).count();
    let mean = mean_defined(&values);

    Ok(DensityResult {
        values,
        mean,
        excluded,
    })
}

/// Compute per-record band fractions and their column-wise mean.
///
/// `bands` fixes the output order; pass [`AgeBand::ALL`] for the full
/// distribution.
pub fn compute_fractions(
    records: &[PopulationRecord],
    bands: &[AgeBand],
) -> EngineResult<FractionResult> {
    if records.is_empty() {
        return Err(EngineError::EmptyInput);
    }

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let counts = bands
            .iter()
            .map(|b| require_band(record, *b))
            .collect::<EngineResult<Vec<_>>>()?;

        if record.total == 0.0 {
            rows.push(None);
        } else {
            rows.push(Some(counts.iter().map(|c| c / record.total).collect()));
        }
    }

    let defined: Vec<&Vec<f64>> = rows.iter().flatten().collect();
    let excluded = rows.len() - defined.len();
    let mean = if defined.is_empty() {
        None
    } else {
        let mut sums = vec![0.0; bands.len()];
        for row in &defined {
            for (sum, value) in sums.iter_mut().zip(row.iter()) {
                *sum += value;
            }
        }
        Some(sums.into_iter().map(|s| s / defined.len() as f64).collect())
    };

    Ok(FractionResult {
        bands: bands.to_vec(),
        rows,
        mean,
        excluded,
    })
}

/// Mean density for every prefix of every group, in configured order.
///
/// A prefix with no matching record gets `mean: None` rather than an error.
pub fn group_densities(
    records: &[PopulationRecord],
    groups: &[AreaCodeGroup],
    selector: AgeGroupSelector,
) -> EngineResult<Vec<GroupDensity>> {
    let mut result = Vec::new();

    for group in groups {
        for area in &group.areas {
            let subset = filter_by_prefix(records, &[area.code.as_str()]);
            let mean = match compute_density(&subset, selector) {
                Ok(density) => {
                    if density.excluded > 0 {
                        debug!(
                            "{} zero-population records left out of {}",
                            density.excluded,
                            area.label()
                        );
                    }
                    density.mean
                }
                Err(EngineError::EmptyInput) => {
                    debug!("No records for prefix {} ({})", area.code, group.name);
                    None
                }
                Err(e) => return Err(e),
            };

            result.push(GroupDensity {
                group: group.name.clone(),
                code: area.code.clone(),
                label: area.label(),
                records: subset.len(),
                mean,
            });
        }
    }

    Ok(result)
}

/// Age distribution of the records, optionally restricted to exact codes.
///
/// An empty `codes` slice means no restriction.
pub fn distribution<S: AsRef<str>>(
    records: &[PopulationRecord],
    codes: &[S],
) -> EngineResult<FractionResult> {
    if codes.is_empty() {
        compute_fractions(records, &AgeBand::ALL)
    } else {
        let subset = filter_by_exact_codes(records, codes);
        compute_fractions(&subset, &AgeBand::ALL)
    }
}

/// Report-ready age distribution.
///
/// Returns `Ok(None)` when no record matches `codes` or when the table lacks
/// an age-band column, so the rest of the report can still be produced.
pub fn summarize_distribution(
    records: &[PopulationRecord],
    codes: Vec<String>,
) -> EngineResult<Option<Distribution>> {
    match distribution(records, &codes) {
        Ok(fractions) => Ok(Some(Distribution {
            records: fractions.rows.len(),
            excluded: fractions.excluded,
            shares: fractions.labelled_mean(),
            codes,
        })),
        Err(EngineError::EmptyInput) => {
            warn!("No records match the selected area codes: {}", codes.join(", "));
            Ok(None)
        }
        Err(EngineError::MissingColumn(column)) => {
            warn!("Age distribution skipped: column {} is missing", column);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// The `n` records with the highest density, highest first.
///
/// Ties are broken by area code; zero-population records are skipped.
pub fn top_by_density(
    records: &[PopulationRecord],
    selector: AgeGroupSelector,
    n: usize,
) -> EngineResult<Vec<RankedArea>> {
    let density = compute_density(records, selector)?;

    let mut ranked: Vec<RankedArea> = records
        .iter()
        .zip(density.values)
        .filter_map(|(record, value)| {
            value.map(|density| RankedArea {
                area_code: record.area_code.clone(),
                total: record.total,
                density,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.density
            .partial_cmp(&a.density)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.area_code.cmp(&b.area_code))
    });
    ranked.truncate(n);

    Ok(ranked)
}

/// Flag records that break the band-sum invariant.
///
/// Only supplied bands are checked; the sum comparison runs only when all
/// seven bands are present. Records are never modified.
pub fn validate_records(records: &[PopulationRecord], tolerance: f64) -> Vec<DataQualityIssue> {
    let mut issues = Vec::new();

    for record in records {
        if record.total == 0.0 {
            issues.push(DataQualityIssue {
                area_code: record.area_code.clone(),
                kind: QualityKind::ZeroTotal,
                detail: "total population is zero".to_string(),
            });
            continue;
        }

        for band in AgeBand::ALL {
            if let Some(count) = record.band(band) {
                if count > record.total + tolerance {
                    issues.push(DataQualityIssue {
                        area_code: record.area_code.clone(),
                        kind: QualityKind::BandExceedsTotal,
                        detail: format!(
                            "{} = {} exceeds total {}",
                            band.column(),
                            count,
                            record.total
                        ),
                    });
                }
            }
        }

        if record.bands.iter().all(Option::is_some) {
            let sum: f64 = record.bands.iter().flatten().sum();
            if (sum - record.total).abs() > tolerance {
                issues.push(DataQualityIssue {
                    area_code: record.area_code.clone(),
                    kind: QualityKind::BandSumMismatch,
                    detail: format!("bands sum to {:.2}, total is {:.2}", sum, record.total),
                });
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AreaPrefix;

    fn elderly_record(code: &str, total: f64, b7589: f64, b90p: f64) -> PopulationRecord {
        PopulationRecord::new(code, total)
            .with_band(AgeBand::Age60To74, 0.0)
            .with_band(AgeBand::Age75To89, b7589)
            .with_band(AgeBand::Age90Plus, b90p)
    }

    /// A record whose seven bands add up to the total exactly.
    fn full_record(code: &str, counts: [f64; 7]) -> PopulationRecord {
        let total = counts.iter().sum();
        let mut record = PopulationRecord::new(code, total);
        for (band, count) in AgeBand::ALL.into_iter().zip(counts) {
            record = record.with_band(band, count);
        }
        record
    }

    fn sample_table() -> Vec<PopulationRecord> {
        vec![
            full_record("14118", [120.0, 90.0, 100.0, 110.0, 80.0, 40.0, 6.0]),
            full_record("14047", [30.0, 20.0, 25.0, 40.0, 45.0, 20.0, 2.0]),
            full_record("27229", [200.0, 150.0, 180.0, 170.0, 120.0, 60.0, 5.0]),
            full_record("50029", [15.0, 10.0, 12.0, 20.0, 25.0, 12.0, 1.0]),
            full_record("76540", [500.0, 600.0, 450.0, 400.0, 300.0, 120.0, 15.0]),
        ]
    }

    #[test]
    fn test_density_concrete_scenario() {
        let records = vec![
            elderly_record("14100", 100.0, 10.0, 5.0),
            elderly_record("14200", 50.0, 5.0, 0.0),
        ];

        let result = compute_density(&records, AgeGroupSelector::SeventyFivePlus).unwrap();

        assert_eq!(result.values, vec![Some(15.0), Some(10.0)]);
        assert_eq!(result.mean, Some(12.5));
        assert_eq!(result.excluded, 0);
    }

    #[test]
    fn test_density_length_matches_input() {
        let records = sample_table();
        for selector in [
            AgeGroupSelector::SixtyPlus,
            AgeGroupSelector::SeventyFivePlus,
            AgeGroupSelector::NinetyPlus,
        ] {
            let result = compute_density(&records, selector).unwrap();
            assert_eq!(result.values.len(), records.len());
        }
    }

    #[test]
    fn test_density_within_percentage_range() {
        let records = sample_table();
        let result = compute_density(&records, AgeGroupSelector::SixtyPlus).unwrap();

        for value in result.values.iter().flatten() {
            assert!((0.0..=100.0).contains(value), "density out of range: {}", value);
        }
    }

    #[test]
    fn test_density_selectors_nest() {
        let records = sample_table();
        let sixty = compute_density(&records, AgeGroupSelector::SixtyPlus).unwrap();
        let seventy_five = compute_density(&records, AgeGroupSelector::SeventyFivePlus).unwrap();
        let ninety = compute_density(&records, AgeGroupSelector::NinetyPlus).unwrap();

        assert!(sixty.mean.unwrap() >= seventy_five.mean.unwrap());
        assert!(seventy_five.mean.unwrap() >= ninety.mean.unwrap());
    }

    #[test]
    fn test_density_zero_total_excluded_from_mean() {
        let records = vec![
            elderly_record("14100", 100.0, 10.0, 5.0),
            elderly_record("14999", 0.0, 0.0, 0.0),
            elderly_record("14200", 50.0, 5.0, 0.0),
        ];

        let result = compute_density(&records, AgeGroupSelector::SeventyFivePlus).unwrap();

        assert_eq!(result.values, vec![Some(15.0), None, Some(10.0)]);
        assert_eq!(result.mean, Some(12.5));
        assert_eq!(result.excluded, 1);
    }

    #[test]
    fn test_density_all_zero_totals() {
        let records = vec![elderly_record("14999", 0.0, 0.0, 0.0)];

        let result = compute_density(&records, AgeGroupSelector::NinetyPlus).unwrap();

        assert_eq!(result.values, vec![None]);
        assert_eq!(result.mean, None);
        assert_eq!(result.excluded, 1);
    }

    #[test]
    fn test_density_empty_input() {
        let result = compute_density(&[], AgeGroupSelector::SixtyPlus);
        assert_eq!(result, Err(EngineError::EmptyInput));
    }

    #[test]
    fn test_density_missing_column() {
        let records = vec![PopulationRecord::new("14100", 100.0).with_band(AgeBand::Age90Plus, 3.0)];

        // 90+ only needs the column that is present
        assert!(compute_density(&records, AgeGroupSelector::NinetyPlus).is_ok());

        let result = compute_density(&records, AgeGroupSelector::SeventyFivePlus);
        assert_eq!(
            result,
            Err(EngineError::MissingColumn("P20_POP7589".to_string()))
        );
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let result = "100+".parse::<AgeGroupSelector>();
        assert_eq!(result, Err(EngineError::InvalidSelector("100+".to_string())));
    }

    #[test]
    fn test_fractions_sum_to_one() {
        let records = sample_table();
        let result = compute_fractions(&records, &AgeBand::ALL).unwrap();

        let mean = result.mean.unwrap();
        assert_eq!(mean.len(), 7);
        let total: f64 = mean.iter().sum();
        assert!((total - 1.0).abs() < 1e-6, "fractions sum to {}", total);

        for row in result.rows.iter().flatten() {
            let row_total: f64 = row.iter().sum();
            assert!((row_total - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_fractions_follow_band_order() {
        let record = full_record("14118", [10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 30.0]);
        let bands = [AgeBand::Age90Plus, AgeBand::Age0To14];

        let result = compute_fractions(&[record], &bands).unwrap();

        assert_eq!(result.bands, bands.to_vec());
        assert_eq!(result.mean, Some(vec![0.75, 0.25]));
    }

    #[test]
    fn test_fractions_zero_total_excluded() {
        let records = vec![
            full_record("14118", [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0]),
            full_record("14999", [0.0; 7]),
        ];

        let result = compute_fractions(&records, &AgeBand::ALL).unwrap();

        assert_eq!(result.excluded, 1);
        assert!(result.rows[1].is_none());
        assert_eq!(
            result.mean,
            Some(vec![0.25, 0.25, 0.25, 0.25, 0.0, 0.0, 0.0])
        );
    }

    #[test]
    fn test_fractions_missing_column() {
        let records = vec![elderly_record("14100", 100.0, 10.0, 5.0)];

        let result = compute_fractions(&records, &AgeBand::ALL);
        assert_eq!(
            result,
            Err(EngineError::MissingColumn("P20_POP0014".to_string()))
        );
    }

    #[test]
    fn test_fractions_empty_input() {
        assert_eq!(
            compute_fractions(&[], &AgeBand::ALL),
            Err(EngineError::EmptyInput)
        );
    }

    #[test]
    fn test_filter_by_prefix() {
        let records = sample_table();

        let calvados = filter_by_prefix(&records, &["14"]);
        assert_eq!(calvados.len(), 2);
        assert!(calvados.iter().all(|r| r.area_code.starts_with("14")));
        // Original order is preserved
        assert_eq!(calvados[0].area_code, "14118");
        assert_eq!(calvados[1].area_code, "14047");

        let two = filter_by_prefix(&records, &["27", "76"]);
        assert_eq!(two.len(), 2);

        let none: Vec<PopulationRecord> = filter_by_prefix::<&str>(&records, &[]);
        assert!(none.is_empty());

        assert!(filter_by_prefix(&records, &["99"]).is_empty());
    }

    #[test]
    fn test_filter_by_prefix_is_case_sensitive() {
        let records = vec![
            PopulationRecord::new("2A004", 10.0),
            PopulationRecord::new("2B033", 10.0),
        ];

        assert_eq!(filter_by_prefix(&records, &["2A"]).len(), 1);
        assert!(filter_by_prefix(&records, &["2a"]).is_empty());
    }

    #[test]
    fn test_filter_by_exact_codes() {
        let records = sample_table();

        let one = filter_by_exact_codes(&records, &["50029"]);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0], records[3]);

        assert!(filter_by_exact_codes(&records, &["50030"]).is_empty());
        // Prefixes do not match exactly
        assert!(filter_by_exact_codes(&records, &["500"]).is_empty());
    }

    #[test]
    fn test_group_densities() {
        let records = vec![
            elderly_record("14118", 100.0, 10.0, 5.0),
            elderly_record("14147", 50.0, 5.0, 0.0),
            elderly_record("14200", 100.0, 20.0, 0.0),
        ];
        let groups = vec![AreaCodeGroup {
            name: "Calvados".to_string(),
            areas: vec![
                AreaPrefix::new("141", "Bayeux"),
                AreaPrefix::new("142", "Caen"),
                AreaPrefix::new("143", "Lisieux"),
            ],
        }];

        let densities =
            group_densities(&records, &groups, AgeGroupSelector::SeventyFivePlus).unwrap();

        assert_eq!(densities.len(), 3);
        assert_eq!(densities[0].label, "Bayeux (141)");
        assert_eq!(densities[0].records, 2);
        assert_eq!(densities[0].mean, Some(12.5));
        assert_eq!(densities[1].mean, Some(20.0));
        assert_eq!(densities[2].records, 0);
        assert_eq!(densities[2].mean, None);
    }

    #[test]
    fn test_group_densities_propagates_missing_column() {
        let records = vec![PopulationRecord::new("14118", 100.0)];
        let groups = vec![AreaCodeGroup {
            name: "Calvados".to_string(),
            areas: vec![AreaPrefix::new("141", "Bayeux")],
        }];

        let result = group_densities(&records, &groups, AgeGroupSelector::NinetyPlus);
        assert!(matches!(result, Err(EngineError::MissingColumn(_))));
    }

    #[test]
    fn test_distribution_with_codes() {
        let records = sample_table();

        let all = distribution::<&str>(&records, &[]).unwrap();
        assert_eq!(all.rows.len(), 5);

        let one = distribution(&records, &["50029"]).unwrap();
        assert_eq!(one.rows.len(), 1);

        let none = distribution(&records, &["00000"]);
        assert_eq!(none, Err(EngineError::EmptyInput));
    }

    #[test]
    fn test_summarize_distribution() {
        let records = sample_table();

        let all = summarize_distribution(&records, Vec::new()).unwrap().unwrap();
        assert_eq!(all.records, 5);
        assert_eq!(all.excluded, 0);
        assert_eq!(all.shares.len(), 7);
        assert!(all.codes.is_empty());

        let unmatched = summarize_distribution(&records, vec!["00000".to_string()]).unwrap();
        assert!(unmatched.is_none());
    }

    #[test]
    fn test_summarize_distribution_without_young_bands() {
        // Only the elderly bands are present: densities work, the distribution does not
        let records = vec![
            elderly_record("14100", 100.0, 10.0, 5.0),
            elderly_record("14200", 50.0, 5.0, 0.0),
        ];

        assert!(compute_density(&records, AgeGroupSelector::SeventyFivePlus).is_ok());
        assert!(matches!(
            distribution::<&str>(&records, &[]),
            Err(EngineError::MissingColumn(_))
        ));
        assert_eq!(summarize_distribution(&records, Vec::new()), Ok(None));
    }

    #[test]
    fn test_top_by_density() {
        let records = vec![
            elderly_record("14100", 100.0, 10.0, 5.0),
            elderly_record("14200", 50.0, 5.0, 0.0),
            elderly_record("14300", 10.0, 3.0, 0.0),
            elderly_record("14400", 0.0, 0.0, 0.0),
            elderly_record("14050", 20.0, 2.0, 0.0),
        ];

        let top = top_by_density(&records, AgeGroupSelector::SeventyFivePlus, 3).unwrap();

        assert_eq!(top.len(), 3);
        assert_eq!(top[0].area_code, "14300");
        assert_eq!(top[1].area_code, "14100");
        // 14050 and 14200 tie at 10%; code order wins
        assert_eq!(top[2].area_code, "14050");
    }

    #[test]
    fn test_validate_records() {
        let mut mismatched = full_record("14118", [10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0]);
        mismatched.total = 100.0;
        let records = vec![
            full_record("14047", [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]),
            mismatched,
            PopulationRecord::new("14999", 0.0),
            PopulationRecord::new("14555", 10.0).with_band(AgeBand::Age90Plus, 12.0),
        ];

        let issues = validate_records(&records, 0.5);

        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].area_code, "14118");
        assert_eq!(issues[0].kind, QualityKind::BandSumMismatch);
        assert_eq!(issues[1].kind, QualityKind::ZeroTotal);
        assert_eq!(issues[2].kind, QualityKind::BandExceedsTotal);
        assert!(issues[2].detail.contains("P20_POP90P"));
    }

    #[test]
    fn test_validate_records_within_tolerance() {
        let mut record = full_record("14047", [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        record.total += 0.3;

        assert!(validate_records(&[record.clone()], 0.5).is_empty());
        assert_eq!(validate_records(&[record], 0.1).len(), 1);
    }
}
