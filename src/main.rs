//! Agedensity - elderly-population density reports from census tables
//!
//! A CLI tool that loads an INSEE census table, aggregates the density of
//! elderly residents per arrondissement and the age distribution of
//! selected communes, and writes a Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (missing file, invalid selector, missing column, etc.)

mod analysis;
mod cli;
mod config;
mod error;
mod loader;
mod models;
mod report;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::Config;
use error::EngineError;
use models::{AgeGroupSelector, QualitySummary, Report, ReportMetadata};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so the file can set the level
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("Agedensity v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    if let Err(e) = run(args, config) {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .agedensity.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!("⚠️  .agedensity.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .agedensity.toml")?;

    println!("✅ Created .agedensity.toml with default settings.");
    println!("   Edit it to customize the dataset, regions and report.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load the table, aggregate it and write the report.
fn run(args: Args, config: Config) -> Result<()> {
    let start_time = Instant::now();

    let selector: AgeGroupSelector = config.report.selector.parse()?;

    // Step 1: Load the table
    let mut loader_config = loader::LoadConfig::try_from(&config.data)?;
    loader_config.show_progress = !args.quiet;
    let table_loader = loader::TableLoader::new(loader_config);

    let data_path = Path::new(&config.data.path);
    println!("📥 Loading census table: {}", data_path.display());
    let table = table_loader.load(data_path)?;

    if table.records.is_empty() {
        return Err(EngineError::EmptyInput)
            .with_context(|| format!("No records in region in {}", data_path.display()));
    }

    // Step 2: Validate the band-sum invariant
    let issues = analysis::validate_records(&table.records, config.data.quality_tolerance);
    if !issues.is_empty() {
        warn!("{} records fail data-quality checks", issues.len());
    }

    if args.dry_run {
        return handle_dry_run(&table, issues.len());
    }

    // Step 3: Aggregate
    println!("🔬 Aggregating densities for ages {}...", selector);
    let densities = analysis::group_densities(&table.records, &config.regions, selector)?;
    for density in &densities {
        debug!(
            "{} {}: {} records, mean {:?}",
            density.group, density.label, density.records, density.mean
        );
    }

    let codes = args.selected_codes();
    let distribution = analysis::summarize_distribution(&table.records, codes)?;

    let top_areas =
        analysis::top_by_density(&table.records, selector, config.report.top_communes)?;

    // Step 4: Build the report
    let quality = if config.report.include_quality {
        QualitySummary::from_issues(&issues, config.report.max_quality_samples)
    } else {
        QualitySummary::default()
    };

    let metadata = ReportMetadata {
        dataset: config.data.path.clone(),
        analysis_date: Utc::now(),
        selector,
        records_loaded: table.records.len(),
        records_skipped: table.summary.rows_skipped,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let report = Report {
        metadata,
        densities,
        distribution,
        top_areas,
        quality,
    };

    // Step 5: Generate and save the report
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = Path::new(&config.general.output);
    std::fs::write(output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    // Print summary
    println!("\n📊 Summary:");
    println!("   Records: {}", report.metadata.records_loaded);
    println!("   Arrondissements: {}", report.densities.len());
    if let Some(top) = report.top_areas.first() {
        println!(
            "   Highest density: {} ({:.2}%)",
            top.area_code, top.density
        );
    }
    println!("   Data-quality findings: {}", issues.len());
    println!(
        "\n✅ Report saved to: {}",
        output_path.display()
    );

    Ok(())
}

/// Handle --dry-run: print load and validation counts, exit.
fn handle_dry_run(table: &loader::LoadedTable, quality_issues: usize) -> Result<()> {
    let summary = &table.summary;

    println!("\n🔍 Dry run: table loaded, no report written.\n");
    println!("   Rows read: {}", summary.rows_read);
    println!("   Outside region: {}", summary.rows_out_of_region);
    println!("   Skipped (invalid counts): {}", summary.rows_skipped);
    println!("   Records kept: {}", table.records.len());
    println!(
        "   Band columns: {}",
        summary
            .bands_present
            .iter()
            .map(|b| b.column())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("   Data-quality findings: {}", quality_issues);

    println!("\n✅ Dry run complete.");
    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is initialized, so problems go to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}", config::CONFIG_FILE_NAME, e);
            Ok(Config::default())
        }
    }
}
