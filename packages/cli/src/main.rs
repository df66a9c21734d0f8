#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the Madzi Alipo harvester.
//!
//! Settings come from built-in defaults, then an optional TOML file
//! (`--config`), then individual flags. Running without a subcommand is the
//! same as `harvest`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use madzi_api::{HttpApiClient, MadziApi as _};
use madzi_harvest::pipeline::{HarvestReport, PartitionSource, rebuild_summary};
use madzi_harvest::store::{PartitionStore, load_path};
use madzi_harvest::{HarvestConfig, Harvester};
use madzi_table::TableFormat;

#[derive(Parser)]
#[command(name = "madzi_cli", about = "Madzi Alipo visit record harvester")]
struct Cli {
    #[command(flatten)]
    settings: Settings,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Default)]
struct Settings {
    /// TOML file with harvest settings; flags below override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the partition cache and the summary table
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// First year to harvest
    #[arg(long, global = true)]
    from_year: Option<i32>,
    /// Last year to harvest (inclusive)
    #[arg(long, global = true)]
    to_year: Option<i32>,
    /// Partitions processed at once
    #[arg(long, global = true)]
    partition_concurrency: Option<usize>,
    /// Records enriched at once within a partition
    #[arg(long, global = true)]
    record_concurrency: Option<usize>,
    /// Summary table encoding (`legacy` or `escaped`)
    #[arg(long, global = true)]
    format: Option<TableFormat>,
}

impl Settings {
    fn resolve(self) -> Result<HarvestConfig, madzi_harvest::HarvestError> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::load(path)?,
            None => HarvestConfig::default(),
        };

        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(year) = self.from_year {
            config.first_year = year;
        }
        if let Some(year) = self.to_year {
            config.last_year = year;
        }
        if let Some(n) = self.partition_concurrency {
            config.partition_concurrency = n;
        }
        if let Some(n) = self.record_concurrency {
            config.record_concurrency = n;
        }
        if let Some(format) = self.format {
            config.table_format = format;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every uncached partition, then write the summary table
    Harvest,
    /// Rewrite the summary table from cached partitions only (no network)
    RebuildTable,
    /// List cached partitions per year with their record counts
    Cached,
    /// List the agencies visible to the configured token
    Agencies,
}

/// Builds an API client, failing before any request if the token is unset.
fn connect(config: &HarvestConfig) -> Result<HttpApiClient, Box<dyn std::error::Error>> {
    let credentials = config.credentials();
    credentials.token()?;
    Ok(HttpApiClient::new(&config.client_config(), credentials)?)
}

fn print_report(report: &HarvestReport) {
    println!(
        "{} partitions ({} cached, {} fetched), {} failed",
        report.partitions.len() + report.failed_partitions.len(),
        report.count_from(PartitionSource::Cache),
        report.count_from(PartitionSource::Fetched),
        report.failed_partitions.len(),
    );

    for failure in &report.failed_partitions {
        println!("  failed: {}: {}", failure.key, failure.error);
    }
    for partition in report.partitions.iter().filter(|p| !p.failed_records.is_empty()) {
        println!(
            "  partial: {}: {} records missing",
            partition.key,
            partition.failed_records.len()
        );
    }
    for partition in &report.partitions {
        if let Some(error) = &partition.cache_error {
            println!("  not cached: {}: {error}", partition.key);
        }
    }

    println!(
        "{} records written to {}",
        report.record_count,
        report.summary_path.display()
    );
}

fn print_cached(config: &HarvestConfig) -> Result<(), Box<dyn std::error::Error>> {
    let partitions = PartitionStore::new(&config.data_dir).cached_partitions()?;
    if partitions.is_empty() {
        println!("No cached partitions under {}", config.data_dir.display());
        return Ok(());
    }

    println!("{:<6} {:<48} RECORDS", "YEAR", "PARTITION");
    println!("{}", "-".repeat(64));

    let mut per_year: BTreeMap<i32, (usize, usize)> = BTreeMap::new();
    for partition in &partitions {
        let count = load_path(&partition.path)?.len();
        let name = partition
            .path
            .file_stem()
            .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
        println!("{:<6} {name:<48} {count}", partition.year);

        let totals = per_year.entry(partition.year).or_default();
        totals.0 += 1;
        totals.1 += count;
    }

    println!();
    for (year, (files, records)) in per_year {
        println!("{year}: {files} partitions, {records} records");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = madzi_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = cli.settings.resolve()?;

    match cli.command.unwrap_or(Commands::Harvest) {
        Commands::Harvest => {
            let client = connect(&config)?;
            log::info!(
                "Harvesting {}..={} into {}",
                config.first_year,
                config.last_year,
                config.data_dir.display()
            );
            let progress = madzi_cli_utils::harvest_progress(&multi);
            let harvester = Harvester::new(Arc::new(client), config);

            let report = harvester.run(&progress).await?;
            print_report(&report);
        }
        Commands::RebuildTable => {
            let rebuilt = rebuild_summary(&config)?;
            println!(
                "{} records from {} partitions written to {}",
                rebuilt.record_count,
                rebuilt.partition_count,
                rebuilt.summary_path.display()
            );
        }
        Commands::Cached => print_cached(&config)?,
        Commands::Agencies => {
            let client = connect(&config)?;
            let agencies = client.list_agencies().await?;

            println!("{:<8} NAME", "ID");
            println!("{}", "-".repeat(50));
            for agency in &agencies {
                println!("{:<8} {}", agency.id, agency.name);
            }
        }
    }

    Ok(())
}
