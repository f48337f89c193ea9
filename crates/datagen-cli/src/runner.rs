use std::path::PathBuf;

use chrono::Local;
use clap::Parser;
use datagen::pipeline::run;
use datagen::verify::render_reports;
use datagen_common::config::AppConfig;
use datagen_telemetry::telemetry::{init_logging, shutdown_logging};
use figment::providers::Serialized;
use figment::Figment;
use log::{error, info};
use serde::Serialize;

/// Generates skewed product and transaction datasets in sorted and unsorted
/// layouts for join strategy benchmarks, then verifies the output.
///
/// Every option overrides the configuration value of the same name, which can
/// also be set via `DATAGEN__<SECTION>__<KEY>` environment variables.
#[derive(Parser, Debug, Default)]
#[command(version, name = "datagen")]
struct Cli {
    #[arg(long, help = "The number of product rows")]
    dimension_rows: Option<u64>,
    #[arg(long, help = "The number of transaction rows")]
    fact_rows: Option<u64>,
    #[arg(long, help = "Customer IDs are drawn from [0, OWNER_RANGE)")]
    owner_range: Option<u32>,
    #[arg(long, help = "The probability of referencing a popular product")]
    hot_fraction: Option<f64>,
    #[arg(long, help = "The maximum number of popular products")]
    hot_set_cap: Option<usize>,
    #[arg(long, help = "The random seed (0 means unseeded)")]
    seed: Option<u64>,
    #[arg(long, help = "The number of partitions of the unsorted datasets")]
    unsorted_partitions: Option<usize>,
    #[arg(long, help = "The number of partitions of the sorted datasets")]
    sorted_partitions: Option<usize>,
    #[arg(long, help = "The output directory, which is replaced on every run")]
    output: Option<PathBuf>,
}

#[derive(Serialize, Default)]
struct GenerationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fact_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_range: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hot_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hot_set_cap: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Serialize, Default)]
struct LayoutOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    unsorted_partitions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sorted_partitions: Option<usize>,
}

#[derive(Serialize, Default)]
struct OutputOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    root: Option<PathBuf>,
}

#[derive(Serialize, Default)]
struct ConfigOverrides {
    generation: GenerationOverrides,
    layout: LayoutOverrides,
    output: OutputOverrides,
}

impl From<Cli> for ConfigOverrides {
    fn from(cli: Cli) -> Self {
        Self {
            generation: GenerationOverrides {
                dimension_rows: cli.dimension_rows,
                fact_rows: cli.fact_rows,
                owner_range: cli.owner_range,
                hot_fraction: cli.hot_fraction,
                hot_set_cap: cli.hot_set_cap,
                seed: cli.seed,
            },
            layout: LayoutOverrides {
                unsorted_partitions: cli.unsorted_partitions,
                sorted_partitions: cli.sorted_partitions,
            },
            output: OutputOverrides { root: cli.output },
        }
    }
}

fn load_config(cli: Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let figment: Figment =
        AppConfig::figment().merge(Serialized::defaults(ConfigOverrides::from(cli)));
    Ok(AppConfig::extract(figment)?)
}

pub fn main(args: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_from(args);
    init_logging()?;

    let config = load_config(cli)?;
    info!("Generating data for the sort-merge join benchmark...");
    let result = run(config, Local::now());
    let summary = match result {
        Ok(x) => x,
        Err(e) => {
            error!("{e}");
            shutdown_logging();
            return Err(e.into());
        }
    };

    println!("{}", render_reports(&summary.reports));
    shutdown_logging();
    if summary.all_passed() {
        Ok(())
    } else {
        Err("dataset verification failed".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() -> Result<(), Box<dyn std::error::Error>> {
        let cli = Cli::try_parse_from([
            "datagen",
            "--fact-rows",
            "1000",
            "--sorted-partitions",
            "4",
            "--output",
            "/tmp/bench",
        ])?;
        let config = load_config(cli)?;
        assert_eq!(config.generation.fact_rows, 1000);
        assert_eq!(config.generation.dimension_rows, 1_000_000);
        assert_eq!(config.layout.sorted_partitions, 4);
        assert_eq!(config.layout.unsorted_partitions, 200);
        assert_eq!(config.output.root, PathBuf::from("/tmp/bench"));
        Ok(())
    }

    #[test]
    fn test_cli_rejects_invalid_override() -> Result<(), Box<dyn std::error::Error>> {
        let cli = Cli::try_parse_from(["datagen", "--unsorted-partitions", "0"])?;
        assert!(load_config(cli).is_err());
        Ok(())
    }
}
