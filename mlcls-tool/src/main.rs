use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use mlcls::dataset::{label_histogram, DatasetRegistry, DatasetSummary};
use mlcls_config::{Config, Split};
use prettytable::{cell, row, Table};
use std::{
    env,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Parser)]
/// Inspect multi-label classification configs and datasets
enum Opts {
    /// Print the configuration with includes resolved
    Config {
        /// configuration file
        config_file: PathBuf,
    },
    /// Load a dataset split and print its summary
    Dataset {
        /// configuration file
        config_file: PathBuf,
        /// one of train, val and test
        #[clap(long, default_value = "train")]
        split: Split,
        /// print per-class label counts
        #[clap(long)]
        stats: bool,
    },
}

fn main() -> Result<()> {
    // setup logger
    {
        let mut builder = pretty_env_logger::formatted_builder();
        match env::var("RUST_LOG") {
            Ok(filters) => builder.parse_filters(&filters),
            Err(_) => builder.filter_level(LevelFilter::Info),
        };
        builder.init();
    }

    // the dataset types are registered once here
    let registry = DatasetRegistry::with_builtins();

    match Opts::parse() {
        Opts::Config { config_file } => {
            print_config(config_file)?;
        }
        Opts::Dataset {
            config_file,
            split,
            stats,
        } => {
            print_dataset(&registry, config_file, split, stats)?;
        }
    }

    Ok(())
}

fn load_config(config_file: &Path) -> Result<Config> {
    Config::load(config_file)
        .with_context(|| format!("failed to load config file '{}'", config_file.display()))
}

fn print_config(config_file: PathBuf) -> Result<()> {
    let config = load_config(&config_file)?;
    println!("{}", config.to_json_pretty()?);
    Ok(())
}

fn print_dataset(
    registry: &DatasetRegistry,
    config_file: PathBuf,
    split: Split,
    stats: bool,
) -> Result<()> {
    let config = load_config(&config_file)?;
    info!("loading the {} split", split);
    let dataset = registry.build(config.data.split(split))?;

    print!("{}", DatasetSummary(dataset.as_ref()));

    if stats {
        let mut table = Table::new();
        table.add_row(row!["label", "class", "images", "crowd"]);

        label_histogram(dataset.as_ref())
            .into_iter()
            .enumerate()
            .for_each(|(label, stat)| {
                table.add_row(row![label, stat.class, stat.num_images, stat.num_crowd]);
            });

        table.printstd();
    }

    Ok(())
}
