use std::env;
use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::info;

use extract_street_index::source::find_default_extract;
use extract_street_index::store::{CsvStore, SqliteStore};
use extract_street_index::{
    run, ExtractConfig, ResolverStrategy, RunSummary, SamplingConfig, SourceFormat,
};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg {
    Auto,
    Xml,
    Pbf,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StoreArg {
    Sqlite,
    Csv,
}

/// Build the place and street search index from an OSM extract.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Path to a .osm or .pbf file. Defaults to the only extract in the current folder.
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "auto")]
    format: FormatArg,

    #[arg(long, value_enum, default_value = "sqlite")]
    store: StoreArg,

    /// SQLite database file, or output directory for --store csv.
    #[arg(long, default_value = "streets.sqlite")]
    output: PathBuf,

    /// Records per write batch.
    #[arg(long, default_value_t = 100)]
    batch_size: usize,

    /// Resolve node coordinates from this SQLite node index instead of a second pass.
    #[arg(long)]
    node_index: Option<PathBuf>,

    /// Rebuild the node index from the input before extracting.
    #[arg(long, requires = "node_index")]
    refresh_node_index: bool,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Resolve every node of large features instead of a random sample.
    #[arg(long)]
    no_sampling: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn into_config(self) -> Result<(ExtractConfig, StoreArg, PathBuf), Box<dyn Error>> {
        let input = match self.input {
            Some(path) => path,
            None => find_default_extract(&env::current_dir()?)?,
        };
        let mut config = ExtractConfig::new(&input)
            .with_batch_size(self.batch_size)
            .with_sampling(SamplingConfig {
                enabled: !self.no_sampling,
                seed: self.seed,
            });
        match self.format {
            FormatArg::Auto => {}
            FormatArg::Xml => config = config.with_format(SourceFormat::Xml),
            FormatArg::Pbf => config = config.with_format(SourceFormat::Pbf),
        }
        if let Some(path) = self.node_index {
            config = config.with_resolver(ResolverStrategy::NodeIndex {
                path,
                refresh: self.refresh_node_index,
            });
        }
        Ok((config, self.store, self.output))
    }
}

fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .init();

    if let Err(err) = run_cli(args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run_cli(args: Args) -> Result<(), Box<dyn Error>> {
    let (config, store, output) = args.into_config()?;
    let summary = match store {
        StoreArg::Sqlite => run(&config, &mut SqliteStore::open(&output)?)?,
        StoreArg::Csv => run(&config, &mut CsvStore::create(&output)?)?,
    };
    report(&summary);
    Ok(())
}

fn report(summary: &RunSummary) {
    info!(
        "found {} places, {} streets and {} timbuks",
        summary.places_found, summary.streets_found, summary.timbuks_found
    );
    info!(
        "saved {} places and {} streets, dropped {} unresolvable",
        summary.places_written, summary.streets_written, summary.dropped
    );
    for (percentage, count) in &summary.sampling.by_percentage {
        info!("  sampled {count} aggregates at {percentage}%");
    }
}
