use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

/// Skadi elevation CLI tool
#[derive(Parser)]
#[command(name = "skadi")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    tiers: TierArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the tier configuration read from `SKADI_*` variables.
#[derive(Args, Clone, Debug, Default)]
pub struct TierArgs {
    /// Origin archive base URL
    #[arg(long, env = "SKADI_ORIGIN_URL", global = true)]
    pub origin_url: Option<String>,

    /// Directory used as a local durable tier
    #[arg(short, long, env = "SKADI_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Tiles resolved concurrently
    #[arg(short, long, env = "SKADI_CONCURRENCY", global = true)]
    pub concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Query elevation for a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add an elevation column to a CSV file of coordinates
    Batch {
        /// Input CSV file
        input: PathBuf,

        /// Output file (defaults to <input>_elevation.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude
        #[arg(long, default_value = "lon")]
        lon_col: String,
    },

    /// Print the tile key and origin URL for a coordinate
    Key {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skadi=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query { lat, lon, json } => commands::query::run(&cli.tiers, lat, lon, json),
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
        } => commands::batch::run(&cli.tiers, input, output, lat_col, lon_col),
        Commands::Key { lat, lon } => commands::key::run(&cli.tiers, lat, lon),
    }
}
