mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use commands::aggregate::AggregateArgs;
use commands::cohorts::CohortsArgs;
use commands::derive::DeriveArgs;
use commands::pivot::PivotArgs;
use commands::rank::RankArgs;
use commands::run::RunArgs;

/// Retail profitability and customer-segment analytics
#[derive(Parser)]
#[command(
    name = "rmx",
    version,
    about = "Retail profitability and customer-segment analytics",
    long_about = "A CLI for deriving per-line revenue, cost and profit from order \
                  facts with decimal precision. Supports margin banding, hierarchical \
                  roll-ups, acquisition cohorts, top-N ranking and seasonality pivots."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log pipeline stages at debug level
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive revenue, cost, profit and margin band per order line
    Derive(DeriveArgs),
    /// Aggregate order lines by any combination of dimensions
    Aggregate(AggregateArgs),
    /// Assign customers to acquisition cohorts and total each cohort
    Cohorts(CohortsArgs),
    /// Rank aggregated rows within partitions
    Rank(RankArgs),
    /// Year-by-month seasonality pivot
    Pivot(PivotArgs),
    /// Run the full profitability report from a pipeline config
    Run(RunArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Derive(args) => commands::derive::run_derive(args),
        Commands::Aggregate(args) => commands::aggregate::run_aggregate(args),
        Commands::Cohorts(args) => commands::cohorts::run_cohorts(args),
        Commands::Rank(args) => commands::rank::run_rank(args),
        Commands::Pivot(args) => commands::pivot::run_pivot(args),
        Commands::Run(args) => commands::run::run_pipeline(args),
        Commands::Version => {
            println!("rmx {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
