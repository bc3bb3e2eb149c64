use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tilefetch::humanize::ByteSize;

#[derive(Parser, Debug)]
#[command(name = "tilefetch")]
#[command(about = "Fetch geoportal tiles through the portal's asynchronous job API", long_about = None)]
pub struct Cli {
    /// Configuration file (default: config/tilefetch.toml or $TILEFETCH_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging; `fetch` also unpacks and prints each tile's payload
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a range of tiles of one product
    Fetch(FetchArgs),
    /// Re-run the failed tiles of a previous batch report
    Retry(RetryArgs),
    /// Check the archives listed in a batch report
    Verify(VerifyArgs),
    /// List the available products
    Products,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct FetchArgs {
    /// Product name (dgm1, alkis, bdom)
    pub product: String,

    /// First tile id
    pub start: u64,

    /// Last tile id (exclusive unless --inclusive)
    pub end: u64,

    /// Unpack every archive into a directory named after its job
    #[arg(long)]
    pub unpack: bool,

    /// Include `end` in the range
    #[arg(long)]
    pub inclusive: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(clap::Args, Debug)]
pub struct RetryArgs {
    /// Report written by an earlier run
    pub report: PathBuf,

    /// Unpack every archive into a directory named after its job
    #[arg(long)]
    pub unpack: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Overrides shared by commands that run a batch
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Tiles processed at the same time
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Staging directory for archives and reports
    #[arg(long)]
    pub root: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Report written by an earlier run
    pub report: PathBuf,

    /// Smallest acceptable archive, e.g. 10KB
    #[arg(long)]
    pub min_size: Option<ByteSize>,
}
