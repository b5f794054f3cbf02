use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "printbox")]
#[command(about = "Print map views through a MapFish-style print service", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $PRINTBOX_CONFIG or config/printbox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the print spec for a map view to stdout without submitting it
    Encode(JobArgs),
    /// Print a map view and wait for the download URL (Ctrl+C cancels)
    Print(JobArgs),
    /// Show the status of a submitted report
    Status(RefArgs),
    /// Ask the print service to cancel a report
    Cancel(RefArgs),
}

#[derive(clap::Args, Debug)]
pub struct JobArgs {
    /// JSON file describing the map view
    #[arg(long)]
    pub view: PathBuf,

    /// Scale denominator of the print (defaults to print.scale)
    #[arg(long)]
    pub scale: Option<f64>,

    /// Print resolution (defaults to print.dpi)
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Server-side layout (defaults to service.layout)
    #[arg(long)]
    pub layout: Option<String>,

    /// Output format (defaults to service.format)
    #[arg(long)]
    pub format: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RefArgs {
    /// Report reference returned on submission
    #[arg(long = "ref")]
    pub reference: String,
}
