use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "dicom-catalog")]
#[command(about = "Catalog and browse DICOM directory trees", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build or refresh the catalog for the configured root
    Index {
        /// Report per-phase timing and counts
        #[arg(long)]
        verbose: bool,
    },
    /// Browse the Patient/Study/Series hierarchy of the catalog
    Browse {
        /// Print the full tree instead of the interactive picker
        #[arg(long)]
        tree: bool,
    },
    /// Print configuration values
    PrintConfig,
}
