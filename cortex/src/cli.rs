use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cortex", version, about = "Cortex scheduling and rebalancing daemon CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Cortex daemon with a config file
    Start {
        #[arg(short, long)]
        config: PathBuf,
    },
}
