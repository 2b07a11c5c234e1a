pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sealbin")]
#[command(about = "Encrypted, content-addressed object storage")]
pub struct Args {
    /// Path to the storage config file
    #[arg(long, global = true, default_value = "sealbin.toml")]
    pub config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: crate::Command,
}
