//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Default configuration file path.
pub const DEFAULT_CONFIG: &str = "mediot-bridge.json5";

/// Command line arguments of the bridge binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "mediot-bridge")]
#[command(about = "Bridge MedIoT device telemetry to live streaming clients")]
#[command(version)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
