//! # CLI Interface
//!
//! Command-line structure for `harbor-node`, built with `clap` derive.
//! Three subcommands: `run`, `config` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Harbor ledger node.
///
/// Serves the yield optimizer, cross-chain router, compliance gate and
/// mint / redeem ledger over REST, streams ledger events over WebSocket,
/// and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "harbor-node",
    about = "Harbor ledger node",
    version,
    propagate_version = true
)]
pub struct HarborNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print the effective settings after files and environment are applied.
    Config(ConfigArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand. Flags override the settings file.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to a TOML settings file.
    #[arg(long, short = 'c', env = "HARBOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Persist the ledger with sled under this directory.
    ///
    /// Without it the storage backend comes from settings (memory by default).
    #[arg(long, short = 'd', env = "HARBOR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Port for the REST and WebSocket API.
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Port for the standalone Prometheus endpoint.
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Log output format.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

/// Arguments for the `config` subcommand.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Path to a TOML settings file.
    #[arg(long, short = 'c', env = "HARBOR_CONFIG")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        HarborNodeCli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = HarborNodeCli::try_parse_from([
            "harbor-node",
            "run",
            "--data-dir",
            "/tmp/harbor",
            "--port",
            "7001",
            "--log-format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/harbor")));
                assert_eq!(args.port, Some(7001));
                assert_eq!(args.log_format, Some(LogFormat::Json));
                assert!(args.metrics_port.is_none());
            }
            other => panic!("expected run, got {other:?}"),
        }
    }
}
