//! # CLI Interface
//!
//! Command-line structure for `shroud-node`, via `clap` derive. Four
//! subcommands: `init`, `serve`, `simulate` and `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use shroud_protocol::AuthorityConfig;

use crate::logging::LogFormat;

/// SHROUD Authority node.
///
/// Issues pseudonyms, accepts signed anonymous submissions, and publishes
/// grades over HTTP. Grading and de-anonymisation live on a separate admin
/// listener bound to loopback.
#[derive(Parser, Debug)]
#[command(
    name = "shroud-node",
    about = "SHROUD anonymous submission Authority",
    version,
    propagate_version = true
)]
pub struct ShroudNodeCli {
    /// Log output format.
    #[arg(
        long,
        global = true,
        env = "SHROUD_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormatArg::Pretty
    )]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and generate the Authority key.
    Init(InitArgs),
    /// Serve the principal-facing and admin HTTP surfaces.
    Serve(ServeArgs),
    /// Run the five-student reference exchange in-process and print the tables.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory that will hold `authority.key`.
    #[arg(long, short = 'd', env = "SHROUD_DATA_DIR", default_value = ".shroud")]
    pub data_dir: PathBuf,

    /// Replace an existing key file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Directory holding `authority.key`. A key is generated if none exists.
    #[arg(long, short = 'd', env = "SHROUD_DATA_DIR", default_value = ".shroud")]
    pub data_dir: PathBuf,

    /// Port for the principal-facing API.
    #[arg(long, env = "SHROUD_API_PORT", default_value_t = 9841)]
    pub api_port: u16,

    /// Port for the Authority-local admin API. Always bound to 127.0.0.1.
    #[arg(long, env = "SHROUD_ADMIN_PORT", default_value_t = 9842)]
    pub admin_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SHROUD_METRICS_PORT", default_value_t = 9843)]
    pub metrics_port: u16,

    /// Refuse pseudonym requests from real ids that were not registered first.
    #[arg(long, env = "SHROUD_NO_TRUST_ON_FIRST_USE")]
    pub no_trust_on_first_use: bool,

    /// Reject a second submission under the same pseudonym.
    #[arg(long, env = "SHROUD_REJECT_RESUBMISSION")]
    pub reject_resubmission: bool,
}

impl ServeArgs {
    pub fn authority_config(&self) -> AuthorityConfig {
        AuthorityConfig {
            trust_on_first_use: !self.no_trust_on_first_use,
            allow_resubmission: !self.reject_resubmission,
        }
    }
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Also write the plain-text report to this path.
    #[arg(long, short = 'r')]
    pub report: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        ShroudNodeCli::command().debug_assert();
    }

    #[test]
    fn serve_flags_map_onto_authority_config() {
        let cli = ShroudNodeCli::parse_from([
            "shroud-node",
            "serve",
            "--no-trust-on-first-use",
            "--api-port",
            "8000",
        ]);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.api_port, 8000);
        let config = args.authority_config();
        assert!(!config.trust_on_first_use);
        assert!(config.allow_resubmission);
    }

    #[test]
    fn simulate_accepts_report_path() {
        let cli = ShroudNodeCli::parse_from(["shroud-node", "simulate", "--report", "out.txt"]);
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.report, Some(PathBuf::from("out.txt")));
    }
}
