//! CLI argument parsing with clap.

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// Default log destination
pub const DEFAULT_LOG_PATH: &str = "/var/log/apiban-nft-client.log";

#[derive(Parser, Debug)]
#[command(name = "apiban-nft-client")]
#[command(author, version, about = "Synchronize the APIBAN banned-IP feed into an nftables set")]
pub struct Cli {
    /// Config file path, searched before the standard locations
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log file path, or "-" / "stdout" for standard output
    #[arg(long, default_value = DEFAULT_LOG_PATH)]
    pub log: String,

    /// Verify the feed's TLS certificate
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub verify: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long)]
    pub verbose: bool,

    /// FULL restarts the feed from the beginning
    #[arg(value_enum)]
    pub mode: Option<RunMode>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    #[value(name = "FULL")]
    Full,
}

impl Cli {
    pub fn full(&self) -> bool {
        self.mode == Some(RunMode::Full)
    }

    /// Where log output goes: `None` for stdout.
    pub fn log_file(&self) -> Option<PathBuf> {
        match self.log.as_str() {
            "-" | "stdout" => None,
            path => Some(PathBuf::from(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses_help() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["apiban-nft-client"]).unwrap();
        assert!(cli.config.is_none());
        assert_eq!(cli.log, DEFAULT_LOG_PATH);
        assert_eq!(cli.log_file(), Some(PathBuf::from(DEFAULT_LOG_PATH)));
        assert!(cli.verify);
        assert!(!cli.full());
        assert!(!cli.quiet);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_full() {
        let cli = Cli::try_parse_from(["apiban-nft-client", "FULL"]).unwrap();
        assert!(cli.full());
    }

    #[test]
    fn test_cli_rejects_other_positionals() {
        assert!(Cli::try_parse_from(["apiban-nft-client", "full"]).is_err());
        assert!(Cli::try_parse_from(["apiban-nft-client", "PARTIAL"]).is_err());
        assert!(Cli::try_parse_from(["apiban-nft-client", "FULL", "FULL"]).is_err());
    }

    #[test]
    fn test_cli_verify_false() {
        let cli = Cli::try_parse_from(["apiban-nft-client", "--verify", "false"]).unwrap();
        assert!(!cli.verify);
        let cli = Cli::try_parse_from(["apiban-nft-client", "--verify=true"]).unwrap();
        assert!(cli.verify);
        assert!(Cli::try_parse_from(["apiban-nft-client", "--verify", "maybe"]).is_err());
    }

    #[test]
    fn test_cli_log_stdout() {
        for target in ["-", "stdout"] {
            let cli = Cli::try_parse_from(["apiban-nft-client", "--log", target]).unwrap();
            assert_eq!(cli.log_file(), None);
        }
    }

    #[test]
    fn test_cli_all_options() {
        let cli = Cli::try_parse_from([
            "apiban-nft-client",
            "--config",
            "/tmp/apiban.json",
            "--log",
            "/tmp/apiban.log",
            "-v",
            "FULL",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/apiban.json")));
        assert_eq!(cli.log_file(), Some(PathBuf::from("/tmp/apiban.log")));
        assert!(cli.verbose);
        assert!(cli.full());
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["apiban-nft-client", "-q", "-v"]).is_err());
    }
}
