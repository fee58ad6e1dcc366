use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::paths;

#[derive(Parser)]
#[command(name = "keysync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative SSH authorized_keys management", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Keys file (default: ~/.config/keysync/keys.toml)
    #[arg(short, long, global = true, env = paths::ENV_CONFIG)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show which configured keys are in sync
    Status(StatusArgs),

    /// Preview what apply would change
    Diff(TargetArgs),

    /// Make every target file match the config
    Apply(ApplyArgs),

    /// Print the entries of an authorized_keys file
    List {
        /// File to read
        file: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct TargetArgs {
    /// Only keys whose name contains this (or `key:NAME` for an exact match)
    pub target: Option<String>,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Only keys whose name contains this (or `key:NAME` for an exact match)
    pub target: Option<String>,

    /// Print drift as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Only keys whose name contains this (or `key:NAME` for an exact match)
    pub target: Option<String>,

    /// Show what would change without writing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply_flags() {
        let cli = Cli::parse_from(["keysync", "-vv", "apply", "alice", "--dry-run", "-y"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.target.as_deref(), Some("alice"));
                assert!(args.dry_run);
                assert!(args.yes);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_parse_status_json_with_config() {
        let cli = Cli::parse_from(["keysync", "status", "--json", "-c", "/etc/keysync/keys.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/keysync/keys.toml")));
        assert!(matches!(
            cli.command,
            Command::Status(StatusArgs { json: true, .. })
        ));
    }
}
