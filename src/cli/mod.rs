//! CLI argument parsing for bakery-lock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// bakery-lock: run commands under a lock shared through a directory.
///
/// Every process pointing at the same `--dir` takes part in the same locks:
/// - `run` holds a lock for the lifetime of a child command
/// - `list` shows the tickets currently drawn for a lock
/// - `clear` removes a ticket left behind by a crashed process
#[derive(Parser, Debug)]
#[command(name = "bakery-lock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding the shared lock records.
    #[arg(long, global = true, default_value = ".bakery-lock")]
    pub dir: PathBuf,

    /// YAML file with lock settings (timeout_ms, poll_interval_ms).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for bakery-lock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command while holding a lock.
    ///
    /// Waits for every earlier ticket on the lock, runs the command, and
    /// exits with the command's exit code.
    ///
    /// The ticket is not refreshed while the command runs. A command that runs
    /// longer than the timeout can be taken over by another waiter, so raise
    /// --timeout-ms above the longest expected run.
    Run(RunArgs),

    /// List the tickets drawn for a lock.
    ///
    /// Shows owner, process ID, and age, and flags stale tickets.
    List(ListArgs),

    /// Clear a ticket left behind by a crashed process.
    ///
    /// Requires --force flag to prevent accidental clearing.
    Clear(ClearArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Lock key.
    pub key: String,

    /// Identity to draw the ticket under (default: a fresh UUID).
    #[arg(long)]
    pub identity: Option<String>,

    /// Override the stale-holder timeout in milliseconds (must exceed the command's run time).
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Command and arguments to run, after `--`.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Arguments for the `list` command.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Lock key.
    pub key: String,
}

/// Arguments for the `clear` command.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Lock key.
    pub key: String,

    /// Identity whose ticket should be cleared.
    pub identity: String,

    /// Force clearing the ticket (required for safety).
    #[arg(long)]
    pub force: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        // Verifies the CLI arguments configuration is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run() {
        let cli = Cli::try_parse_from([
            "bakery-lock",
            "--dir",
            "/tmp/locks",
            "run",
            "nightly",
            "--identity",
            "host-1",
            "--timeout-ms",
            "500",
            "--",
            "make",
            "report",
        ])
        .unwrap();

        assert_eq!(cli.dir, PathBuf::from("/tmp/locks"));
        if let Command::Run(args) = cli.command {
            assert_eq!(args.key, "nightly");
            assert_eq!(args.identity.as_deref(), Some("host-1"));
            assert_eq!(args.timeout_ms, Some(500));
            assert_eq!(args.command, vec!["make", "report"]);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn run_help_warns_about_takeover() {
        let mut cli = Cli::command();
        let run = cli.find_subcommand_mut("run").unwrap();
        let help = run.render_long_help().to_string();

        assert!(help.contains("can be taken over"));
    }

    #[test]
    fn parse_run_requires_command() {
        let result = Cli::try_parse_from(["bakery-lock", "run", "nightly"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_run_keeps_child_flags() {
        let cli =
            Cli::try_parse_from(["bakery-lock", "run", "k", "--", "ls", "--color", "-la"]).unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.command, vec!["ls", "--color", "-la"]);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_list_with_default_dir() {
        let cli = Cli::try_parse_from(["bakery-lock", "list", "nightly"]).unwrap();
        assert_eq!(cli.dir, PathBuf::from(".bakery-lock"));
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Command::List(ListArgs { ref key }) if key == "nightly"));
    }

    #[test]
    fn parse_clear() {
        let cli = Cli::try_parse_from([
            "bakery-lock",
            "clear",
            "nightly",
            "host-1",
            "--force",
            "--config",
            "lock.yaml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("lock.yaml")));
        if let Command::Clear(args) = cli.command {
            assert_eq!(args.key, "nightly");
            assert_eq!(args.identity, "host-1");
            assert!(args.force);
        } else {
            panic!("Expected Clear command");
        }
    }
}
