//! Command implementations for bakery-lock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command returns the process exit code on success.

use crate::cli::{ClearArgs, Cli, Command, ListArgs, RunArgs};
use bakery_lock::exit_codes;
use bakery_lock::{FileStorage, LockConfig, LockError, Result, SharedLock, Storage};
use std::sync::Arc;
use tracing::debug;

/// Resolved storage and settings shared by all commands.
struct Context {
    storage: Arc<dyn Storage>,
    config: LockConfig,
}

impl Context {
    fn resolve(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => LockConfig::load(path)?,
            None => LockConfig::default(),
        };

        let storage = FileStorage::open(&cli.dir).map_err(|e| {
            LockError::StorageUnavailable(format!(
                "cannot open lock directory '{}': {}",
                cli.dir.display(),
                e
            ))
        })?;

        Ok(Self {
            storage: Arc::new(storage),
            config,
        })
    }
}

/// Dispatch a command to its implementation.
pub async fn dispatch(cli: Cli) -> Result<i32> {
    let ctx = Context::resolve(&cli)?;

    match cli.command {
        Command::Run(args) => cmd_run(&ctx, args).await,
        Command::List(args) => cmd_list(&ctx, args),
        Command::Clear(args) => cmd_clear(&ctx, args),
    }
}

async fn cmd_run(ctx: &Context, args: RunArgs) -> Result<i32> {
    let mut config = ctx.config.clone();
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    let Some((program, program_args)) = args.command.split_first() else {
        return Err(LockError::UserError("no command given".to_string()));
    };

    let lock = SharedLock::new(args.key.as_str(), ctx.storage.clone(), config)?;
    let guard = lock.lock(args.identity.as_deref()).await?;
    debug!(lock = %args.key, identity = guard.identity(), program = %program, "running");

    let status = tokio::process::Command::new(program)
        .args(program_args)
        .status()
        .await;

    guard.release()?;

    let status = status
        .map_err(|e| LockError::UserError(format!("failed to run '{}': {}", program, e)))?;

    Ok(status.code().unwrap_or(exit_codes::CHILD_TERMINATED))
}

fn cmd_list(ctx: &Context, args: ListArgs) -> Result<i32> {
    let tickets = bakery_lock::list_tickets(ctx.storage.as_ref(), &args.key, &ctx.config)?;

    if tickets.is_empty() {
        println!("No active tickets for '{}'.", args.key);
        return Ok(exit_codes::SUCCESS);
    }

    println!("Tickets for '{}' ({}):", args.key, tickets.len());
    println!();

    for ticket in &tickets {
        let record = &ticket.record;
        println!("  #{} {}:", record.number, record.identity);
        println!("    Owner:      {}", record.owner);
        if let Some(pid) = record.pid {
            println!("    PID:        {}", pid);
        }
        println!(
            "    Issued:     {}",
            record.issued_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("    Refreshed:  {} ago", record.age_string());
        if ticket.entering {
            println!("    Status:     choosing a number");
        }
        if ticket.is_stale {
            println!(
                "    Status:     STALE (unchanged for more than {} ms)",
                ctx.config.timeout_ms
            );
        }
        println!();
    }

    let stale_count = tickets.iter().filter(|t| t.is_stale).count();
    if stale_count > 0 {
        println!(
            "Note: {} ticket(s) are stale. Use `bakery-lock clear {} <identity> --force` to clear.",
            stale_count, args.key
        );
    }

    Ok(exit_codes::SUCCESS)
}

fn cmd_clear(ctx: &Context, args: ClearArgs) -> Result<i32> {
    if !args.force {
        return Err(LockError::UserError(format!(
            "refusing to clear ticket without --force flag.\n\n\
             Clearing a ticket lets another process enter while the holder may still be running.\n\
             Only clear tickets of processes you know have crashed.\n\n\
             To clear the ticket, run:\n  bakery-lock clear {} {} --force",
            args.key, args.identity
        )));
    }

    let cleared =
        bakery_lock::clear_ticket(ctx.storage.as_ref(), &args.key, &args.identity, &ctx.config)?;

    println!("Cleared {}", cleared);
    Ok(exit_codes::SUCCESS)
}
