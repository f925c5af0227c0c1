use anyhow::{Context, Result, bail};
use clap::CommandFactory;
use mailprobe_lib::VerificationCoordinator;
use tracing_subscriber::EnvFilter;

use std::io::{self, BufRead};

#[path = "mailprobe-cli/args.rs"]
mod args;
#[path = "mailprobe-cli/output.rs"]
mod output;

use args::Cli;

fn init_tracing(verbose: bool) {
    let default = if verbose { "mailprobe_lib=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // logs go to stderr so stdout stays a clean report
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn collect_emails(cli: &Cli) -> Result<Vec<String>> {
    let mut emails = cli.emails.clone();
    if cli.stdin {
        for line in io::stdin().lock().lines() {
            let line = line.context("read stdin")?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                emails.push(trimmed.to_string());
            }
        }
    }
    Ok(emails)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let emails = collect_emails(&cli)?;
    if emails.is_empty() {
        Cli::command().print_help()?;
        println!();
        bail!("no addresses given (pass them as arguments or use --stdin)");
    }

    let coordinator = VerificationCoordinator::new(&emails, cli.probe_options())
        .context("set up verification")?;
    let dropped = emails.len() - coordinator.triage().address_count();
    if dropped > 0 {
        tracing::warn!(dropped, "skipped malformed or repeated addresses");
    }

    let results = coordinator.validate_all().await;
    let rows = output::rows(&results, cli.transcript);
    output::write_reports(&rows, &cli)?;

    // exit codes: 0 all valid, 2 at least one invalid, 1 fatal
    if output::any_invalid(&rows) {
        std::process::exit(2);
    }
    Ok(())
}
