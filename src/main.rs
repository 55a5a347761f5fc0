mod cli;
mod db;
mod exec;
mod format;
mod history;
mod intent;
mod types;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::io::Write;
use std::path::Path;
use std::process::{ExitCode, ExitStatus};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{normalize_args, Cli};
use db::Db;
use intent::{CommandSource, ExecMode, Intent, UsageError};
use types::Criteria;

const USAGE_EXIT: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => report(&err),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "remember=debug"
    } else {
        "remember=warn"
    };

    // stderr only: stdout carries search results
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let Some(intent) = intent::resolve(&cli.action)? else {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let db_path = cli.db_path();
    let mut db = Db::open(&db_path)
        .with_context(|| format!("open store {}", db_path.display()))?
        .with_unique_keys(cli.unique_keys);

    match intent {
        Intent::Add {
            source,
            key,
            metadata,
        } => cmd_add(
            &mut db,
            &cli.histfile,
            source,
            key.as_deref(),
            metadata.as_deref(),
        ),
        Intent::Delete(criteria) => cmd_delete(&db, &criteria),
        Intent::Search {
            criteria,
            exec: None,
        } => cmd_search(&db, &criteria, cli.json),
        Intent::Search {
            criteria,
            exec: Some(mode),
        } => cmd_exec(&db, &criteria, mode),
    }
}

// ── Command implementations ───────────────────────────────────────────────────

fn cmd_add(
    db: &mut Db,
    histfile: &Path,
    source: CommandSource,
    key: Option<&str>,
    metadata: Option<&str>,
) -> Result<ExitCode> {
    let command = match source {
        CommandSource::Literal(text) => text,
        CommandSource::History(n) => history::nth_recent(histfile, n)?,
    };

    let saved = db
        .insert(&command, key, metadata)
        .with_context(|| format!("save `{command}`"))?;
    info!(id = saved.id, command = %saved.command, "saved");
    Ok(ExitCode::SUCCESS)
}

fn cmd_delete(db: &Db, criteria: &Criteria) -> Result<ExitCode> {
    let removed = db.delete(criteria).context("delete commands")?;
    if removed == 0 {
        // stderr: stdout stays empty for remove
        eprintln!("{}", format::NO_MATCHES);
    }
    info!(removed, remaining = db.count()?, "deleted");
    Ok(ExitCode::SUCCESS)
}

fn cmd_search(db: &Db, criteria: &Criteria, json: bool) -> Result<ExitCode> {
    let rows = db.find(criteria).context("search commands")?;

    let mut out = std::io::stdout().lock();
    if json {
        writeln!(out, "{}", format::format_json(&rows)?)?;
    } else {
        write!(out, "{}", format::format_rows(&rows))?;
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_exec(db: &Db, criteria: &Criteria, mode: ExecMode) -> Result<ExitCode> {
    let rows = db.find(criteria).context("search commands")?;
    if rows.is_empty() {
        println!("{}", format::NO_MATCHES);
        return Ok(ExitCode::SUCCESS);
    }

    let mut input = std::io::stdin().lock();
    let mut output = std::io::stdout();
    match exec::run_match(&rows, mode, &mut input, &mut output)? {
        Some(status) => Ok(ExitCode::from(status_code(status))),
        None => Ok(ExitCode::SUCCESS),
    }
}

// ── Exit handling ─────────────────────────────────────────────────────────────

/// The child's exit code; 1 when it was killed by a signal.
fn status_code(status: ExitStatus) -> u8 {
    status
        .code()
        .and_then(|c| u8::try_from(c).ok())
        .unwrap_or(1)
}

fn is_usage_error(err: &anyhow::Error) -> bool {
    err.chain().any(|e| e.is::<UsageError>())
}

fn report(err: &anyhow::Error) -> ExitCode {
    if is_usage_error(err) {
        eprintln!("error: {err}\n");
        eprintln!("{}", Cli::command().render_usage());
        eprintln!("\nFor more information, try '--help'.");
        return ExitCode::from(USAGE_EXIT);
    }
    eprintln!("error: {err:#}");
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_are_found_through_context() {
        let err = anyhow::Error::from(UsageError::ExecConflict).context("while dispatching");
        assert!(is_usage_error(&err));
    }

    #[test]
    fn store_errors_are_not_usage_errors() {
        let err = anyhow::Error::from(db::StoreError::Schema("bad".into()));
        assert!(!is_usage_error(&err));
    }

    #[cfg(unix)]
    #[test]
    fn status_code_passes_through_exit_code() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status: exit code lives in the second byte
        assert_eq!(status_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(status_code(ExitStatus::from_raw(3 << 8)), 3);
    }

    #[cfg(unix)]
    #[test]
    fn status_code_maps_signal_to_one() {
        use std::os::unix::process::ExitStatusExt;
        // SIGKILL
        assert_eq!(status_code(ExitStatus::from_raw(9)), 1);
    }
}
