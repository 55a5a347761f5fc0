//! Running a remembered command, with the prompts that pick and confirm it.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::process::{Command, ExitStatus};
use tracing::debug;

use crate::intent::{ExecMode, UsageError};
use crate::types::RememberedCommand;

/// Run `command` through `sh -c` with inherited stdio, so its output streams
/// straight to the terminal.
pub fn run_shell(command: &str) -> Result<ExitStatus> {
    debug!(command, "spawning sh -c");
    Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .with_context(|| format!("run `{command}`"))
}

/// Pick one of several matches by number. `Ok(None)` on empty input.
pub fn choose<'a>(
    matches: &'a [RememberedCommand],
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Option<&'a RememberedCommand>> {
    for (i, m) in matches.iter().enumerate() {
        writeln!(output, "{:>3}) {}", i + 1, m.command)?;
    }
    write!(output, "Select [1-{}]: ", matches.len())?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("read selection")?;
    let answer = line.trim();
    if answer.is_empty() {
        return Ok(None);
    }

    let picked = answer
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| matches.get(i));
    match picked {
        Some(m) => Ok(Some(m)),
        None => Err(UsageError::InvalidSelection {
            answer: answer.to_string(),
            max: matches.len(),
        }
        .into()),
    }
}

/// Ask before running. Only `y` / `yes` (any case) count as consent.
pub fn confirm(command: &str, input: &mut impl BufRead, output: &mut impl Write) -> Result<bool> {
    write!(output, "Run '{command}'? [y/N] ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("read confirmation")?;
    let answer = line.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Resolve which match to run (prompting as `mode` requires), then run it.
/// Returns `None` when the user backed out.
pub fn run_match(
    matches: &[RememberedCommand],
    mode: ExecMode,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Option<ExitStatus>> {
    let chosen = match matches {
        [] => return Ok(None),
        [only] => only,
        many => match choose(many, input, output)? {
            Some(m) => m,
            None => return Ok(None),
        },
    };

    if mode == ExecMode::Confirm && !confirm(&chosen.command, input, output)? {
        return Ok(None);
    }
    run_shell(&chosen.command).map(Some)
}
