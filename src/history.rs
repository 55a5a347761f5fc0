//! Read entries back out of a shell history file.
//!
//! Handles plain bash history, bash with `HISTTIMEFORMAT` timestamp lines
//! (`#1700000000`), and zsh extended history (`: 1700000000:0;command`).

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("read history file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("history entry {index} is out of range ({available} entries in {})", .path.display())]
    OutOfRange {
        index: usize,
        available: usize,
        path: PathBuf,
    },
}

/// The `n`-th most recent entry, counting from 1.
pub fn nth_recent(path: &Path, n: usize) -> Result<String, HistoryError> {
    let bytes = std::fs::read(path).map_err(|source| HistoryError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let entries = entries(&text);

    n.checked_sub(1)
        .and_then(|back| entries.len().checked_sub(back + 1))
        .map(|i| entries[i].to_string())
        .ok_or_else(|| HistoryError::OutOfRange {
            index: n,
            available: entries.len(),
            path: path.to_path_buf(),
        })
}

fn entries(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|line| !is_timestamp_line(line))
        .map(strip_zsh_prefix)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

fn is_timestamp_line(line: &str) -> bool {
    line.strip_prefix('#')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// `: <start>:<elapsed>;<command>` → `<command>`
fn strip_zsh_prefix(line: &str) -> &str {
    let Some(rest) = line.strip_prefix(": ") else {
        return line;
    };
    let Some((meta, command)) = rest.split_once(';') else {
        return line;
    };
    let well_formed = meta
        .split_once(':')
        .is_some_and(|(start, elapsed)| is_digits(start) && is_digits(elapsed));
    if well_formed {
        command
    } else {
        line
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
