//! Turning parsed flags into exactly one store action.
//!
//! Flags fall into roles: a command source (`--command`, `--from_history`),
//! add, delete, and search flags, plus modifiers (`--regex`, `--exec`,
//! `--exec_safe`) that only mean something next to certain other flags.
//! Resolution either yields a single [`Intent`], nothing at all (no action
//! requested, caller prints help), or a [`UsageError`].

use clap::Args;

use crate::types::Criteria;

#[derive(Args, Debug, Default, Clone)]
pub struct ActionArgs {
    /// Literal command to act on (added when no other action is given)
    #[arg(short = 'c', long = "command", value_name = "TEXT")]
    pub command: Option<String>,

    /// Use the N-th most recent shell history entry as the command [-hi]
    #[arg(long = "from_history", visible_alias = "from-history", value_name = "N")]
    pub from_history: Option<usize>,

    /// Add TEXT as a new command
    #[arg(short = 'a', long = "add", value_name = "TEXT")]
    pub add: Option<String>,

    /// Key to attach to the command being added [-ak]
    #[arg(long = "add_key", visible_alias = "add-key", value_name = "KEY")]
    pub add_key: Option<String>,

    /// Metadata to attach to the command being added [-am]
    #[arg(
        long = "add_metadata",
        visible_alias = "add-metadata",
        value_name = "TEXT",
        num_args = 1..
    )]
    pub add_metadata: Option<Vec<String>>,

    /// Delete commands whose text matches TEXT
    #[arg(short = 'r', long = "remove", value_name = "TEXT")]
    pub remove: Option<String>,

    /// Delete commands with this key [-rk]
    #[arg(long = "remove_key", visible_alias = "remove-key", value_name = "KEY")]
    pub remove_key: Option<String>,

    /// Delete commands whose metadata matches [-rm]
    #[arg(
        long = "remove_metadata",
        visible_alias = "remove-metadata",
        value_name = "TEXT",
        num_args = 1..
    )]
    pub remove_metadata: Option<Vec<String>>,

    /// Find commands whose text matches TEXT
    #[arg(short = 's', long = "search", value_name = "TEXT")]
    pub search: Option<String>,

    /// Find commands with this key [-sk]
    #[arg(long = "search_key", visible_alias = "search-key", value_name = "KEY")]
    pub search_key: Option<String>,

    /// Find commands whose metadata matches [-sm]
    #[arg(
        long = "search_metadata",
        visible_alias = "search-metadata",
        value_name = "TEXT",
        num_args = 1..
    )]
    pub search_metadata: Option<Vec<String>>,

    /// Treat text criteria as SQL LIKE patterns (write your own % and _)
    #[arg(short = 'R', long = "regex")]
    pub regex: bool,

    /// List all stored commands
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Run the match (asks which one when several match)
    #[arg(short = 'e', long = "exec")]
    pub exec: bool,

    /// Like --exec, but confirm before running [-es]
    #[arg(long = "exec_safe", visible_alias = "exec-safe")]
    pub exec_safe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Add,
    Delete,
    Search,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Add => write!(f, "add"),
            Role::Delete => write!(f, "remove"),
            Role::Search => write!(f, "search"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Run,
    Confirm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSource {
    Literal(String),
    /// 1-based index from the most recent history entry.
    History(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Add {
        source: CommandSource,
        key: Option<String>,
        metadata: Option<String>,
    },
    Delete(Criteria),
    Search {
        criteria: Criteria,
        exec: Option<ExecMode>,
    },
}

/// A flag given without any of the flags it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCompanion {
    pub flag: &'static str,
    pub requires: &'static [&'static str],
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("conflicting actions: {}", join_roles(.0))]
    Conflicting(Vec<Role>),
    #[error("{}", describe_missing(.0))]
    MissingCompanion(Vec<MissingCompanion>),
    #[error("--add and --command/--from_history both name a command; give only one")]
    TwoCommandSources,
    #[error("--exec and --exec_safe cannot be combined")]
    ExecConflict,
    #[error("--{0} must not be empty")]
    EmptyValue(&'static str),
    #[error("--from_history counts from 1 (the most recent entry)")]
    ZeroHistoryIndex,
    #[error("invalid selection '{answer}': enter a number from 1 to {max}")]
    InvalidSelection { answer: String, max: usize },
}

fn join_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(Role::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_missing(missing: &[MissingCompanion]) -> String {
    missing
        .iter()
        .map(|m| format!("{} requires one of {}", m.flag, m.requires.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

const ADD_COMPANIONS: &[&str] = &["--add", "--command", "--from_history"];
const CRITERION_FLAGS: &[&str] = &[
    "--search",
    "--search_key",
    "--search_metadata",
    "--remove",
    "--remove_key",
    "--remove_metadata",
];
const SEARCH_FLAGS: &[&str] = &["--search", "--search_key", "--search_metadata", "--list"];

/// Validate flag combinations and build the single action they ask for.
/// `Ok(None)` means no action flag was given at all.
pub fn resolve(args: &ActionArgs) -> Result<Option<Intent>, UsageError> {
    let has_source = args.command.is_some() || args.from_history.is_some();
    let has_criterion = args.search.is_some()
        || args.search_key.is_some()
        || args.search_metadata.is_some()
        || args.remove.is_some()
        || args.remove_key.is_some()
        || args.remove_metadata.is_some();

    let mut roles = Vec::new();
    if has_source
        || args.add.is_some()
        || args.add_key.is_some()
        || args.add_metadata.is_some()
    {
        roles.push(Role::Add);
    }
    if args.remove.is_some() || args.remove_key.is_some() || args.remove_metadata.is_some() {
        roles.push(Role::Delete);
    }
    if args.search.is_some()
        || args.search_key.is_some()
        || args.search_metadata.is_some()
        || args.list
    {
        roles.push(Role::Search);
    }
    if roles.len() > 1 {
        return Err(UsageError::Conflicting(roles));
    }

    let mut missing = Vec::new();
    let has_add_text = args.add.is_some() || has_source;
    if args.add_key.is_some() && !has_add_text {
        missing.push(MissingCompanion {
            flag: "--add_key",
            requires: ADD_COMPANIONS,
        });
    }
    if args.add_metadata.is_some() && !has_add_text {
        missing.push(MissingCompanion {
            flag: "--add_metadata",
            requires: ADD_COMPANIONS,
        });
    }
    if args.regex && !has_criterion {
        missing.push(MissingCompanion {
            flag: "--regex",
            requires: CRITERION_FLAGS,
        });
    }
    let searching = roles.first() == Some(&Role::Search);
    if args.exec && !searching {
        missing.push(MissingCompanion {
            flag: "--exec",
            requires: SEARCH_FLAGS,
        });
    }
    if args.exec_safe && !searching {
        missing.push(MissingCompanion {
            flag: "--exec_safe",
            requires: SEARCH_FLAGS,
        });
    }
    if !missing.is_empty() {
        return Err(UsageError::MissingCompanion(missing));
    }

    let Some(role) = roles.first() else {
        return Ok(None);
    };

    let intent = match role {
        Role::Add => add_intent(args)?,
        Role::Delete => Intent::Delete(Criteria {
            command: args.remove.clone(),
            key: args.remove_key.clone(),
            metadata: join_words(args.remove_metadata.as_deref()),
            pattern: args.regex,
        }),
        Role::Search => {
            if args.exec && args.exec_safe {
                return Err(UsageError::ExecConflict);
            }
            let exec = if args.exec_safe {
                Some(ExecMode::Confirm)
            } else if args.exec {
                Some(ExecMode::Run)
            } else {
                None
            };
            Intent::Search {
                criteria: Criteria {
                    command: args.search.clone(),
                    key: args.search_key.clone(),
                    metadata: join_words(args.search_metadata.as_deref()),
                    pattern: args.regex,
                },
                exec,
            }
        }
    };
    Ok(Some(intent))
}

fn add_intent(args: &ActionArgs) -> Result<Intent, UsageError> {
    let literal = match (&args.add, &args.command) {
        (Some(_), Some(_)) => return Err(UsageError::TwoCommandSources),
        (Some(text), None) => Some(("add", text)),
        (None, Some(text)) => Some(("command", text)),
        (None, None) => None,
    };

    let source = match (literal, args.from_history) {
        (Some(_), Some(_)) => return Err(UsageError::TwoCommandSources),
        (Some((flag, text)), None) => {
            if text.trim().is_empty() {
                return Err(UsageError::EmptyValue(flag));
            }
            CommandSource::Literal(text.clone())
        }
        (None, Some(0)) => return Err(UsageError::ZeroHistoryIndex),
        (None, Some(n)) => CommandSource::History(n),
        // Ruled out by the companion checks in `resolve`
        (None, None) => {
            return Err(UsageError::MissingCompanion(vec![MissingCompanion {
                flag: "--add_key",
                requires: ADD_COMPANIONS,
            }]))
        }
    };

    Ok(Intent::Add {
        source,
        key: args.add_key.clone(),
        metadata: join_words(args.add_metadata.as_deref()),
    })
}

/// Multi-word metadata values are stored joined by single spaces.
fn join_words(words: Option<&[String]>) -> Option<String> {
    words.map(|w| w.join(" "))
}
