use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::intent::ActionArgs;

pub fn default_db_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".remember").join("remember.db"),
        None => {
            tracing::warn!("$HOME not set, using /tmp/.remember/remember.db (data will not persist across reboots)");
            PathBuf::from("/tmp").join(".remember").join("remember.db")
        }
    }
}

pub fn default_histfile() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".bash_history")
}

#[derive(Parser, Debug)]
#[command(name = "remember", version)]
#[command(about = "Save, search, and recall shell commands")]
#[command(after_help = "EXAMPLES:\n    \
    remember -a \"history | grep foo\" -ak hg     Save a command under key 'hg'\n    \
    remember -hi 1 -am last thing I ran          Save the last history entry\n    \
    remember -sk hg                              Find by key\n    \
    remember -s '%grep%' -R                      Find by pattern\n    \
    remember -sk hg -es                          Find and run, after confirming\n    \
    remember -rk hg                              Delete by key\n    \
    remember -l                                  List everything")]
pub struct Cli {
    #[command(flatten)]
    pub action: ActionArgs,

    /// Path to the SQLite database [default: ~/.remember/remember.db]
    #[arg(long, env = "REMEMBER_DB")]
    pub db: Option<PathBuf>,

    /// Refuse to add a command whose key is already stored
    #[arg(
        long = "unique-keys",
        env = "REMEMBER_UNIQUE_KEYS",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub unique_keys: bool,

    /// Shell history file read by --from_history
    #[arg(long, env = "HISTFILE", default_value_os_t = default_histfile())]
    pub histfile: PathBuf,

    /// Print search results as JSON
    #[arg(long)]
    pub json: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// `--db` / `REMEMBER_DB`, else the per-user default. Only consulted once
    /// an action needs the store.
    pub fn db_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(default_db_path)
    }
}

/// Two-letter short flags clap cannot express, mapped to their long forms.
const LEGACY_SHORT_FLAGS: &[(&str, &str)] = &[
    ("-ak", "--add_key"),
    ("-am", "--add_metadata"),
    ("-rk", "--remove_key"),
    ("-rm", "--remove_metadata"),
    ("-sk", "--search_key"),
    ("-sm", "--search_metadata"),
    ("-es", "--exec_safe"),
    ("-hi", "--from_history"),
];

/// Rewrite `-ak`-style flags to long form so clap parses them. Stops at `--`.
///
/// Every argument equal to one of these flags is rewritten, values included:
/// `-am cleanup -rm` reads as a remove flag. Put such values after `--`.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator,
    I::Item: Into<OsString>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(Into::into)
        .map(|arg: OsString| {
            if passthrough {
                return arg;
            }
            if arg == "--" {
                passthrough = true;
                return arg;
            }
            LEGACY_SHORT_FLAGS
                .iter()
                .find(|(short, _)| arg == *short)
                .map_or(arg, |(_, long)| OsString::from(long))
        })
        .collect()
}
