use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of the `commands` table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RememberedCommand {
    pub id: i64,
    pub command: String,
    pub key: Option<String>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The closed set of columns a lookup may constrain.
/// Column names reach SQL only through `column()`; user values are always bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Command,
    Key,
    Metadata,
}

impl Field {
    pub fn column(self) -> &'static str {
        match self {
            Field::Command => "command",
            Field::Key => "key",
            Field::Metadata => "metadata",
        }
    }
}

/// Lookup shared by find and delete. Given fields are ANDed together;
/// an empty `Criteria` matches every row.
///
/// With `pattern` set, each value is compared with SQL `LIKE` and is used
/// as-is: callers write their own `%` / `_` wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    pub command: Option<String>,
    pub key: Option<String>,
    pub metadata: Option<String>,
    pub pattern: bool,
}

impl Criteria {
    /// The populated fields in column order.
    pub fn terms(&self) -> Vec<(Field, &str)> {
        [
            (Field::Command, self.command.as_deref()),
            (Field::Key, self.key.as_deref()),
            (Field::Metadata, self.metadata.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect()
    }
}

#[cfg(test)]
impl Criteria {
    pub fn by_command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    pub fn by_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn by_metadata(metadata: impl Into<String>) -> Self {
        Self {
            metadata: Some(metadata.into()),
            ..Self::default()
        }
    }

    pub fn pattern(mut self, pattern: bool) -> Self {
        self.pattern = pattern;
        self
    }
}
