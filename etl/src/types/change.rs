use std::fmt;
use std::str::FromStr;

use crate::bail;
use crate::error::{ErrorKind, EtlError};

/// 1-based position of the operation flag in a staged change file.
pub const CHANGE_FLAG_POSITION: usize = 1;

/// 1-based position of the commit timestamp, the ordering key of a change.
pub const CHANGE_ORDERING_POSITION: usize = 4;

/// 1-based position of the first table column; the table, schema and commit timestamp come
/// before it.
pub const CHANGE_FIRST_COLUMN_POSITION: usize = 5;

/// Operation recorded for a row in a change file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeFlag {
    Insert,
    Update,
    Delete,
}

impl ChangeFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeFlag::Insert => "I",
            ChangeFlag::Update => "U",
            ChangeFlag::Delete => "D",
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeFlag::Delete)
    }
}

impl fmt::Display for ChangeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeFlag {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(ChangeFlag::Insert),
            "U" => Ok(ChangeFlag::Update),
            "D" => Ok(ChangeFlag::Delete),
            other => bail!(
                ErrorKind::InvalidData,
                "Unknown change flag",
                format!("expected one of I, U, D but got `{other}`")
            ),
        }
    }
}

/// One row of a change file.
///
/// `values` holds every table column in definition order; `None` is SQL `NULL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRow {
    pub flag: ChangeFlag,
    pub ordering_key: u64,
    pub values: Vec<Option<String>>,
}

impl ChangeRow {
    pub fn new(flag: ChangeFlag, ordering_key: u64, values: Vec<Option<String>>) -> ChangeRow {
        Self {
            flag,
            ordering_key,
            values,
        }
    }

    /// Returns the values at `positions` (0-based indices into [`ChangeRow::values`]).
    pub fn key(&self, positions: &[usize]) -> Vec<Option<String>> {
        positions
            .iter()
            .map(|position| self.values.get(*position).cloned().flatten())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_round_trip_through_their_letters() {
        for flag in [ChangeFlag::Insert, ChangeFlag::Update, ChangeFlag::Delete] {
            assert_eq!(flag.as_str().parse::<ChangeFlag>().unwrap(), flag);
        }
        assert_eq!(
            "X".parse::<ChangeFlag>().unwrap_err().kind(),
            ErrorKind::InvalidData
        );
    }
}
