//! Column level diff between two versions of a table definition.

use std::collections::{HashMap, HashSet};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::schema::sql::same_identifier;
use crate::types::ColumnDescriptor;

/// Classification of a column between two table versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffAction {
    Add,
    Drop,
    Modify,
    Rename,
    Unchanged,
}

/// One entry of a column diff.
///
/// `before` is absent for [`DiffAction::Add`] and `after` is absent for [`DiffAction::Drop`]; all
/// other actions carry both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDiffEntry {
    pub action: DiffAction,
    pub before: Option<ColumnDescriptor>,
    pub after: Option<ColumnDescriptor>,
}

impl ColumnDiffEntry {
    fn matched(before: &ColumnDescriptor, after: &ColumnDescriptor) -> ColumnDiffEntry {
        let action = if !same_identifier(&before.name, &after.name) {
            DiffAction::Rename
        } else if before.attributes_differ(after) {
            DiffAction::Modify
        } else {
            DiffAction::Unchanged
        };

        Self {
            action,
            before: Some(before.clone()),
            after: Some(after.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ColumnKey {
    Id(i64),
    Name(String),
}

/// Computes the diff between `previous` and `current`.
///
/// Columns are identified by their id when every column on both sides carries one, otherwise by
/// their case-insensitive name. Every column of both inputs ends up in exactly one entry. Entries
/// follow the order of `previous`, with added columns appended in the order of `current`.
///
/// Under name identity a single dropped column and a single added column at the same position
/// with the same type are reported as one rename.
pub fn compute_column_diff(
    previous: &[ColumnDescriptor],
    current: &[ColumnDescriptor],
) -> EtlResult<Vec<ColumnDiffEntry>> {
    let by_id = previous
        .iter()
        .chain(current.iter())
        .all(|column| column.id.is_some());
    let key_of = |column: &ColumnDescriptor| match column.id {
        Some(id) if by_id => ColumnKey::Id(id),
        _ => ColumnKey::Name(column.name.to_lowercase()),
    };

    let current_positions = index_columns(current, &key_of)?;
    index_columns(previous, &key_of)?;

    let mut matched = HashSet::new();
    let mut entries = Vec::with_capacity(previous.len().max(current.len()));
    // Position in `previous` of every dropped column, keyed by entry index.
    let mut dropped = Vec::new();

    for (position, before) in previous.iter().enumerate() {
        match current_positions.get(&key_of(before)) {
            Some(&index) => {
                matched.insert(index);
                entries.push(ColumnDiffEntry::matched(before, &current[index]));
            }
            None => {
                dropped.push((entries.len(), position));
                entries.push(ColumnDiffEntry {
                    action: DiffAction::Drop,
                    before: Some(before.clone()),
                    after: None,
                });
            }
        }
    }

    let added: Vec<usize> = (0..current.len())
        .filter(|index| !matched.contains(index))
        .collect();

    if !by_id
        && let ([(entry_index, dropped_position)], [added_position]) =
            (dropped.as_slice(), added.as_slice())
        && dropped_position == added_position
        && previous[*dropped_position].same_type_as(&current[*added_position])
    {
        entries[*entry_index] = ColumnDiffEntry {
            action: DiffAction::Rename,
            before: Some(previous[*dropped_position].clone()),
            after: Some(current[*added_position].clone()),
        };
        return Ok(entries);
    }

    entries.extend(added.into_iter().map(|index| ColumnDiffEntry {
        action: DiffAction::Add,
        before: None,
        after: Some(current[index].clone()),
    }));

    Ok(entries)
}

fn index_columns(
    columns: &[ColumnDescriptor],
    key_of: &impl Fn(&ColumnDescriptor) -> ColumnKey,
) -> EtlResult<HashMap<ColumnKey, usize>> {
    let mut positions = HashMap::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        if positions.insert(key_of(column), index).is_some() {
            bail!(
                ErrorKind::InvalidTableDefinition,
                "Duplicate column in table definition",
                format!("column `{}` appears more than once", column.name)
            );
        }
    }

    Ok(positions)
}
