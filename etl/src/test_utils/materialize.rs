//! Reference evaluation of change application against an in-memory table.
//!
//! [`MaterializedTable::merge`] follows the semantics of the merge statement rendered by
//! [`MergePlan`]: rows are deduplicated by key keeping the highest ordering key, with the later
//! row of the batch winning ties, and the survivors are matched against the table.
//! [`MaterializedTable::apply_in_order`] applies every row on its own in ordering key order,
//! which is the state the merge must converge to.

use std::collections::{BTreeMap, HashMap};

use crate::replication::merge::MergePlan;
use crate::types::{ChangeFlag, ChangeRow};

type Values = Vec<Option<String>>;

/// A table keyed by primary key values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializedTable {
    key_indices: Vec<usize>,
    rows: BTreeMap<Values, Values>,
}

impl MaterializedTable {
    pub fn new(plan: &MergePlan) -> MaterializedTable {
        Self {
            key_indices: plan.key_indices(),
            rows: BTreeMap::new(),
        }
    }

    pub fn rows(&self) -> &BTreeMap<Values, Values> {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &[Option<String>]) -> Option<&Values> {
        self.rows.get(key)
    }

    /// Applies `batch` as one merge and returns how many rows changed.
    pub fn merge(&mut self, batch: &[ChangeRow]) -> usize {
        let mut survivors: HashMap<Values, &ChangeRow> = HashMap::new();
        for row in batch {
            let key = row.key(&self.key_indices);
            match survivors.get(&key) {
                Some(current) if current.ordering_key > row.ordering_key => {}
                _ => {
                    survivors.insert(key, row);
                }
            }
        }

        let mut changed = 0;
        for (key, row) in survivors {
            if self.apply_row(key, row) {
                changed += 1;
            }
        }

        changed
    }

    /// Applies each row of `batch` on its own, in ascending ordering key order.
    pub fn apply_in_order(&mut self, batch: &[ChangeRow]) {
        let mut ordered: Vec<&ChangeRow> = batch.iter().collect();
        ordered.sort_by_key(|row| row.ordering_key);

        for row in ordered {
            let key = row.key(&self.key_indices);
            self.apply_row(key, row);
        }
    }

    /// Returns `true` when the row changed the table.
    fn apply_row(&mut self, key: Values, row: &ChangeRow) -> bool {
        match row.flag {
            ChangeFlag::Delete => self.rows.remove(&key).is_some(),
            ChangeFlag::Insert | ChangeFlag::Update => {
                let previous = self.rows.insert(key, row.values.clone());
                previous.as_ref() != Some(&row.values)
            }
        }
    }
}
