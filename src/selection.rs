use crate::config::OutOfRangePolicy;
use crate::error::DashboardError;
use crate::table::TableState;
use crate::types::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Selected row positions, ascending and without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct SelectionIndices(BTreeSet<usize>);

impl SelectionIndices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    pub fn toggle(&mut self, index: usize) {
        if !self.0.remove(&index) {
            self.0.insert(index);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<usize> for SelectionIndices {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        SelectionIndices(iter.into_iter().collect())
    }
}

impl From<Vec<usize>> for SelectionIndices {
    fn from(v: Vec<usize>) -> Self {
        v.into_iter().collect()
    }
}

impl From<SelectionIndices> for Vec<usize> {
    fn from(s: SelectionIndices) -> Self {
        s.0.into_iter().collect()
    }
}

/// The records a derived view should render, plus any indices that had to be
/// thrown away.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub records: Vec<Record>,
    pub rejected: Vec<usize>,
}

impl Resolution {
    pub fn errors(&self, len: usize) -> impl Iterator<Item = DashboardError> + '_ {
        self.rejected
            .iter()
            .map(move |&index| DashboardError::SelectionIndexOutOfRange { index, len })
    }
}

// Stale indices are dropped here so the derivations never see them.
pub fn resolve(state: &TableState, policy: OutOfRangePolicy) -> Resolution {
    let len = state.records.len();
    if state.selection.is_empty() {
        return Resolution {
            records: state.records.clone(),
            rejected: Vec::new(),
        };
    }

    let (valid, rejected): (Vec<usize>, Vec<usize>) =
        state.selection.iter().partition(|&i| i < len);

    if !rejected.is_empty() {
        debug!(?rejected, len, "Discarding out-of-range selection indices");
    }

    let records = if valid.is_empty() && policy == OutOfRangePolicy::ShowAll {
        state.records.clone()
    } else {
        valid.iter().map(|&i| state.records[i].clone()).collect()
    };

    Resolution { records, rejected }
}

/// [`resolve`] with the default policy, keeping only the records.
pub fn effective(state: &TableState) -> Vec<Record> {
    resolve(state, OutOfRangePolicy::default()).records
}
