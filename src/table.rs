use crate::selection::SelectionIndices;
use crate::types::{Column, Dataset, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the table emits after every interaction. `selection` indexes into
/// `records` of the same state, never into the dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableState {
    pub records: Vec<Record>,
    pub selection: SelectionIndices,
}

/// Initial state for `records`: everything visible, nothing selected.
pub fn render(records: &[Record]) -> TableState {
    TableState {
        records: records.to_vec(),
        selection: SelectionIndices::new(),
    }
}

/// User interactions the table accepts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableEvent {
    Select { indices: Vec<usize> },
    ToggleRow { index: usize },
    ClearSelection,
    Sort {
        column: Column,
        #[serde(default)]
        descending: bool,
    },
    ClearSort,
    Filter { column: Column, query: String },
    ClearFilters,
}

impl TableEvent {
    /// Sort and filter change which rows are visible; the rest only touch the
    /// selection.
    pub fn changes_content(&self) -> bool {
        matches!(
            self,
            TableEvent::Sort { .. }
                | TableEvent::ClearSort
                | TableEvent::Filter { .. }
                | TableEvent::ClearFilters
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub column: Column,
    pub descending: bool,
}

/// Active sort and filters. Replaying them onto a fresh view rebuilds the
/// same visible rows, so selection indices stay meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSettings {
    pub sort: Option<SortSpec>,
    pub filters: BTreeMap<Column, String>,
}

impl TableSettings {
    /// Events that restore these settings and `selection` on a new view.
    pub fn replay_events(&self, selection: &SelectionIndices) -> Vec<TableEvent> {
        let mut events = Vec::new();
        if let Some(SortSpec { column, descending }) = self.sort {
            events.push(TableEvent::Sort { column, descending });
        }
        for (column, query) in &self.filters {
            events.push(TableEvent::Filter {
                column: *column,
                query: query.clone(),
            });
        }
        events.push(TableEvent::Select {
            indices: selection.iter().collect(),
        });
        events
    }
}

/// Per-session table over the shared dataset.
#[derive(Debug, Clone)]
pub struct TableView {
    dataset: Dataset,
    sort: Option<SortSpec>,
    /// Lower-cased query per column.
    filters: BTreeMap<Column, String>,
    state: TableState,
}

impl TableView {
    pub fn new(dataset: Dataset) -> Self {
        let state = render(dataset.all_records());
        Self {
            dataset,
            sort: None,
            filters: BTreeMap::new(),
            state,
        }
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    pub fn settings(&self) -> TableSettings {
        TableSettings {
            sort: self.sort,
            filters: self.filters.clone(),
        }
    }

    /// Applies `event` and returns the state to publish.
    ///
    /// Content changes recompute the visible rows but carry the selection
    /// indices over untouched, the way the browser grid does.
    pub fn apply(&mut self, event: TableEvent) -> &TableState {
        match event {
            TableEvent::Select { indices } => {
                self.state.selection = indices.into();
            }
            TableEvent::ToggleRow { index } => {
                self.state.selection.toggle(index);
            }
            TableEvent::ClearSelection => {
                self.state.selection = SelectionIndices::new();
            }
            TableEvent::Sort { column, descending } => {
                self.sort = Some(SortSpec { column, descending });
                self.refresh_rows();
            }
            TableEvent::ClearSort => {
                self.sort = None;
                self.refresh_rows();
            }
            TableEvent::Filter { column, query } => {
                let query = query.trim().to_lowercase();
                if query.is_empty() {
                    self.filters.remove(&column);
                } else {
                    self.filters.insert(column, query);
                }
                self.refresh_rows();
            }
            TableEvent::ClearFilters => {
                self.filters.clear();
                self.refresh_rows();
            }
        }
        &self.state
    }

    fn refresh_rows(&mut self) {
        let mut rows: Vec<Record> = self
            .dataset
            .all_records()
            .iter()
            .filter(|r| self.matches_filters(r))
            .cloned()
            .collect();

        if let Some(SortSpec { column, descending }) = self.sort {
            rows.sort_by(|a, b| {
                let ord = a.compare_by(b, column);
                if descending { ord.reverse() } else { ord }
            });
        }

        self.state.records = rows;
    }

    fn matches_filters(&self, record: &Record) -> bool {
        self.filters
            .iter()
            .all(|(column, query)| record.cell_text(*column).to_lowercase().contains(query))
    }
}
