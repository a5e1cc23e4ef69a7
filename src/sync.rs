use crate::bar::{derive_bar, BarFigure};
use crate::config::{AppConfig, BarConfig, MapConfig, OutOfRangePolicy, StyleConfig};
use crate::error::DashboardResult;
use crate::map::{derive_map, MapFigure};
use crate::selection::resolve;
use crate::table::TableState;
use crate::types::Record;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ViewSpec {
    Map(MapFigure),
    Bar(BarFigure),
}

/// Subscriber that turns effective records into one view's specification.
pub trait ViewDeriver: Send + Sync {
    fn name(&self) -> &'static str;

    fn derive(&self, records: &[Record]) -> DashboardResult<ViewSpec>;
}

pub struct MapDeriver {
    pub map: MapConfig,
    pub style: StyleConfig,
}

impl ViewDeriver for MapDeriver {
    fn name(&self) -> &'static str {
        "map"
    }

    fn derive(&self, records: &[Record]) -> DashboardResult<ViewSpec> {
        Ok(ViewSpec::Map(derive_map(records, &self.map, &self.style)))
    }
}

pub struct BarDeriver {
    pub bar: BarConfig,
}

impl ViewDeriver for BarDeriver {
    fn name(&self) -> &'static str {
        "bar"
    }

    fn derive(&self, records: &[Record]) -> DashboardResult<ViewSpec> {
        Ok(ViewSpec::Bar(derive_bar(records, &self.bar)))
    }
}

pub type Views = BTreeMap<&'static str, Arc<ViewSpec>>;

/// Result of one publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publication {
    pub effective_len: usize,
    pub rejected: Vec<usize>,
    /// Views whose deriver failed and kept their previous specification.
    pub failed: Vec<&'static str>,
}

pub struct Synchronizer {
    derivers: Arc<[Arc<dyn ViewDeriver>]>,
    policy: OutOfRangePolicy,
    views: Views,
}

impl Synchronizer {
    pub fn new(derivers: Arc<[Arc<dyn ViewDeriver>]>, policy: OutOfRangePolicy) -> Self {
        Self {
            derivers,
            policy,
            views: Views::new(),
        }
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    /// Resolves `state` once and runs every subscriber against it.
    pub fn publish(&mut self, state: &TableState) -> Publication {
        let resolution = resolve(state, self.policy);
        for error in resolution.errors(state.records.len()) {
            warn!(%error, "Rejected selection index");
        }

        let mut failed = Vec::new();
        for deriver in self.derivers.iter() {
            match deriver.derive(&resolution.records) {
                Ok(spec) => {
                    self.views.insert(deriver.name(), Arc::new(spec));
                }
                Err(error) => {
                    warn!(view = deriver.name(), %error, "Keeping previous view");
                    failed.push(deriver.name());
                }
            }
        }

        Publication {
            effective_len: resolution.records.len(),
            rejected: resolution.rejected,
            failed,
        }
    }
}

/// The map and bar subscribers configured from `config`.
pub fn default_derivers(config: &AppConfig) -> Arc<[Arc<dyn ViewDeriver>]> {
    let map: Arc<dyn ViewDeriver> = Arc::new(MapDeriver {
        map: config.map.clone(),
        style: config.style.clone(),
    });
    let bar: Arc<dyn ViewDeriver> = Arc::new(BarDeriver {
        bar: config.bar.clone(),
    });
    Arc::from(vec![map, bar])
}
