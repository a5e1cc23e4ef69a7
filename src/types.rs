use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Identifier of an event row. The CSV column is usually numeric but nothing
/// guarantees it, so text ids are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventId {
    Int(i64),
    Text(String),
}

impl EventId {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(n) => EventId::Int(n),
            Err(_) => EventId::Text(raw.to_string()),
        }
    }

    /// Integers compare numerically, anything else by display text.
    pub fn sort_cmp(&self, other: &EventId) -> Ordering {
        match (self, other) {
            (EventId::Int(a), EventId::Int(b)) => a.cmp(b),
            _ => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Int(n) => write!(f, "{}", n),
            EventId::Text(s) => f.write_str(s),
        }
    }
}

/// One geocoded event. Field names on the wire match the CSV headers so the
/// page can render rows without a mapping table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Event_ID")]
    pub event_id: EventId,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
}

impl Record {
    /// Key for full-tuple equality. Coordinates compare bitwise, which is exact
    /// for the finite values admitted at ingestion.
    fn dedup_key(&self) -> (EventId, String, u64, u64) {
        (
            self.event_id.clone(),
            self.location.clone(),
            self.latitude.to_bits(),
            self.longitude.to_bits(),
        )
    }

    /// Text shown for `column` in the table; also what filters match against.
    pub fn cell_text(&self, column: Column) -> String {
        match column {
            Column::EventId => self.event_id.to_string(),
            Column::Location => self.location.clone(),
            Column::Latitude => self.latitude.to_string(),
            Column::Longitude => self.longitude.to_string(),
        }
    }

    pub fn compare_by(&self, other: &Record, column: Column) -> Ordering {
        match column {
            Column::EventId => self.event_id.sort_cmp(&other.event_id),
            Column::Location => self.location.cmp(&other.location),
            Column::Latitude => self.latitude.total_cmp(&other.latitude),
            Column::Longitude => self.longitude.total_cmp(&other.longitude),
        }
    }
}

/// The four columns a record keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Column {
    #[serde(rename = "Event_ID")]
    EventId,
    #[serde(rename = "Location")]
    Location,
    #[serde(rename = "Latitude")]
    Latitude,
    #[serde(rename = "Longitude")]
    Longitude,
}

impl Column {
    pub const ALL: [Column; 4] = [
        Column::EventId,
        Column::Location,
        Column::Latitude,
        Column::Longitude,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            Column::EventId => "Event_ID",
            Column::Location => "Location",
            Column::Latitude => "Latitude",
            Column::Longitude => "Longitude",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Immutable, deduplicated record sequence shared by every session.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Arc<[Record]>,
}

impl Dataset {
    /// Builds a dataset, dropping repeated records after their first occurrence.
    pub fn from_records(records: Vec<Record>) -> Self {
        let mut seen = HashSet::with_capacity(records.len());
        let unique: Vec<Record> = records
            .into_iter()
            .filter(|r| seen.insert(r.dedup_key()))
            .collect();
        Dataset {
            records: unique.into(),
        }
    }

    pub fn all_records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
