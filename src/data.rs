use crate::config::{InputConfig, InvalidRowPolicy};
use crate::error::{DashboardError, DashboardResult};
use crate::types::{Dataset, EventId, Record};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::io::Read;
use tracing::{debug, info, warn};

/// Raw CSV contents before typing. Cells stay as text so projection and
/// duplicate removal work on exactly what the file says.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// 1-based line in the source, for error messages.
    pub line: u64,
    pub cells: Vec<String>,
}

impl Table {
    pub fn parse<R: Read>(reader: R) -> csv::Result<Table> {
        let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            rows.push(Row {
                line,
                cells: record.iter().map(|c| c.trim().to_string()).collect(),
            });
        }
        Ok(Table { headers, rows })
    }

    /// Keeps only `columns` (in that order) and drops exact-duplicate rows,
    /// keeping the first occurrence.
    pub fn project(&self, columns: &[&str]) -> Result<Table, String> {
        let indices = columns
            .iter()
            .map(|name| {
                self.headers
                    .iter()
                    .position(|h| h == name)
                    .ok_or_else(|| format!("column '{}' not found", name))
            })
            .collect::<Result<Vec<usize>, String>>()?;

        let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(self.rows.len());
        let mut rows = Vec::new();
        for row in &self.rows {
            let cells: Vec<String> = indices
                .iter()
                .map(|&i| row.cells.get(i).cloned().unwrap_or_default())
                .collect();
            if seen.insert(cells.clone()) {
                rows.push(Row { line: row.line, cells });
            }
        }

        Ok(Table {
            headers: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }
}

/// Outcome of turning a table into records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub rows_skipped: usize,
    pub duplicates_removed: usize,
}

/// Fetches and parses the configured source into a [`Dataset`].
pub async fn load(input: &InputConfig) -> DashboardResult<(Dataset, LoadReport)> {
    info!(source = %input.source, "Loading dataset");
    let bytes = fetch(&input.source).await?;
    let table = Table::parse(bytes.as_slice())
        .map_err(|e| DashboardError::data_unavailable(&input.source, e))?;
    let (dataset, report) = build_dataset(&input.source, &table, input)?;
    info!(
        records = dataset.len(),
        skipped = report.rows_skipped,
        duplicates = report.duplicates_removed,
        "Dataset loaded"
    );
    Ok((dataset, report))
}

async fn fetch(source: &str) -> DashboardResult<Vec<u8>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        debug!(url = source, "Fetching remote CSV");
        let response = reqwest::get(source)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DashboardError::data_unavailable(source, e))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| DashboardError::data_unavailable(source, e))?;
        Ok(body.to_vec())
    } else {
        tokio::fs::read(source)
            .await
            .map_err(|e| DashboardError::data_unavailable(source, e))
    }
}

/// Projects `table` onto the configured columns and validates each row.
pub fn build_dataset(
    source: &str,
    table: &Table,
    input: &InputConfig,
) -> DashboardResult<(Dataset, LoadReport)> {
    let projected = table
        .project(&input.columns.as_list())
        .map_err(|e| DashboardError::data_unavailable(source, e))?;

    let mut report = LoadReport {
        rows_read: table.rows.len(),
        duplicates_removed: table.rows.len() - projected.rows.len(),
        ..LoadReport::default()
    };

    let mut records = Vec::with_capacity(projected.rows.len());
    for row in &projected.rows {
        match parse_row(row) {
            Ok(record) => records.push(record),
            Err(reason) => match input.on_invalid_row {
                InvalidRowPolicy::Fail => {
                    return Err(DashboardError::InvalidRow { line: row.line, reason });
                }
                InvalidRowPolicy::Skip => {
                    warn!(line = row.line, %reason, "Skipping invalid row");
                    report.rows_skipped += 1;
                }
            },
        }
    }

    let parsed = records.len();
    let dataset = Dataset::from_records(records);
    // Rows that differ only in number formatting collapse here.
    report.duplicates_removed += parsed - dataset.len();
    report.rows_kept = dataset.len();
    Ok((dataset, report))
}

fn parse_row(row: &Row) -> Result<Record, String> {
    let [id, location, lat, lon] = row.cells.as_slice() else {
        return Err(format!("expected 4 cells, found {}", row.cells.len()));
    };
    if id.is_empty() {
        return Err("missing event id".to_string());
    }
    let latitude = parse_coordinate(lat, "latitude", 90.0)?;
    let longitude = parse_coordinate(lon, "longitude", 180.0)?;
    Ok(Record {
        event_id: EventId::parse(id),
        location: location.clone(),
        latitude,
        longitude,
    })
}

fn parse_coordinate(raw: &str, name: &str, limit: f64) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("{} '{}' is not a number", name, raw))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(format!("{} {} outside [-{}, {}]", name, value, limit, limit));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use proptest::prelude::*;
    use std::io::Write;

    const SAMPLE: &str = "\
Event_ID,Location,Latitude,Longitude,Begin_Date
1,A,40.70,-73.99,2017-01-01
2,B,40.75,-73.98,2017-01-02
1,A,40.70,-73.99,2017-03-04
3,C,not-a-number,-73.90,2017-01-05
4,D,95.0,-73.90,2017-01-05
5,E,40.7,-73.99,2017-01-06
";

    fn input() -> InputConfig {
        AppConfig::with_source("sample.csv").input
    }

    #[test]
    fn test_project_keeps_columns_and_drops_duplicates() {
        let table = Table::parse(SAMPLE.as_bytes()).unwrap();
        let projected = table.project(&["Event_ID", "Location"]).unwrap();
        assert_eq!(projected.headers, vec!["Event_ID", "Location"]);
        let ids: Vec<&str> = projected.rows.iter().map(|r| r.cells[0].as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_project_missing_column() {
        let table = Table::parse(SAMPLE.as_bytes()).unwrap();
        let err = table.project(&["Event_ID", "Magnitude"]).unwrap_err();
        assert!(err.contains("Magnitude"));
    }

    #[test]
    fn test_build_dataset_skips_invalid_rows() {
        let table = Table::parse(SAMPLE.as_bytes()).unwrap();
        let (dataset, report) = build_dataset("sample.csv", &table, &input()).unwrap();
        let ids: Vec<String> = dataset.all_records().iter().map(|r| r.event_id.to_string()).collect();
        assert_eq!(ids, vec!["1", "2", "5"]);
        assert_eq!(report.rows_read, 6);
        assert_eq!(report.rows_skipped, 2);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.rows_kept, 3);
    }

    #[test]
    fn test_build_dataset_fail_policy() {
        let table = Table::parse(SAMPLE.as_bytes()).unwrap();
        let mut input = input();
        input.on_invalid_row = InvalidRowPolicy::Fail;
        let err = build_dataset("sample.csv", &table, &input).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidRow { line: 5, .. }));
    }

    #[test]
    fn test_typed_duplicates_collapse() {
        let csv = "Event_ID,Location,Latitude,Longitude\n1,A,40.70,-73.99\n1,A,40.7,-73.990\n";
        let table = Table::parse(csv.as_bytes()).unwrap();
        let (dataset, report) = build_dataset("t.csv", &table, &input()).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(report.duplicates_removed, 1);
    }

    #[test]
    fn test_missing_required_column_is_unavailable() {
        let csv = "Event_ID,Location,Latitude\n1,A,40.7\n";
        let table = Table::parse(csv.as_bytes()).unwrap();
        let err = build_dataset("t.csv", &table, &input()).unwrap_err();
        assert!(matches!(err, DashboardError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let input = AppConfig::with_source(file.path().to_string_lossy()).input;
        let (dataset, _) = load(&input).await.unwrap();
        assert_eq!(dataset.len(), 3);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let input = AppConfig::with_source("/definitely/not/here.csv").input;
        let err = load(&input).await.unwrap_err();
        assert!(matches!(err, DashboardError::DataUnavailable { .. }));
    }

    proptest! {
        #[test]
        fn prop_project_is_idempotent(
            rows in prop::collection::vec(prop::collection::vec("[a-c]{0,2}", 3), 0..30)
        ) {
            let table = Table {
                headers: vec!["x".into(), "y".into(), "z".into()],
                rows: rows
                    .into_iter()
                    .enumerate()
                    .map(|(i, cells)| Row { line: i as u64 + 2, cells })
                    .collect(),
            };
            let once = table.project(&["z", "x"]).unwrap();
            let twice = once.project(&["z", "x"]).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
