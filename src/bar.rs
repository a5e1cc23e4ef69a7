use crate::config::{BarConfig, BarOrder};
use crate::types::Record;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarFigure {
    pub data: Vec<BarTrace>,
    pub layout: BarLayout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarTrace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub x: Vec<String>,
    pub y: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarLayout {
    pub bargap: f64,
    pub bargroupgap: f64,
    pub barmode: &'static str,
    pub showlegend: bool,
    /// `select` turns drag into a rectangular brush.
    pub dragmode: &'static str,
    pub xaxis: Axis,
    pub yaxis: Axis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub showgrid: bool,
    pub fixedrange: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nticks: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub showticklabels: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rangemode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zeroline: Option<bool>,
}

impl BarLayout {
    fn grouped() -> Self {
        Self {
            bargap: 0.05,
            bargroupgap: 0.0,
            barmode: "group",
            showlegend: false,
            dragmode: "select",
            xaxis: Axis {
                showgrid: false,
                fixedrange: false,
                nticks: Some(50),
                showticklabels: None,
                rangemode: None,
                zeroline: None,
            },
            yaxis: Axis {
                showgrid: false,
                fixedrange: false,
                nticks: None,
                showticklabels: Some(true),
                rangemode: Some("nonnegative"),
                zeroline: Some(false),
            },
        }
    }
}

/// Counts records per location.
pub fn count_by_location(records: &[Record]) -> Vec<(String, u64)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for record in records {
        let count = counts.entry(record.location.as_str()).or_insert(0);
        if *count == 0 {
            order.push(record.location.clone());
        }
        *count += 1;
    }
    order
        .into_iter()
        .map(|label| {
            let count = counts.get(label.as_str()).copied().unwrap_or(0);
            (label, count)
        })
        .collect()
}

pub fn derive_bar(records: &[Record], config: &BarConfig) -> BarFigure {
    let mut groups = count_by_location(records);

    match config.order {
        BarOrder::FirstSeen => {}
        // Stable, so ties keep first-seen order.
        BarOrder::CountDesc => groups.sort_by(|a, b| b.1.cmp(&a.1)),
        BarOrder::LabelAsc => groups.sort_by(|a, b| a.0.cmp(&b.0)),
    }

    if let Some(max) = config.max_bars {
        groups.truncate(max);
    }

    let (x, y): (Vec<String>, Vec<u64>) = groups.into_iter().unzip();
    BarFigure {
        data: vec![BarTrace {
            kind: "bar",
            name: "Events".to_string(),
            x,
            y,
        }],
        layout: BarLayout::grouped(),
    }
}

impl BarFigure {
    pub fn bar_count(&self) -> usize {
        self.data.iter().map(|t| t.x.len()).sum()
    }

    pub fn total(&self) -> u64 {
        self.data.iter().flat_map(|t| t.y.iter()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::record;

    fn sample() -> Vec<Record> {
        vec![
            record(1, "Queens", 40.7, -73.8),
            record(2, "Bronx", 40.8, -73.9),
            record(3, "Queens", 40.71, -73.81),
            record(4, "Astoria", 40.77, -73.93),
            record(5, "Bronx", 40.81, -73.91),
            record(6, "Queens", 40.72, -73.82),
        ]
    }

    #[test]
    fn test_counts_first_seen_order() {
        let figure = derive_bar(&sample(), &BarConfig::default());
        assert_eq!(figure.data[0].x, vec!["Queens", "Bronx", "Astoria"]);
        assert_eq!(figure.data[0].y, vec![3, 2, 1]);
        assert_eq!(figure.total(), 6);
    }

    #[test]
    fn test_label_order_and_cap() {
        let config = BarConfig {
            order: BarOrder::LabelAsc,
            max_bars: Some(2),
        };
        let figure = derive_bar(&sample(), &config);
        assert_eq!(figure.data[0].x, vec!["Astoria", "Bronx"]);
        assert_eq!(figure.bar_count(), 2);
    }

    #[test]
    fn test_count_desc_keeps_largest() {
        let config = BarConfig {
            order: BarOrder::CountDesc,
            max_bars: Some(1),
        };
        let figure = derive_bar(&sample(), &config);
        assert_eq!(figure.data[0].x, vec!["Queens"]);
        assert_eq!(figure.data[0].y, vec![3]);
    }

    #[test]
    fn test_empty_records() {
        let figure = derive_bar(&[], &BarConfig::default());
        assert_eq!(figure.data.len(), 1);
        assert_eq!(figure.bar_count(), 0);
        assert_eq!(figure.total(), 0);
    }

    #[test]
    fn test_layout_contract() {
        let json = serde_json::to_value(derive_bar(&sample(), &BarConfig::default())).unwrap();
        let layout = &json["layout"];
        assert_eq!(layout["barmode"], "group");
        assert_eq!(layout["bargap"], 0.05);
        assert_eq!(layout["showlegend"], false);
        assert_eq!(layout["dragmode"], "select");
        assert_eq!(layout["xaxis"]["fixedrange"], false);
        assert_eq!(layout["xaxis"]["nticks"], 50);
        assert_eq!(layout["yaxis"]["fixedrange"], false);
        assert_eq!(layout["yaxis"]["rangemode"], "nonnegative");
        assert_eq!(layout["yaxis"]["zeroline"], false);
        assert_eq!(json["data"][0]["type"], "bar");
    }
}
