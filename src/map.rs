use crate::config::{MapConfig, StyleConfig};
use crate::figure::BaseLayout;
use crate::types::Record;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapFigure {
    pub data: Vec<ScatterMapTrace>,
    pub layout: MapLayout,
}

/// Marker coordinates and labels are parallel arrays, as Plotly expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterMapTrace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub mode: &'static str,
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub hoverinfo: &'static str,
    pub hovertext: Vec<String>,
    /// Per-marker label: the record's location.
    pub text: Vec<String>,
    pub name: String,
    pub marker: MarkerStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarkerStyle {
    pub size: f64,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayout {
    #[serde(flatten)]
    pub base: BaseLayout,
    pub title: String,
    pub mapbox: Mapbox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mapbox {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accesstoken: Option<String>,
    pub style: String,
    pub center: Center,
    pub zoom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Center {
    pub lon: f64,
    pub lat: f64,
}

/// A single marker as read back from a figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker<'a> {
    pub lat: f64,
    pub lon: f64,
    pub hovertext: &'a str,
    pub label: &'a str,
}

pub fn hover_text(record: &Record) -> String {
    format!("Event_ID: {}", record.event_id)
}

/// Builds the map figure for `records`. An empty slice gives a figure with an
/// empty trace.
pub fn derive_map(records: &[Record], map: &MapConfig, style: &StyleConfig) -> MapFigure {
    let trace = ScatterMapTrace {
        kind: "scattermapbox",
        mode: "markers",
        lat: records.iter().map(|r| r.latitude).collect(),
        lon: records.iter().map(|r| r.longitude).collect(),
        hoverinfo: "text",
        hovertext: records.iter().map(hover_text).collect(),
        text: records.iter().map(|r| r.location.clone()).collect(),
        name: "Events".to_string(),
        marker: MarkerStyle {
            size: map.marker_size,
            opacity: map.marker_opacity,
        },
    };

    MapFigure {
        data: vec![trace],
        layout: MapLayout {
            base: BaseLayout::from_style(style),
            title: map.title.clone(),
            mapbox: Mapbox {
                accesstoken: map.access_token.clone(),
                style: map.style.clone(),
                center: Center {
                    lon: map.center_lon,
                    lat: map.center_lat,
                },
                zoom: map.zoom,
            },
        },
    }
}

impl MapFigure {
    pub fn marker_count(&self) -> usize {
        self.data.iter().map(|t| t.lat.len()).sum()
    }

    pub fn markers(&self) -> impl Iterator<Item = Marker<'_>> {
        self.data.iter().flat_map(|t| {
            t.lat
                .iter()
                .zip(&t.lon)
                .zip(&t.hovertext)
                .zip(&t.text)
                .map(|(((lat, lon), hovertext), label)| Marker {
                    lat: *lat,
                    lon: *lon,
                    hovertext,
                    label,
                })
        })
    }
}
