use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

/// Everything except `[input].source` has a default, so a minimal file is
///
/// ```toml
/// [input]
/// source = "data/SELocations.csv"
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub bar: BarConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// `http(s)://` URL or local CSV path.
    pub source: String,
    #[serde(default)]
    pub columns: ColumnNames,
    #[serde(default)]
    pub on_invalid_row: InvalidRowPolicy,
}

/// CSV header names for the four kept columns.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ColumnNames {
    pub event_id: String,
    pub location: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            event_id: "Event_ID".to_string(),
            location: "Location".to_string(),
            latitude: "Latitude".to_string(),
            longitude: "Longitude".to_string(),
        }
    }
}

impl ColumnNames {
    /// In record field order: id, location, latitude, longitude.
    pub fn as_list(&self) -> [&str; 4] {
        [&self.event_id, &self.location, &self.latitude, &self.longitude]
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvalidRowPolicy {
    #[default]
    Skip,
    Fail,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PageConfig {
    pub browser_title: String,
    pub heading: String,
    pub description: String,
    pub stylesheet: Option<String>,
    pub footer: Option<String>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            browser_title: "NYC Wi-Fi Hotspots".to_string(),
            heading: "Maps and Tables".to_string(),
            description: "Working with tables and maps.".to_string(),
            stylesheet: Some("https://codepen.io/amyoshino/pen/jzXypZ.css".to_string()),
            footer: None,
        }
    }
}

/// Figure styling shared by the map and the table panel.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StyleConfig {
    pub height: u32,
    pub font_color: String,
    pub title_font_size: u32,
    pub background: String,
    pub legend_font_size: u32,
    pub margin: Margin,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            height: 500,
            font_color: "#191A1A".to_string(),
            title_font_size: 14,
            background: "#fffcfc".to_string(),
            legend_font_size: 10,
            margin: Margin::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Margin {
    pub l: u32,
    pub r: u32,
    pub b: u32,
    pub t: u32,
}

impl Default for Margin {
    fn default() -> Self {
        Self { l: 35, r: 35, b: 35, t: 45 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub title: String,
    /// Mapbox style name. Mapbox-hosted styles such as `light` need
    /// `access_token`; `open-street-map` does not.
    pub style: String,
    pub access_token: Option<String>,
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: f64,
    pub marker_size: f64,
    pub marker_opacity: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            title: "WiFi Hotspots in NYC".to_string(),
            style: "light".to_string(),
            access_token: None,
            center_lat: 40.7342,
            center_lon: -73.91251,
            zoom: 10.0,
            marker_size: 6.0,
            marker_opacity: 0.7,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BarConfig {
    pub order: BarOrder,
    pub max_bars: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BarOrder {
    /// Locations in the order they first appear among the effective records.
    #[default]
    FirstSeen,
    CountDesc,
    LabelAsc,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SelectionConfig {
    pub out_of_range: OutOfRangePolicy,
}

/// What to show when every selected index is stale.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    /// Drop the stale indices; nothing valid left means nothing shown.
    #[default]
    Discard,
    /// Drop the stale indices; nothing valid left means show every visible row.
    ShowAll,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub session_ttl_secs: u64,
    /// Extra directory served under `/static`.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8050,
            session_ttl_secs: 30 * 60,
            static_dir: None,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Defaults around a bare source, for `--source` without a config file.
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            input: InputConfig {
                source: source.into(),
                columns: ColumnNames::default(),
                on_invalid_row: InvalidRowPolicy::default(),
            },
            page: PageConfig::default(),
            style: StyleConfig::default(),
            map: MapConfig::default(),
            bar: BarConfig::default(),
            selection: SelectionConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml("[input]\nsource = \"events.csv\"\n").unwrap();
        assert_eq!(config.input.source, "events.csv");
        assert_eq!(config.input.columns.latitude, "Latitude");
        assert_eq!(config.input.on_invalid_row, InvalidRowPolicy::Skip);
        assert_eq!(config.map.marker_size, 6.0);
        assert_eq!(config.map.marker_opacity, 0.7);
        assert_eq!(config.map.zoom, 10.0);
        assert_eq!(config.style.margin, Margin { l: 35, r: 35, b: 35, t: 45 });
        assert_eq!(config.selection.out_of_range, OutOfRangePolicy::Discard);
        assert_eq!(config.server.port, 8050);
    }

    #[test]
    fn test_overrides() {
        let toml = r#"
            [input]
            source = "https://example.com/events.csv"
            on_invalid_row = "fail"

            [input.columns]
            event_id = "id"

            [bar]
            order = "count_desc"
            max_bars = 5

            [selection]
            out_of_range = "show_all"

            [server]
            port = 9000
        "#;
        let config = AppConfig::from_toml(toml).unwrap();
        assert_eq!(config.input.on_invalid_row, InvalidRowPolicy::Fail);
        assert_eq!(config.input.columns.as_list(), ["id", "Location", "Latitude", "Longitude"]);
        assert_eq!(config.bar.order, BarOrder::CountDesc);
        assert_eq!(config.bar.max_bars, Some(5));
        assert_eq!(config.selection.out_of_range, OutOfRangePolicy::ShowAll);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_missing_source_is_rejected() {
        assert!(AppConfig::from_toml("[server]\nport = 1\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[input]\nsource = \"x.csv\"").unwrap();
        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.input.source, "x.csv");
    }
}
