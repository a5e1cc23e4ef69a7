use crate::config::{Margin, StyleConfig};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Font {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub font: Font,
    pub orientation: &'static str,
}

/// Page-wide look applied to figures that sit next to the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseLayout {
    pub autosize: bool,
    pub height: u32,
    pub font: Font,
    pub titlefont: Font,
    pub margin: Margin,
    pub hovermode: &'static str,
    pub plot_bgcolor: String,
    pub paper_bgcolor: String,
    pub legend: Legend,
}

impl BaseLayout {
    pub fn from_style(style: &StyleConfig) -> Self {
        Self {
            autosize: true,
            height: style.height,
            font: Font {
                color: Some(style.font_color.clone()),
                size: None,
            },
            titlefont: Font {
                color: Some(style.font_color.clone()),
                size: Some(style.title_font_size),
            },
            margin: style.margin,
            hovermode: "closest",
            plot_bgcolor: style.background.clone(),
            paper_bgcolor: style.background.clone(),
            legend: Legend {
                font: Font {
                    color: None,
                    size: Some(style.legend_font_size),
                },
                orientation: "h",
            },
        }
    }
}
