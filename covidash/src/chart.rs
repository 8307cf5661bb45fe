//! Declarative chart descriptions handed to the renderer. The structures serialize to the figure
//! JSON understood by Plotly.js.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

/// Plotly's default qualitative colour sequence.
pub const PALETTE: [&str; 10] = [
    "#636efa", "#EF553B", "#00cc96", "#ab63fa", "#FFA15A", "#19d3f3", "#FF6692", "#B6E880",
    "#FF97FF", "#FECB52",
];

pub const BACKGROUND: &str = "white";
pub const AXIS_TITLE_SIZE: u32 = 16;
pub const AXIS_TITLE_STANDOFF: u32 = 25;

/// Assigns each country a stable colour so that it looks the same in every panel.
#[derive(Debug, Clone, Default)]
pub struct ColorMap(BTreeMap<String, &'static str>);

impl ColorMap {
    /// Colours are handed out in alphabetical order of the country names.
    pub fn new<I: IntoIterator<Item = String>>(locations: I) -> Self {
        let mut locations: Vec<String> = locations.into_iter().collect();
        locations.sort();
        locations.dedup();
        Self(
            locations
                .into_iter()
                .enumerate()
                .map(|(idx, location)| (location, PALETTE[idx % PALETTE.len()]))
                .collect(),
        )
    }

    pub fn color(&self, location: &str) -> &'static str {
        self.0.get(location).copied().unwrap_or(PALETTE[0])
    }
}

/// Axis reference used by traces, e.g. `x`, `x2`.
pub fn axis_ref(axis: char, index: usize) -> String {
    if index <= 1 {
        axis.to_string()
    } else {
        format!("{axis}{index}")
    }
}

/// Layout key of an axis, e.g. `yaxis`, `yaxis2`.
pub fn axis_key(axis: char, index: usize) -> String {
    if index <= 1 {
        format!("{axis}axis")
    } else {
        format!("{axis}axis{index}")
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraceType {
    #[default]
    Scatter,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Lines,
    Markers,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Values {
    Dates(Vec<NaiveDate>),
    Numbers(Vec<Option<f64>>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Values::Dates(values) => values.len(),
            Values::Numbers(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: TraceType,
    pub mode: Mode,
    pub name: String,
    pub x: Values,
    pub y: Vec<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xaxis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legendgroup: Option<String>,
    pub showlegend: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<Marker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<Line>,
}

impl Trace {
    pub fn new(mode: Mode, name: impl Into<String>, x: Values, y: Vec<Option<f64>>) -> Self {
        Self {
            kind: TraceType::Scatter,
            mode,
            name: name.into(),
            x,
            y,
            xaxis: None,
            yaxis: None,
            legendgroup: None,
            showlegend: true,
            marker: None,
            line: None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Marker {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Line {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Font {
    pub size: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Title {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<Font>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standoff: Option<u32>,
}

impl Title {
    /// An axis title in the dashboard's style.
    pub fn axis(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            font: Some(Font {
                size: AXIS_TITLE_SIZE,
            }),
            standoff: Some(AXIS_TITLE_STANDOFF),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Axis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Legend {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceorder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracegroupgap: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groupclick: Option<String>,
}

/// Free text positioned on the figure, used for panel titles.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Annotation {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub xref: String,
    pub yref: String,
    pub xanchor: String,
    pub yanchor: String,
    pub showarrow: bool,
    pub font: Font,
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct Layout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<Legend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_bgcolor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot_bgcolor: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    /// `xaxis`, `yaxis`, `xaxis2`, ... keyed by their layout name.
    #[serde(flatten)]
    pub axes: BTreeMap<String, Axis>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn axis_names_follow_subplot_convention() {
        assert_eq!(axis_ref('x', 1), "x");
        assert_eq!(axis_ref('y', 3), "y3");
        assert_eq!(axis_key('x', 1), "xaxis");
        assert_eq!(axis_key('y', 2), "yaxis2");
    }

    #[test]
    fn colors_are_assigned_alphabetically() {
        let colors = ColorMap::new(["Peru", "Chile", "Peru"].map(String::from));
        assert_eq!(colors.color("Chile"), PALETTE[0]);
        assert_eq!(colors.color("Peru"), PALETTE[1]);
    }

    #[test]
    fn figure_serializes_to_plotly_json() -> anyhow::Result<()> {
        let mut trace = Trace::new(
            Mode::Lines,
            "Chile",
            Values::Dates(vec![NaiveDate::from_ymd_opt(2021, 3, 1).unwrap()]),
            vec![Some(1.5)],
        );
        trace.yaxis = Some(axis_ref('y', 2));
        let mut layout = Layout {
            height: Some(500),
            ..Default::default()
        };
        layout.axes.insert(
            axis_key('y', 2),
            Axis {
                title: Some(Title::axis("New cases")),
                ..Default::default()
            },
        );
        let figure = Figure {
            data: vec![trace],
            layout,
        };
        assert_eq!(
            serde_json::to_value(&figure)?,
            json!({
                "data": [{
                    "type": "scatter",
                    "mode": "lines",
                    "name": "Chile",
                    "x": ["2021-03-01"],
                    "y": [1.5],
                    "yaxis": "y2",
                    "showlegend": true
                }],
                "layout": {
                    "height": 500,
                    "yaxis2": {"title": {"text": "New cases", "font": {"size": 16}, "standoff": 25}}
                }
            })
        );
        Ok(())
    }
}
