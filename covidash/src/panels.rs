//! Builds one line chart per metric and stacks them into a single multi-panel figure.

use log::debug;
use nonempty::NonEmpty;
use polars::prelude::PolarsResult;

use crate::catalog::display_name;
use crate::chart::{
    axis_key, axis_ref, Annotation, Axis, ColorMap, Figure, Font, Layout, Legend, Line, Mode,
    Title, Trace, Values, AXIS_TITLE_SIZE, BACKGROUND,
};
use crate::smoothing::WideTable;

/// Height of a figure holding a single panel.
pub const PANEL_HEIGHT: u32 = 500;
/// Taken off the height of stacked figures, which share their outer margins.
const STACKED_MARGIN: u32 = 180;
/// Fraction of the figure shared out as spacing between panels.
const SPACING_SHARE: f64 = 0.2;
/// Fraction of each panel's height not available to its legend group.
const LEGEND_MARGIN_SHARE: f64 = 0.05;
/// Height of one legend entry.
const LEGEND_ENTRY_HEIGHT: f64 = 18.0;

/// Total height of a figure with `panel_count` panels.
pub fn figure_height(panel_count: usize) -> u32 {
    if panel_count == 1 {
        PANEL_HEIGHT
    } else {
        panel_count as u32 * PANEL_HEIGHT - STACKED_MARGIN
    }
}

/// Vertical gap between consecutive panels, as a fraction of the figure height.
pub fn vertical_spacing(panel_count: usize) -> f64 {
    SPACING_SHARE / panel_count as f64
}

/// Gap between legend groups so that each group of `country_count` entries lines up with its
/// panel. Rounds half to even and never goes below zero.
pub fn legend_group_gap(panel_count: usize, country_count: usize, total_height: u32) -> u32 {
    let per_panel = total_height as f64 / panel_count as f64;
    let gap =
        per_panel - LEGEND_MARGIN_SHARE * per_panel - country_count as f64 * LEGEND_ENTRY_HEIGHT;
    gap.round_ties_even().max(0.0) as u32
}

/// Vertical extent of each panel, top panel first, in figure coordinates.
pub fn panel_domains(panel_count: usize, spacing: f64) -> Vec<[f64; 2]> {
    let height = (1.0 - spacing * (panel_count as f64 - 1.0)) / panel_count as f64;
    (0..panel_count)
        .map(|row| {
            let top = 1.0 - row as f64 * (height + spacing);
            [(top - height).max(0.0), top]
        })
        .collect()
}

/// A single-metric line chart: one series per country, dates on x.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub metric: String,
    pub title: String,
    pub traces: Vec<Trace>,
}

pub fn line_chart(table: &WideTable, metric: &str, colors: &ColorMap) -> PolarsResult<Panel> {
    let traces = table
        .series(metric)?
        .into_iter()
        .map(|series| {
            let mut trace = Trace::new(
                Mode::Lines,
                series.location.as_str(),
                Values::Dates(series.dates),
                series.values,
            );
            trace.line = Some(Line {
                color: Some(colors.color(&series.location).to_string()),
                ..Default::default()
            });
            trace
        })
        .collect();
    Ok(Panel {
        metric: metric.to_string(),
        title: display_name(metric),
        traces,
    })
}

/// Stacks the panels vertically in order. Traces of panel `i` (counting from one) are placed on
/// axes `x{i}`/`y{i}` and put in legend group `i`.
pub fn stack(panels: NonEmpty<Panel>, country_count: usize) -> Figure {
    let panel_count = panels.len();
    let height = figure_height(panel_count);
    let domains = panel_domains(panel_count, vertical_spacing(panel_count));
    debug!("Stacking {panel_count} panels into a figure of height {height}");

    let mut layout = Layout {
        title: Some(Title {
            x: Some(0.5),
            ..Default::default()
        }),
        height: Some(height),
        legend: Some(Legend {
            traceorder: Some("grouped".into()),
            tracegroupgap: Some(legend_group_gap(panel_count, country_count, height)),
            groupclick: Some("toggleitem".into()),
            ..Default::default()
        }),
        paper_bgcolor: Some(BACKGROUND.into()),
        plot_bgcolor: Some(BACKGROUND.into()),
        ..Default::default()
    };
    let mut data = vec![];

    for (idx, (panel, domain)) in panels.into_iter().zip(domains).enumerate() {
        let idx = idx + 1;
        for mut trace in panel.traces {
            trace.legendgroup = Some(idx.to_string());
            trace.xaxis = Some(axis_ref('x', idx));
            trace.yaxis = Some(axis_ref('y', idx));
            data.push(trace);
        }
        layout.axes.insert(
            axis_key('x', idx),
            Axis {
                anchor: Some(axis_ref('y', idx)),
                domain: Some([0.0, 1.0]),
                ..Default::default()
            },
        );
        layout.axes.insert(
            axis_key('y', idx),
            Axis {
                anchor: Some(axis_ref('x', idx)),
                domain: Some(domain),
                title: Some(Title::axis(panel.title.clone())),
            },
        );
        layout.annotations.push(Annotation {
            text: panel.title,
            x: 0.5,
            y: domain[1],
            xref: "paper".into(),
            yref: "paper".into(),
            xanchor: "center".into(),
            yanchor: "bottom".into(),
            showarrow: false,
            font: Font {
                size: AXIS_TITLE_SIZE,
            },
        });
    }

    Figure { data, layout }
}

/// The multi-panel time-series figure for `metrics`, in the given order.
pub fn compose(
    table: &WideTable,
    metrics: &NonEmpty<String>,
    country_count: usize,
) -> PolarsResult<Figure> {
    let colors = ColorMap::new(table.locations()?);
    let panels = NonEmpty {
        head: line_chart(table, &metrics.head, &colors)?,
        tail: metrics
            .tail
            .iter()
            .map(|metric| line_chart(table, metric, &colors))
            .collect::<PolarsResult<Vec<_>>>()?,
    };
    Ok(stack(panels, country_count))
}
