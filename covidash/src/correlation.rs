//! Scatter of one metric against another across countries, with an overall linear trend.

use std::collections::BTreeMap;

use itertools::{izip, Itertools};
use log::debug;
use polars::prelude::{DataFrame, DataType, PolarsResult};

use crate::catalog::display_name;
use crate::chart::{
    axis_key, Axis, ColorMap, Figure, Layout, Legend, Line, Marker, Mode, Title, Trace, Values,
    BACKGROUND,
};
use crate::COL;

pub const MARKER_SIZE: u32 = 16;
pub const TRENDLINE_NAME: &str = "Overall Trendline";
const TRENDLINE_COLOR: &str = "#444444";

/// Ordinary least squares fit `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Fits the points. Needs at least two distinct x values.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
        let (covariance, variance) =
            points
                .iter()
                .fold((0.0, 0.0), |(covariance, variance), (x, y)| {
                    let dx = x - mean_x;
                    (covariance + dx * (y - mean_y), variance + dx * dx)
                });
        if variance == 0.0 {
            return None;
        }
        let slope = covariance / variance;
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Title of the correlation figure, e.g. `Population density VS Total cases`.
pub fn title(x_metric: &str, y_metric: &str) -> String {
    format!("{} VS {}", display_name(x_metric), display_name(y_metric))
}

/// Builds the scatter for a cross-sectional table holding `location`, `x_metric` and `y_metric`
/// columns. Countries missing either value are left out of the trend but still listed.
pub fn scatter(table: &DataFrame, x_metric: &str, y_metric: &str) -> PolarsResult<Figure> {
    let xs = table.column(x_metric)?.cast(&DataType::Float64)?;
    let ys = table.column(y_metric)?.cast(&DataType::Float64)?;

    let mut by_location: BTreeMap<&str, (Vec<Option<f64>>, Vec<Option<f64>>)> = BTreeMap::new();
    for (location, x, y) in izip!(table.column(COL::LOCATION)?.str()?, xs.f64()?, ys.f64()?) {
        let Some(location) = location else {
            continue;
        };
        let (location_xs, location_ys) = by_location.entry(location).or_default();
        location_xs.push(x);
        location_ys.push(y);
    }

    let colors = ColorMap::new(by_location.keys().map(|location| location.to_string()));
    let mut data = by_location
        .iter()
        .map(|(location, (x, y))| {
            let mut trace = Trace::new(
                Mode::Markers,
                *location,
                Values::Numbers(x.clone()),
                y.clone(),
            );
            trace.legendgroup = Some(location.to_string());
            trace.marker = Some(Marker {
                color: Some(colors.color(location).to_string()),
                size: Some(MARKER_SIZE),
            });
            trace
        })
        .collect_vec();

    let points = by_location
        .values()
        .flat_map(|(x, y)| x.iter().zip(y))
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .sorted_by(|a, b| a.0.total_cmp(&b.0))
        .collect_vec();
    match LinearFit::fit(&points) {
        Some(fit) => {
            debug!("Trend over {} points: {fit:?}", points.len());
            let mut trend = Trace::new(
                Mode::Lines,
                TRENDLINE_NAME,
                Values::Numbers(points.iter().map(|(x, _)| Some(*x)).collect()),
                points.iter().map(|(x, _)| Some(fit.predict(*x))).collect(),
            );
            trend.line = Some(Line {
                color: Some(TRENDLINE_COLOR.into()),
                ..Default::default()
            });
            data.push(trend);
        }
        None => debug!("Not enough distinct points for a trend line"),
    }

    let mut layout = Layout {
        title: Some(Title {
            text: Some(title(x_metric, y_metric)),
            x: Some(0.5),
            ..Default::default()
        }),
        legend: Some(Legend {
            title: Some(Title {
                text: Some("Country".into()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        plot_bgcolor: Some(BACKGROUND.into()),
        ..Default::default()
    };
    layout.axes.insert(
        axis_key('x', 1),
        Axis {
            title: Some(Title::axis(display_name(x_metric))),
            ..Default::default()
        },
    );
    layout.axes.insert(
        axis_key('y', 1),
        Axis {
            title: Some(Title::axis(display_name(y_metric))),
            ..Default::default()
        },
    );

    Ok(Figure { data, layout })
}
