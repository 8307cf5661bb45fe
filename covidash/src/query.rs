//! Turns the user's selections into fully specified requests against the data source.
//!
//! A request can only be built from a complete selection: empty country or metric sets produce
//! `Update::Skipped` and no request is ever issued for them.

use std::fmt::Display;

use chrono::{Duration, NaiveDate};
use itertools::Itertools;
use log::debug;
use nonempty::NonEmpty;
use polars::lazy::dsl::{col, lit, Expr};
use polars::prelude::{NamedFrom, Series};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::CovidashResult;
use crate::source::Table;
use crate::COL;

/// Countries pre-selected in both country selectors.
pub const DEFAULT_COUNTRIES: [i64; 5] = [38, 52, 71, 158, 201];

/// Metrics pre-selected in the time-series selector.
pub const DEFAULT_METRICS: [&str; 2] = [COL::NEW_CASES_PER_MILLION, COL::NEW_DEATHS_PER_MILLION];

/// Number of days the cross-sectional view lags behind today, so that it never reads a date
/// whose reporting is still incomplete.
pub const CROSS_SECTION_LAG_DAYS: i64 = 2;

/// Outcome of a pipeline run: either a new result, or a signal that the previous chart should be
/// kept because the selection was incomplete.
#[derive(Debug, Clone, PartialEq)]
pub enum Update<T> {
    Skipped,
    Ready(T),
}

impl<T> Update<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Update::Skipped)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Update::Ready(value) => Some(value),
            Update::Skipped => None,
        }
    }
}

/// Selection made in the time-series controls.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimeSeriesSelection {
    pub countries: Vec<i64>,
    pub metrics: Vec<String>,
}

impl Default for TimeSeriesSelection {
    fn default() -> Self {
        Self {
            countries: DEFAULT_COUNTRIES.to_vec(),
            metrics: DEFAULT_METRICS.map(String::from).to_vec(),
        }
    }
}

/// Selection made in the correlation controls. The metric selectors are multi-valued widgets but
/// only their first value is used.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CorrelationSelection {
    pub countries: Vec<i64>,
    pub select_all: bool,
    pub x_metrics: Vec<String>,
    pub y_metrics: Vec<String>,
}

impl Default for CorrelationSelection {
    fn default() -> Self {
        Self {
            countries: DEFAULT_COUNTRIES.to_vec(),
            select_all: false,
            x_metrics: vec![],
            y_metrics: vec![],
        }
    }
}

impl CorrelationSelection {
    /// Countries the view should cover: every known country when "select all" is set, otherwise
    /// the manual selection.
    pub fn effective_countries(&self, catalog: &Catalog) -> Vec<i64> {
        if self.select_all {
            catalog.all_country_ids()
        } else {
            self.countries.iter().copied().unique().collect()
        }
    }

    /// Whether the manual country selector should be disabled.
    pub fn selector_disabled(&self) -> bool {
        self.select_all
    }
}

/// Observations are kept strictly between these two dates.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateBound {
    pub after: NaiveDate,
    pub before: NaiveDate,
}

impl DateBound {
    /// Everything reported since the start of 2020, excluding `today`.
    pub fn until(today: NaiveDate) -> Self {
        Self {
            // Unwrap: constant date is valid
            after: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            before: today,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimeSeriesRequest {
    pub country_ids: NonEmpty<i64>,
    pub metrics: NonEmpty<String>,
    pub dates: DateBound,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CrossSectionRequest {
    pub country_ids: NonEmpty<i64>,
    pub x_metric: String,
    pub y_metric: String,
    pub date: NaiveDate,
}

fn dedup_nonempty<T: Clone + Eq + std::hash::Hash>(values: &[T]) -> Option<NonEmpty<T>> {
    NonEmpty::from_vec(values.iter().cloned().unique().collect())
}

impl TimeSeriesRequest {
    /// Builds the request for a time-series selection observed on `today`.
    pub fn from_selection(
        selection: &TimeSeriesSelection,
        catalog: &Catalog,
        today: NaiveDate,
    ) -> CovidashResult<Update<Self>> {
        let (Some(country_ids), Some(metrics)) = (
            dedup_nonempty(&selection.countries),
            dedup_nonempty(&selection.metrics),
        ) else {
            debug!("Incomplete time-series selection: {selection:?}");
            return Ok(Update::Skipped);
        };
        for metric in metrics.iter() {
            catalog.check_time_series_metric(metric)?;
        }
        Ok(Update::Ready(Self {
            country_ids,
            metrics,
            dates: DateBound::until(today),
        }))
    }

    /// Parameterized form of the request against the relational store.
    pub fn to_sql(&self) -> SqlQuery {
        let mut columns = vec![
            format!("{}.\"{}\" AS \"{}\"", Table::DimTime, COL::DIM_DATE, COL::DATE),
            format!("{}.\"{}\"", Table::DimCountry, COL::ISO_CODE),
            format!("{}.\"{}\"", Table::DimCountry, COL::LOCATION),
        ];
        columns.extend(self.metrics.iter().map(|metric| qualified(metric)));
        let text = format!(
            "SELECT {}\n{}\nWHERE {}.\"{}\" IN (:country_ids) AND {}.\"{}\" > :after AND {}.\"{}\" < :before\nORDER BY {}.\"{}\", {}.\"{}\"",
            columns.join(", "),
            JOINS,
            Table::DimCountry,
            COL::ID_COUNTRY,
            Table::DimTime,
            COL::DIM_DATE,
            Table::DimTime,
            COL::DIM_DATE,
            Table::DimTime,
            COL::DIM_DATE,
            Table::DimCountry,
            COL::ID_COUNTRY,
        );
        SqlQuery {
            text,
            params: vec![
                (
                    "country_ids".into(),
                    SqlParam::IntegerList(self.country_ids.iter().copied().collect()),
                ),
                ("after".into(), SqlParam::Date(self.dates.after)),
                ("before".into(), SqlParam::Date(self.dates.before)),
            ],
        }
    }
}

impl CrossSectionRequest {
    /// Builds the request for a correlation selection observed on `today`.
    pub fn from_selection(
        selection: &CorrelationSelection,
        catalog: &Catalog,
        today: NaiveDate,
    ) -> CovidashResult<Update<Self>> {
        let countries = selection.effective_countries(catalog);
        let (Some(country_ids), Some(x_metric), Some(y_metric)) = (
            NonEmpty::from_vec(countries),
            selection.x_metrics.first(),
            selection.y_metrics.first(),
        ) else {
            debug!("Incomplete correlation selection: {selection:?}");
            return Ok(Update::Skipped);
        };
        catalog.check_correlation_axis(x_metric)?;
        catalog.check_correlation_axis(y_metric)?;
        Ok(Update::Ready(Self {
            country_ids,
            x_metric: x_metric.clone(),
            y_metric: y_metric.clone(),
            date: today - Duration::days(CROSS_SECTION_LAG_DAYS),
        }))
    }

    /// The distinct value columns the view needs.
    pub fn value_columns(&self) -> Vec<&str> {
        [self.x_metric.as_str(), self.y_metric.as_str()]
            .into_iter()
            .unique()
            .collect()
    }

    /// Parameterized form of the request against the relational store.
    pub fn to_sql(&self) -> SqlQuery {
        let mut columns = vec![
            format!("{}.\"{}\" AS \"{}\"", Table::DimTime, COL::DIM_DATE, COL::DATE),
            format!("{}.\"{}\"", Table::DimCountry, COL::ISO_CODE),
            format!("{}.\"{}\"", Table::DimCountry, COL::LOCATION),
        ];
        columns.extend(self.value_columns().into_iter().map(qualified));
        let text = format!(
            "SELECT {}\n{}\nWHERE {}.\"{}\" = :date AND {}.\"{}\" IN (:country_ids)",
            columns.join(", "),
            JOINS,
            Table::DimTime,
            COL::DIM_DATE,
            Table::DimCountry,
            COL::ID_COUNTRY,
        );
        SqlQuery {
            text,
            params: vec![
                ("date".into(), SqlParam::Date(self.date)),
                (
                    "country_ids".into(),
                    SqlParam::IntegerList(self.country_ids.iter().copied().collect()),
                ),
            ],
        }
    }
}

const JOINS: &str = "FROM Dim_time\n\
    INNER JOIN Deaths ON Deaths.\"ID_Date\" = Dim_time.\"ID_Date\"\n\
    INNER JOIN Cases ON Cases.\"ID_Date\" = Deaths.\"ID_Date\" AND Cases.\"ID_Country\" = Deaths.\"ID_Country\"\n\
    INNER JOIN Tests ON Tests.\"ID_Date\" = Deaths.\"ID_Date\" AND Tests.\"ID_Country\" = Deaths.\"ID_Country\"\n\
    INNER JOIN Dim_country ON Dim_country.\"ID_Country\" = Deaths.\"ID_Country\"";

fn qualified(column: &str) -> String {
    format!("{}.\"{column}\"", Table::for_column(column))
}

/// Filters the joined tables down to the rows a time-series request asks for.
impl From<&TimeSeriesRequest> for Expr {
    fn from(request: &TimeSeriesRequest) -> Self {
        country_filter(&request.country_ids)
            .and(col(COL::DATE).gt(lit(request.dates.after)))
            .and(col(COL::DATE).lt(lit(request.dates.before)))
    }
}

/// Filters the joined tables down to the rows a cross-sectional request asks for.
impl From<&CrossSectionRequest> for Expr {
    fn from(request: &CrossSectionRequest) -> Self {
        col(COL::DATE)
            .eq(lit(request.date))
            .and(country_filter(&request.country_ids))
    }
}

fn country_filter(country_ids: &NonEmpty<i64>) -> Expr {
    let ids = Series::new("country_ids", country_ids.iter().copied().collect_vec());
    col(COL::ID_COUNTRY).is_in(lit(ids))
}

/// A value bound to a named placeholder.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum SqlParam {
    IntegerList(Vec<i64>),
    Date(NaiveDate),
}

impl Display for SqlParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlParam::IntegerList(values) => write!(f, "[{}]", values.iter().join(", ")),
            SqlParam::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// Query text with `:name` placeholders together with the values bound to them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub text: String,
    pub params: Vec<(String, SqlParam)>,
}

impl Display for SqlQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.text)?;
        for (name, value) in &self.params {
            writeln!(f, "-- :{name} = {value}")?;
        }
        Ok(())
    }
}
