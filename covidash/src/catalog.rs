//! Reference data loaded once at startup: the known countries and the metrics that can be
//! selected for each view.

use std::collections::HashSet;

use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CovidashError, CovidashResult};
use crate::COL;

/// Metrics that can be plotted over time.
pub const TIME_SERIES_METRICS: [&str; 12] = [
    COL::NEW_DEATHS,
    COL::NEW_DEATHS_PER_MILLION,
    COL::TOTAL_DEATHS,
    COL::TOTAL_DEATHS_PER_MILLION,
    COL::NEW_CASES,
    COL::NEW_CASES_PER_MILLION,
    COL::TOTAL_CASES,
    COL::TOTAL_CASES_PER_MILLION,
    COL::NEW_TESTS,
    COL::NEW_TESTS_PER_THOUSAND,
    COL::TOTAL_TESTS,
    COL::TOTAL_TESTS_PER_THOUSAND,
];

/// Cumulative metrics that are meaningful on a single date.
pub const CORRELATION_METRICS: [&str; 6] = [
    COL::TOTAL_DEATHS,
    COL::TOTAL_DEATHS_PER_MILLION,
    COL::TOTAL_CASES,
    COL::TOTAL_CASES_PER_MILLION,
    COL::TOTAL_TESTS,
    COL::TOTAL_TESTS_PER_THOUSAND,
];

/// Country dimension columns that are keys rather than attributes.
const NON_ATTRIBUTE_COLUMNS: [&str; 3] = [COL::ID_COUNTRY, COL::ISO_CODE, COL::LOCATION];

/// Formats a metric name for axis titles and option labels, e.g. `new_cases_per_million`
/// becomes `New cases per million`.
pub fn display_name(metric: &str) -> String {
    let spaced = metric.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub id: i64,
    pub iso_code: String,
    pub location: String,
}

/// A label/value pair the selection widgets are populated with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SelectOption<T> {
    pub label: String,
    pub value: T,
}

/// The columns a data source exposes, as discovered by schema introspection.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SourceSchema {
    /// Columns of the deaths, cases and tests tables.
    pub fact_columns: Vec<String>,
    /// Every column of the country dimension.
    pub country_columns: Vec<String>,
}

/// Read-only reference data shared by every request.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub countries: Vec<Country>,
    pub time_series_metrics: Vec<String>,
    pub correlation_metrics: Vec<String>,
    pub attributes: Vec<String>,
}

fn validated(candidates: &[&str], available: &HashSet<&str>, catalog: &str) -> Vec<String> {
    candidates
        .iter()
        .filter(|metric| {
            let present = available.contains(*metric);
            if !present {
                warn!("Dropping {catalog} metric `{metric}`: not present in the data source");
            }
            present
        })
        .map(|metric| metric.to_string())
        .sorted()
        .collect()
}

impl Catalog {
    /// The catalog used when reference data cannot be loaded: the static metric registries
    /// without any countries or country attributes.
    pub fn unavailable() -> Self {
        Self {
            countries: vec![],
            time_series_metrics: TIME_SERIES_METRICS
                .iter()
                .map(|metric| metric.to_string())
                .sorted()
                .collect(),
            correlation_metrics: CORRELATION_METRICS
                .iter()
                .map(|metric| metric.to_string())
                .sorted()
                .collect(),
            attributes: vec![],
        }
    }

    /// Builds the catalog from the loaded countries, keeping only the static metrics that the
    /// source schema actually provides.
    pub fn new(countries: Vec<Country>, schema: &SourceSchema) -> Self {
        let facts: HashSet<&str> = schema.fact_columns.iter().map(String::as_str).collect();
        let attributes = schema
            .country_columns
            .iter()
            .filter(|column| !NON_ATTRIBUTE_COLUMNS.contains(&column.as_str()))
            .cloned()
            .sorted()
            .collect_vec();
        let catalog = Self {
            countries,
            time_series_metrics: validated(&TIME_SERIES_METRICS, &facts, "time-series"),
            correlation_metrics: validated(&CORRELATION_METRICS, &facts, "correlation"),
            attributes,
        };
        debug!(
            "Catalog with {} countries, {} time-series metrics, {} correlation metrics, {} attributes",
            catalog.countries.len(),
            catalog.time_series_metrics.len(),
            catalog.correlation_metrics.len(),
            catalog.attributes.len()
        );
        catalog
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }

    pub fn country(&self, id: i64) -> Option<&Country> {
        self.countries.iter().find(|country| country.id == id)
    }

    /// Identifiers of every known country, in catalog order.
    pub fn all_country_ids(&self) -> Vec<i64> {
        self.countries.iter().map(|country| country.id).collect()
    }

    /// Checks that a metric can be plotted over time.
    pub fn check_time_series_metric(&self, metric: &str) -> CovidashResult<()> {
        if self.time_series_metrics.iter().any(|m| m == metric) {
            Ok(())
        } else {
            Err(CovidashError::UnknownMetric(metric.to_string()))
        }
    }

    /// Checks that a column can be placed on an axis of the correlation view: either a
    /// cumulative metric or a country attribute.
    pub fn check_correlation_axis(&self, metric: &str) -> CovidashResult<()> {
        let known = self
            .correlation_metrics
            .iter()
            .chain(&self.attributes)
            .any(|m| m == metric);
        if known {
            Ok(())
        } else {
            Err(CovidashError::InvalidAxis(metric.to_string()))
        }
    }

    pub fn country_options(&self) -> Vec<SelectOption<i64>> {
        self.countries
            .iter()
            .map(|country| SelectOption {
                label: country.location.clone(),
                value: country.id,
            })
            .collect()
    }

    pub fn time_series_options(&self) -> Vec<SelectOption<String>> {
        metric_options(&self.time_series_metrics)
    }

    pub fn correlation_options(&self) -> Vec<SelectOption<String>> {
        metric_options(&self.correlation_metrics)
    }

    pub fn attribute_options(&self) -> Vec<SelectOption<String>> {
        metric_options(&self.attributes)
    }
}

fn metric_options(metrics: &[String]) -> Vec<SelectOption<String>> {
    metrics
        .iter()
        .map(|metric| SelectOption {
            label: display_name(metric),
            value: metric.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SourceSchema {
        SourceSchema {
            fact_columns: [
                COL::ID_DATE,
                COL::ID_COUNTRY,
                COL::NEW_CASES,
                COL::TOTAL_CASES,
                COL::NEW_CASES_PER_MILLION,
            ]
            .map(String::from)
            .to_vec(),
            country_columns: [
                COL::ID_COUNTRY,
                COL::ISO_CODE,
                COL::LOCATION,
                COL::POPULATION_DENSITY,
                COL::HOSPITAL_BEDS_PER_THOUSAND,
            ]
            .map(String::from)
            .to_vec(),
        }
    }

    fn countries() -> Vec<Country> {
        vec![
            Country {
                id: 38,
                iso_code: "CAN".into(),
                location: "Canada".into(),
            },
            Country {
                id: 52,
                iso_code: "DNK".into(),
                location: "Denmark".into(),
            },
        ]
    }

    #[test]
    fn display_name_replaces_underscores_and_capitalizes() {
        assert_eq!(display_name("new_cases_per_million"), "New cases per million");
        assert_eq!(display_name("Total_DEATHS"), "Total deaths");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn catalog_keeps_only_metrics_present_in_schema() {
        let catalog = Catalog::new(countries(), &schema());
        assert_eq!(
            catalog.time_series_metrics,
            vec![COL::NEW_CASES, COL::NEW_CASES_PER_MILLION, COL::TOTAL_CASES]
        );
        assert_eq!(catalog.correlation_metrics, vec![COL::TOTAL_CASES]);
    }

    #[test]
    fn attributes_exclude_key_columns_and_are_sorted() {
        let catalog = Catalog::new(countries(), &schema());
        assert_eq!(
            catalog.attributes,
            vec![COL::HOSPITAL_BEDS_PER_THOUSAND, COL::POPULATION_DENSITY]
        );
    }

    #[test]
    fn metric_checks() {
        let catalog = Catalog::new(countries(), &schema());
        assert!(catalog.check_time_series_metric(COL::NEW_CASES).is_ok());
        assert!(matches!(
            catalog.check_time_series_metric(COL::NEW_TESTS),
            Err(CovidashError::UnknownMetric(_))
        ));
        assert!(catalog.check_correlation_axis(COL::POPULATION_DENSITY).is_ok());
        assert!(catalog.check_correlation_axis(COL::TOTAL_CASES).is_ok());
        assert!(matches!(
            catalog.check_correlation_axis(COL::NEW_CASES),
            Err(CovidashError::InvalidAxis(_))
        ));
    }

    #[test]
    fn options_use_display_labels() {
        let catalog = Catalog::new(countries(), &schema());
        let options = catalog.attribute_options();
        assert_eq!(options[1].label, "Population density");
        assert_eq!(options[1].value, COL::POPULATION_DENSITY);
        assert_eq!(catalog.country_options()[0].label, "Canada");
        assert_eq!(catalog.country_options()[0].value, 38);
    }

    #[test]
    fn unavailable_catalog_keeps_static_metrics() {
        let catalog = Catalog::unavailable();
        assert!(catalog.is_empty());
        assert!(catalog.all_country_ids().is_empty());
        assert!(catalog.country(38).is_none());
        assert!(catalog.attributes.is_empty());
        assert_eq!(catalog.time_series_metrics.len(), TIME_SERIES_METRICS.len());
        assert_eq!(catalog.correlation_metrics.len(), CORRELATION_METRICS.len());
        assert!(catalog.check_time_series_metric(COL::NEW_CASES_PER_MILLION).is_ok());
        assert!(catalog.check_correlation_axis(COL::TOTAL_DEATHS).is_ok());
        assert!(catalog.check_correlation_axis(COL::POPULATION_DENSITY).is_err());
    }
}
