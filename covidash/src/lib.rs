use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{Local, NaiveDate};
use log::{debug, info, warn};
use polars::frame::DataFrame;

use crate::catalog::Catalog;
use crate::chart::Figure;
use crate::config::Config;
use crate::error::{CovidashError, CovidashResult};
use crate::query::{
    CorrelationSelection, CrossSectionRequest, TimeSeriesRequest, TimeSeriesSelection, Update,
};
use crate::smoothing::WideTable;
use crate::source::{DataSource, TableSource};

// Re-exports
pub use column_names as COL;

// Modules
pub mod catalog;
pub mod chart;
pub mod column_names;
pub mod config;
pub mod correlation;
pub mod error;
pub mod formatters;
pub mod panels;
pub mod query;
pub mod smoothing;
pub mod source;

/// Result of the time-series pipeline: the smoothed table and the stacked chart drawn from it.
#[derive(Debug, Clone)]
pub struct TimeSeriesView {
    pub table: WideTable,
    pub figure: Figure,
}

/// Result of the correlation pipeline.
#[derive(Debug, Clone)]
pub struct CorrelationView {
    pub table: DataFrame,
    pub figure: Figure,
    /// Whether the manual country selector should be shown as disabled.
    pub selector_disabled: bool,
}

/// Type for the dashboard's data pipeline: the reference data loaded at startup together with
/// the source each interaction queries.
pub struct Covidash<S: DataSource + 'static = TableSource> {
    pub catalog: Catalog,
    pub config: Config,
    source: Arc<S>,
}

impl Covidash<TableSource> {
    /// Setup reading the tables under the configured `data_path`
    pub async fn new_with_config(config: Config) -> CovidashResult<Self> {
        let source = TableSource::from_dir(&config.data_path);
        Self::with_source(source, config).await
    }
}

impl<S: DataSource + 'static> Covidash<S> {
    /// Setup over any data source. The reference data is loaded once, bounded by the configured
    /// timeout. A failed load keeps only the static metric registries, or aborts when
    /// `require_catalog` is set.
    pub async fn with_source(source: S, config: Config) -> CovidashResult<Self> {
        debug!("config: {config:?}");
        let source = Arc::new(source);
        let catalog = match load_catalog(Arc::clone(&source), config.connect_timeout_secs).await {
            Ok(catalog) => catalog,
            Err(err) if config.require_catalog => {
                return Err(CovidashError::CatalogUnavailable(format!("{err:#}")))
            }
            Err(err) => {
                warn!("Reference data unavailable, continuing without countries: {err:#}");
                Catalog::unavailable()
            }
        };
        Ok(Self {
            catalog,
            config,
            source,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs the time-series pipeline for today's date.
    pub async fn time_series(
        &self,
        selection: &TimeSeriesSelection,
    ) -> CovidashResult<Update<TimeSeriesView>> {
        self.time_series_on(selection, Local::now().date_naive()).await
    }

    /// Runs the time-series pipeline as if observed on `today`.
    pub async fn time_series_on(
        &self,
        selection: &TimeSeriesSelection,
        today: NaiveDate,
    ) -> CovidashResult<Update<TimeSeriesView>> {
        let request = match TimeSeriesRequest::from_selection(selection, &self.catalog, today)? {
            Update::Ready(request) => request,
            Update::Skipped => return Ok(Update::Skipped),
        };
        // Legend spacing only accounts for countries the catalog knows about
        let country_count = request
            .country_ids
            .iter()
            .filter(|id| self.catalog.country(**id).is_some())
            .count();
        let source = Arc::clone(&self.source);
        let view = tokio::task::spawn_blocking(move || -> CovidashResult<TimeSeriesView> {
            let raw = source.time_series(&request)?;
            let table = WideTable::smoothed(&raw, &request.metrics.iter().collect::<Vec<_>>())?;
            let figure = panels::compose(&table, &request.metrics, country_count)?;
            Ok(TimeSeriesView { table, figure })
        })
        .await
        .map_err(|err| anyhow!("Time-series task failed: {err}"))??;
        info!(
            "Time series ready: {} rows, {} traces",
            view.table.height(),
            view.figure.data.len()
        );
        Ok(Update::Ready(view))
    }

    /// Runs the correlation pipeline for today's date.
    pub async fn correlation(
        &self,
        selection: &CorrelationSelection,
    ) -> CovidashResult<Update<CorrelationView>> {
        self.correlation_on(selection, Local::now().date_naive()).await
    }

    /// Runs the correlation pipeline as if observed on `today`.
    pub async fn correlation_on(
        &self,
        selection: &CorrelationSelection,
        today: NaiveDate,
    ) -> CovidashResult<Update<CorrelationView>> {
        let selector_disabled = selection.selector_disabled();
        let request = match CrossSectionRequest::from_selection(selection, &self.catalog, today)? {
            Update::Ready(request) => request,
            Update::Skipped => return Ok(Update::Skipped),
        };
        let source = Arc::clone(&self.source);
        let (table, figure) =
            tokio::task::spawn_blocking(move || -> CovidashResult<(DataFrame, Figure)> {
                let table = source.cross_section(&request)?;
                let figure = correlation::scatter(&table, &request.x_metric, &request.y_metric)?;
                Ok((table, figure))
            })
            .await
            .map_err(|err| anyhow!("Correlation task failed: {err}"))??;
        info!("Correlation ready: {} countries", table.height());
        Ok(Update::Ready(CorrelationView {
            table,
            figure,
            selector_disabled,
        }))
    }
}

async fn load_catalog<S: DataSource + 'static>(
    source: Arc<S>,
    timeout_secs: u64,
) -> CovidashResult<Catalog> {
    let load = tokio::task::spawn_blocking(move || -> anyhow::Result<Catalog> {
        let countries = source.countries()?;
        let schema = source.schema()?;
        Ok(Catalog::new(countries, &schema))
    });
    match tokio::time::timeout(Duration::from_secs(timeout_secs), load).await {
        Ok(joined) => Ok(joined.map_err(|err| anyhow!("Catalog task failed: {err}"))??),
        Err(_) => Err(CovidashError::ConnectionTimeout(timeout_secs)),
    }
}
