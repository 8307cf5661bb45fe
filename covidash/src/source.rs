//! Read-only access to the pandemic statistics store.
//!
//! The store is five tables: a date dimension, a country dimension, and the deaths, cases and
//! tests facts keyed by date and country. `TableSource` reads them with polars, either from
//! parquet files or from frames held in memory.

use std::path::{Path, PathBuf};

use anyhow::Context;
use itertools::izip;
use log::{debug, info};
use polars::lazy::dsl::{col, Expr};
use polars::lazy::frame::{IntoLazy, LazyFrame};
use polars::prelude::{
    DataFrame, DataType, JoinArgs, JoinType, ScanArgsParquet, SortMultipleOptions,
};
use strum_macros::{Display, EnumIter};

use crate::catalog::{Country, SourceSchema};
use crate::query::{CrossSectionRequest, TimeSeriesRequest};
use crate::COL;

/// This module contains the names of the files holding each table.
pub mod paths {
    pub const DIM_TIME: &str = "dim_time.parquet";
    pub const DIM_COUNTRY: &str = "dim_country.parquet";
    pub const DEATHS: &str = "deaths.parquet";
    pub const CASES: &str = "cases.parquet";
    pub const TESTS: &str = "tests.parquet";
}
use paths as PATHS;

/// The tables of the store, displayed with their relational names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Table {
    #[strum(serialize = "Dim_time")]
    DimTime,
    #[strum(serialize = "Dim_country")]
    DimCountry,
    Deaths,
    Cases,
    Tests,
}

impl Table {
    pub fn file_name(&self) -> &'static str {
        match self {
            Table::DimTime => PATHS::DIM_TIME,
            Table::DimCountry => PATHS::DIM_COUNTRY,
            Table::Deaths => PATHS::DEATHS,
            Table::Cases => PATHS::CASES,
            Table::Tests => PATHS::TESTS,
        }
    }

    /// The table a metric column lives in. Anything that is not a fact is a country attribute.
    pub fn for_column(column: &str) -> Self {
        if column.contains("deaths") {
            Table::Deaths
        } else if column.contains("cases") {
            Table::Cases
        } else if column.contains("tests") {
            Table::Tests
        } else {
            Table::DimCountry
        }
    }
}

/// A source of observation rows. Every call is an independent, blocking round trip.
pub trait DataSource: Send + Sync {
    /// The country dimension, ordered by identifier.
    fn countries(&self) -> anyhow::Result<Vec<Country>>;

    /// The columns available for metrics and country attributes.
    fn schema(&self) -> anyhow::Result<SourceSchema>;

    /// One row per country per date with the requested metrics, ordered by date then country.
    fn time_series(&self, request: &TimeSeriesRequest) -> anyhow::Result<DataFrame>;

    /// One row per country for the requested date with the two requested columns.
    fn cross_section(&self, request: &CrossSectionRequest) -> anyhow::Result<DataFrame>;
}

/// In-memory copies of the five tables.
#[derive(Debug, Clone)]
pub struct Frames {
    pub dim_time: DataFrame,
    pub dim_country: DataFrame,
    pub deaths: DataFrame,
    pub cases: DataFrame,
    pub tests: DataFrame,
}

#[derive(Debug, Clone)]
enum Location {
    Directory(PathBuf),
    Memory(Frames),
}

#[derive(Debug, Clone)]
pub struct TableSource {
    location: Location,
}

/// The tables opened for a single request.
struct Connection {
    dim_time: LazyFrame,
    dim_country: LazyFrame,
    deaths: LazyFrame,
    cases: LazyFrame,
    tests: LazyFrame,
}

impl TableSource {
    /// A source reading `<table>.parquet` files from `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            location: Location::Directory(dir.as_ref().to_path_buf()),
        }
    }

    pub fn from_frames(frames: Frames) -> Self {
        Self {
            location: Location::Memory(frames),
        }
    }

    fn connect(&self) -> anyhow::Result<Connection> {
        match &self.location {
            Location::Directory(dir) => {
                let scan = |table: Table| -> anyhow::Result<LazyFrame> {
                    let path = dir.join(table.file_name());
                    debug!("Scanning {}", path.display());
                    LazyFrame::scan_parquet(&path, ScanArgsParquet::default()).with_context(|| {
                        format!("Failed to open table {table} at {}", path.display())
                    })
                };
                Ok(Connection {
                    dim_time: scan(Table::DimTime)?,
                    dim_country: scan(Table::DimCountry)?,
                    deaths: scan(Table::Deaths)?,
                    cases: scan(Table::Cases)?,
                    tests: scan(Table::Tests)?,
                })
            }
            Location::Memory(frames) => Ok(Connection {
                dim_time: frames.dim_time.clone().lazy(),
                dim_country: frames.dim_country.clone().lazy(),
                deaths: frames.deaths.clone().lazy(),
                cases: frames.cases.clone().lazy(),
                tests: frames.tests.clone().lazy(),
            }),
        }
    }
}

fn column_names(frame: LazyFrame) -> anyhow::Result<Vec<String>> {
    Ok(frame
        .limit(0)
        .collect()?
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect())
}

impl Connection {
    /// Facts joined on date and country, with both dimensions attached.
    fn joined(self) -> LazyFrame {
        let fact_keys = [col(COL::ID_DATE), col(COL::ID_COUNTRY)];
        self.deaths
            .join(
                self.cases,
                fact_keys.clone(),
                fact_keys.clone(),
                JoinArgs::new(JoinType::Inner),
            )
            .join(
                self.tests,
                fact_keys.clone(),
                fact_keys,
                JoinArgs::new(JoinType::Inner),
            )
            .join(
                self.dim_time,
                [col(COL::ID_DATE)],
                [col(COL::ID_DATE)],
                JoinArgs::new(JoinType::Inner),
            )
            .join(
                self.dim_country,
                [col(COL::ID_COUNTRY)],
                [col(COL::ID_COUNTRY)],
                JoinArgs::new(JoinType::Inner),
            )
            .with_column(col(COL::DIM_DATE).alias(COL::DATE))
    }
}

fn selection<'a>(value_columns: impl IntoIterator<Item = &'a str>) -> Vec<Expr> {
    [COL::DATE, COL::ISO_CODE, COL::LOCATION]
        .into_iter()
        .chain(value_columns)
        .map(col)
        .collect()
}

impl DataSource for TableSource {
    fn countries(&self) -> anyhow::Result<Vec<Country>> {
        let df = self
            .connect()?
            .dim_country
            .select([col(COL::ID_COUNTRY), col(COL::ISO_CODE), col(COL::LOCATION)])
            .sort([COL::ID_COUNTRY], SortMultipleOptions::default())
            .collect()?;
        let ids = df.column(COL::ID_COUNTRY)?.cast(&DataType::Int64)?;
        let countries: Vec<Country> = izip!(
            ids.i64()?,
            df.column(COL::ISO_CODE)?.str()?,
            df.column(COL::LOCATION)?.str()?,
        )
        .filter_map(|(id, iso_code, location)| {
            Some(Country {
                id: id?,
                iso_code: iso_code.unwrap_or_default().to_string(),
                location: location?.to_string(),
            })
        })
        .collect();
        info!("Loaded {} countries", countries.len());
        Ok(countries)
    }

    fn schema(&self) -> anyhow::Result<SourceSchema> {
        let connection = self.connect()?;
        let mut fact_columns = column_names(connection.deaths)?;
        fact_columns.extend(column_names(connection.cases)?);
        fact_columns.extend(column_names(connection.tests)?);
        let country_columns = column_names(connection.dim_country)?;
        debug!("Fact columns: {fact_columns:?}");
        debug!("Country columns: {country_columns:?}");
        Ok(SourceSchema {
            fact_columns,
            country_columns,
        })
    }

    fn time_series(&self, request: &TimeSeriesRequest) -> anyhow::Result<DataFrame> {
        debug!("Fetching time series: {request:?}");
        let df = self
            .connect()?
            .joined()
            .filter(request.into())
            .sort([COL::DATE, COL::ID_COUNTRY], SortMultipleOptions::default())
            .select(selection(request.metrics.iter().map(String::as_str)))
            .collect()?;
        info!("Fetched time series with shape: {:?}", df.shape());
        Ok(df)
    }

    fn cross_section(&self, request: &CrossSectionRequest) -> anyhow::Result<DataFrame> {
        debug!("Fetching cross section: {request:?}");
        let df = self
            .connect()?
            .joined()
            .filter(request.into())
            .sort([COL::ID_COUNTRY], SortMultipleOptions::default())
            .select(selection(request.value_columns()))
            .collect()?;
        info!("Fetched cross section with shape: {:?}", df.shape());
        Ok(df)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;
    use nonempty::nonempty;
    use polars::df;
    use polars::prelude::{NamedFrom, ParquetWriter, Series};
    use strum::IntoEnumIterator;

    use super::*;
    use crate::query::DateBound;

    pub(crate) fn day(offset: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 3, 1).unwrap() + chrono::Duration::days(offset.into())
    }

    /// Ten consecutive days for two countries. Country 1 ("Atlantis") reports `n` new cases per
    /// million on day `n`, country 2 ("Borduria") reports ten times that. Country 3 exists in
    /// the dimension but has no facts.
    pub(crate) fn frames() -> Frames {
        let days = 10u32;
        let dim_time = df!(
            COL::ID_DATE => (1..=days as i64).collect::<Vec<_>>(),
            COL::DIM_DATE => (0..days).map(day).collect::<Vec<_>>()
        )
        .unwrap();
        let dim_country = df!(
            COL::ID_COUNTRY => &[1i64, 2, 3],
            COL::ISO_CODE => &["ATL", "BOR", "SYL"],
            COL::LOCATION => &["Atlantis", "Borduria", "Syldavia"],
            COL::POPULATION_DENSITY => &[10.0, 20.0, 30.0],
            COL::HOSPITAL_BEDS_PER_THOUSAND => &[1.5, 2.5, 3.5]
        )
        .unwrap();

        let mut date_ids = vec![];
        let mut country_ids = vec![];
        let mut values = vec![];
        for date_id in 1..=days as i64 {
            for (country_id, scale) in [(1i64, 1.0), (2, 10.0)] {
                date_ids.push(date_id);
                country_ids.push(country_id);
                values.push(date_id as f64 * scale);
            }
        }
        let totals: Vec<f64> = values.iter().map(|v| v * 100.0).collect();
        let fact = |names: [&str; 4]| {
            DataFrame::new(vec![
                Series::new(COL::ID_DATE, date_ids.clone()),
                Series::new(COL::ID_COUNTRY, country_ids.clone()),
                Series::new(names[0], values.clone()),
                Series::new(names[1], values.clone()),
                Series::new(names[2], totals.clone()),
                Series::new(names[3], totals.clone()),
            ])
            .unwrap()
        };
        Frames {
            dim_time,
            dim_country,
            deaths: fact([
                COL::NEW_DEATHS,
                COL::NEW_DEATHS_PER_MILLION,
                COL::TOTAL_DEATHS,
                COL::TOTAL_DEATHS_PER_MILLION,
            ]),
            cases: fact([
                COL::NEW_CASES,
                COL::NEW_CASES_PER_MILLION,
                COL::TOTAL_CASES,
                COL::TOTAL_CASES_PER_MILLION,
            ]),
            tests: fact([
                COL::NEW_TESTS,
                COL::NEW_TESTS_PER_THOUSAND,
                COL::TOTAL_TESTS,
                COL::TOTAL_TESTS_PER_THOUSAND,
            ]),
        }
    }

    fn time_series_request(country_ids: nonempty::NonEmpty<i64>) -> TimeSeriesRequest {
        TimeSeriesRequest {
            country_ids,
            metrics: nonempty![COL::NEW_CASES_PER_MILLION.to_string()],
            dates: DateBound::until(day(30)),
        }
    }

    #[test]
    fn table_for_column() {
        assert_eq!(Table::for_column(COL::NEW_DEATHS_PER_MILLION), Table::Deaths);
        assert_eq!(Table::for_column(COL::TOTAL_CASES), Table::Cases);
        assert_eq!(Table::for_column(COL::NEW_TESTS_PER_THOUSAND), Table::Tests);
        assert_eq!(Table::for_column(COL::POPULATION_DENSITY), Table::DimCountry);
        assert_eq!(Table::DimCountry.to_string(), "Dim_country");
    }

    #[test]
    fn countries_are_loaded_in_id_order() -> anyhow::Result<()> {
        let countries = TableSource::from_frames(frames()).countries()?;
        assert_eq!(countries.len(), 3);
        assert_eq!(countries[1].id, 2);
        assert_eq!(countries[1].iso_code, "BOR");
        assert_eq!(countries[1].location, "Borduria");
        Ok(())
    }

    #[test]
    fn schema_lists_fact_and_country_columns() -> anyhow::Result<()> {
        let schema = TableSource::from_frames(frames()).schema()?;
        assert!(schema.fact_columns.contains(&COL::NEW_TESTS.to_string()));
        assert!(schema.fact_columns.contains(&COL::TOTAL_DEATHS.to_string()));
        assert!(schema
            .country_columns
            .contains(&COL::HOSPITAL_BEDS_PER_THOUSAND.to_string()));
        Ok(())
    }

    #[test]
    fn time_series_rows_are_filtered_and_ordered() -> anyhow::Result<()> {
        let source = TableSource::from_frames(frames());
        let df = source.time_series(&time_series_request(nonempty![2, 1]))?;
        assert_eq!(df.shape(), (20, 4), "date, iso_code, location and one metric");
        let locations: Vec<&str> = df.column(COL::LOCATION)?.str()?.into_no_null_iter().collect();
        assert_eq!(&locations[..4], &["Atlantis", "Borduria", "Atlantis", "Borduria"]);

        let df = source.time_series(&time_series_request(nonempty![2]))?;
        assert_eq!(df.shape().0, 10);
        Ok(())
    }

    #[test]
    fn time_series_respects_date_bound() -> anyhow::Result<()> {
        let source = TableSource::from_frames(frames());
        let mut request = time_series_request(nonempty![1]);
        // Only days 0..=4 are strictly before day 5
        request.dates.before = day(5);
        assert_eq!(source.time_series(&request)?.shape().0, 5);
        request.dates.after = day(0);
        assert_eq!(source.time_series(&request)?.shape().0, 4);
        Ok(())
    }

    #[test]
    fn cross_section_returns_one_row_per_country() -> anyhow::Result<()> {
        let source = TableSource::from_frames(frames());
        let request = CrossSectionRequest {
            country_ids: nonempty![1, 2, 3],
            x_metric: COL::POPULATION_DENSITY.into(),
            y_metric: COL::TOTAL_CASES.into(),
            date: day(9),
        };
        let df = source.cross_section(&request)?;
        assert_eq!(df.shape(), (2, 5));
        let totals: Vec<f64> = df.column(COL::TOTAL_CASES)?.f64()?.into_no_null_iter().collect();
        assert_eq!(totals, vec![1000.0, 10000.0]);
        Ok(())
    }

    /// Writes each frame to `<table>.parquet` under `dir`.
    pub(crate) fn write_parquet(dir: &Path, mut frames: Frames) -> anyhow::Result<()> {
        for table in Table::iter() {
            let df = match table {
                Table::DimTime => &mut frames.dim_time,
                Table::DimCountry => &mut frames.dim_country,
                Table::Deaths => &mut frames.deaths,
                Table::Cases => &mut frames.cases,
                Table::Tests => &mut frames.tests,
            };
            let file = std::fs::File::create(dir.join(table.file_name()))?;
            ParquetWriter::new(file).finish(df)?;
        }
        Ok(())
    }

    #[test]
    fn parquet_directory_source() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        write_parquet(dir.path(), frames())?;
        let source = TableSource::from_dir(dir.path());
        assert_eq!(source.countries()?.len(), 3);
        let df = source.time_series(&time_series_request(nonempty![1, 2]))?;
        assert_eq!(df.shape(), (20, 4));
        Ok(())
    }

    #[test]
    fn missing_directory_fails() {
        let source = TableSource::from_dir("/definitely/not/here");
        assert!(source.countries().is_err());
    }
}
