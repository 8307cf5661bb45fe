//! Per-country smoothing of time-series metrics into a wide table.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use chrono::NaiveDate;
use itertools::izip;
use log::debug;
use polars::prelude::{DataFrame, DataType, NamedFrom, PolarsResult, Series, SortMultipleOptions};

use crate::COL;

/// Number of samples in the trailing rolling mean.
pub const SMOOTHING_WINDOW: usize = 7;

/// Trailing mean over the current sample and up to `window - 1` preceding ones. Missing samples
/// are ignored, so the first value of a series is the sample itself; a window with no samples at
/// all yields `None`.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|idx| {
            let start = (idx + 1).saturating_sub(window);
            let (sum, count) = values[start..=idx]
                .iter()
                .flatten()
                .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect()
}

/// Ranges of consecutive equal keys.
fn runs<T: PartialEq>(keys: &[T]) -> Vec<Range<usize>> {
    let mut runs = vec![];
    let mut start = 0;
    for idx in 1..=keys.len() {
        if idx == keys.len() || keys[idx] != keys[start] {
            runs.push(start..idx);
            start = idx;
        }
    }
    runs
}

/// One country's values of one metric, in date order.
#[derive(Debug, Clone, PartialEq)]
pub struct CountrySeries {
    pub location: String,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

/// A table with one row per (date, country) and one column per requested metric.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable(pub DataFrame);

impl WideTable {
    /// Replaces each metric column of `raw` with its per-country rolling mean. Countries are told
    /// apart by ISO code, so smoothing never crosses countries even when two share a name. Every
    /// (date, country) row of the input is kept and the result is ordered by date, then country.
    pub fn smoothed<S: AsRef<str>>(raw: &DataFrame, metrics: &[S]) -> PolarsResult<Self> {
        let mut keep = vec![COL::DATE, COL::ISO_CODE, COL::LOCATION];
        keep.extend(metrics.iter().map(AsRef::as_ref));
        let mut df = raw
            .select(keep)?
            .sort([COL::ISO_CODE, COL::DATE], SortMultipleOptions::default())?;

        let iso_codes: Vec<Option<String>> = df
            .column(COL::ISO_CODE)?
            .str()?
            .into_iter()
            .map(|iso_code| iso_code.map(str::to_owned))
            .collect();
        let groups = runs(&iso_codes);
        debug!("Smoothing {} rows across {} countries", df.height(), groups.len());

        for metric in metrics {
            let metric = metric.as_ref();
            let values: Vec<Option<f64>> = df
                .column(metric)?
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .collect();
            let smoothed: Vec<Option<f64>> = groups
                .iter()
                .flat_map(|group| rolling_mean(&values[group.clone()], SMOOTHING_WINDOW))
                .collect();
            df.with_column(Series::new(metric, smoothed))?;
        }

        Ok(Self(
            df.drop(COL::ISO_CODE)?
                .sort([COL::DATE, COL::LOCATION], SortMultipleOptions::default())?,
        ))
    }

    pub fn height(&self) -> usize {
        self.0.height()
    }

    /// Countries present in the table, in alphabetical order.
    pub fn locations(&self) -> PolarsResult<Vec<String>> {
        Ok(self
            .0
            .column(COL::LOCATION)?
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_owned)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    /// The values of `metric` for each country, countries in alphabetical order.
    pub fn series(&self, metric: &str) -> PolarsResult<Vec<CountrySeries>> {
        let values = self.0.column(metric)?.cast(&DataType::Float64)?;
        let mut by_location: BTreeMap<&str, CountrySeries> = BTreeMap::new();
        for (date, location, value) in izip!(
            self.0.column(COL::DATE)?.date()?.as_date_iter(),
            self.0.column(COL::LOCATION)?.str()?,
            values.f64()?,
        ) {
            let (Some(date), Some(location)) = (date, location) else {
                continue;
            };
            let series = by_location
                .entry(location)
                .or_insert_with(|| CountrySeries {
                    location: location.to_owned(),
                    dates: vec![],
                    values: vec![],
                });
            series.dates.push(date);
            series.values.push(value);
        }
        Ok(by_location.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;
    use crate::source::tests::day;

    fn raw(a: &[Option<f64>], b: &[Option<f64>]) -> DataFrame {
        // Interleaved by date like the source returns it
        let mut dates = vec![];
        let mut locations = vec![];
        let mut values = vec![];
        for idx in 0..a.len().max(b.len()) {
            for (location, series) in [("A", a), ("B", b)] {
                if let Some(value) = series.get(idx) {
                    dates.push(day(idx as u32));
                    locations.push(location);
                    values.push(*value);
                }
            }
        }
        df!(
            COL::DATE => dates,
            COL::ISO_CODE => locations.clone(),
            COL::LOCATION => locations,
            COL::NEW_CASES => values
        )
        .unwrap()
    }

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn rolling_mean_grows_window_then_trails() {
        let values = some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let smoothed = rolling_mean(&values, 7);
        assert_eq!(smoothed[0], Some(1.0), "First value is the raw value");
        assert_eq!(smoothed[1], Some(1.5));
        assert_eq!(smoothed[5], Some(3.5));
        assert_eq!(smoothed[6], Some(4.0));
        assert_eq!(smoothed[9], Some(7.0), "Mean of the trailing seven values");
    }

    #[test]
    fn rolling_mean_skips_missing_values() {
        let smoothed = rolling_mean(&[None, Some(2.0), None, Some(4.0)], 7);
        assert_eq!(smoothed, vec![None, Some(2.0), Some(2.0), Some(3.0)]);
        assert_eq!(rolling_mean(&[], 7), vec![]);
    }

    #[test]
    fn runs_split_on_key_change() {
        assert_eq!(runs(&["a", "a", "b", "c", "c"]), vec![0..2, 2..3, 3..5]);
        assert!(runs::<&str>(&[]).is_empty());
    }

    #[test]
    fn smoothing_preserves_rows_and_keys() -> anyhow::Result<()> {
        let raw = raw(
            &some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]),
            &some(&[10.0, 20.0, 30.0]),
        );
        let table = WideTable::smoothed(&raw, &[COL::NEW_CASES])?;
        assert_eq!(table.height(), raw.height());
        assert_eq!(
            table.0.get_column_names(),
            vec![COL::DATE, COL::LOCATION, COL::NEW_CASES]
        );
        let raw_keys = raw
            .select([COL::DATE, COL::LOCATION])?
            .sort([COL::DATE, COL::LOCATION], SortMultipleOptions::default())?;
        assert_eq!(table.0.select([COL::DATE, COL::LOCATION])?, raw_keys);
        Ok(())
    }

    #[test]
    fn smoothing_never_mixes_countries() -> anyhow::Result<()> {
        let raw = raw(&some(&[1.0, 2.0, 3.0]), &some(&[100.0, 200.0, 300.0]));
        let table = WideTable::smoothed(&raw, &[COL::NEW_CASES])?;
        let series = table.series(COL::NEW_CASES)?;
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].location, "A");
        assert_eq!(series[0].values, some(&[1.0, 1.5, 2.0]));
        assert_eq!(series[1].location, "B");
        assert_eq!(series[1].values, some(&[100.0, 150.0, 200.0]));
        assert_eq!(series[1].dates, vec![day(0), day(1), day(2)]);
        Ok(())
    }

    #[test]
    fn countries_sharing_a_name_are_smoothed_apart() -> anyhow::Result<()> {
        let raw = df!(
            COL::DATE => &[day(0), day(0), day(1), day(1)],
            COL::ISO_CODE => &["GIN", "GNQ", "GIN", "GNQ"],
            COL::LOCATION => &["Guinea", "Guinea", "Guinea", "Guinea"],
            COL::NEW_CASES => &[1.0, 100.0, 3.0, 300.0]
        )?;
        let table = WideTable::smoothed(&raw, &[COL::NEW_CASES])?;
        assert_eq!(
            table.0.get_column_names(),
            vec![COL::DATE, COL::LOCATION, COL::NEW_CASES]
        );
        let mut smoothed: Vec<f64> = table
            .0
            .column(COL::NEW_CASES)?
            .f64()?
            .into_no_null_iter()
            .collect();
        smoothed.sort_by(f64::total_cmp);
        assert_eq!(smoothed, vec![1.0, 2.0, 100.0, 200.0]);
        Ok(())
    }

    #[test]
    fn country_without_values_does_not_block_others() -> anyhow::Result<()> {
        let raw = raw(&some(&[1.0, 3.0]), &[None, None]);
        let table = WideTable::smoothed(&raw, &[COL::NEW_CASES])?;
        let series = table.series(COL::NEW_CASES)?;
        assert_eq!(series[0].values, some(&[1.0, 2.0]));
        assert_eq!(series[1].values, vec![None, None]);
        assert_eq!(table.locations()?, vec!["A", "B"]);
        Ok(())
    }
}
