//! Error types.

#[derive(thiserror::Error, Debug)]
pub enum CovidashError {
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Connection to the data source timed out after {0}s.")]
    ConnectionTimeout(u64),
    #[error("Reference data unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),
    #[error("Metric cannot be used on a correlation axis: {0}")]
    InvalidAxis(String),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
}

pub type CovidashResult<T> = Result<T, CovidashError>;

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_anyhow() {
        let anyhow_error = anyhow!("An anyhow error");
        let covidash_error: CovidashError = anyhow_error.into();
        assert_eq!(
            covidash_error.to_string(),
            "Wrapped anyhow error: An anyhow error"
        );
    }

    #[test]
    fn unknown_metric_names_the_metric() {
        let error = CovidashError::UnknownMetric("new_hugs".into());
        assert_eq!(error.to_string(), "Unknown metric: new_hugs");
    }
}
