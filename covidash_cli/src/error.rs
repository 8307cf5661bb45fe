use covidash::error::CovidashError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum CovidashCliError {
    #[error("Anyhow error")]
    Anyhow(#[from] anyhow::Error),
    #[error("TOML config error")]
    TomlError(#[from] toml::de::Error),
    #[error("polars error")]
    PolarsError(#[from] PolarsError),
    #[error("covidash error: {0}")]
    CovidashError(#[from] CovidashError),
    #[error("std IO error")]
    IOError(#[from] std::io::Error),
}

pub type CovidashCliResult<T> = Result<T, CovidashCliError>;
