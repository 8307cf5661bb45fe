use std::fs::File;
use std::path::Path;

use anyhow::Context;
use chrono::Local;
use clap::{command, Args, Parser, Subcommand};
use covidash::{
    chart::Figure,
    config::Config,
    formatters::{write_table_csv, HtmlFormatter, JsonFormatter, OutputFormatter, OutputGenerator},
    query::{
        CorrelationSelection, CrossSectionRequest, TimeSeriesRequest, TimeSeriesSelection, Update,
        DEFAULT_COUNTRIES, DEFAULT_METRICS,
    },
    Covidash,
};
use enum_dispatch::enum_dispatch;
use log::{debug, info};
use polars::frame::DataFrame;
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::EnumString;

use crate::display::{display_countries, display_metrics};
use crate::error::CovidashCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const LOADING_STRING: &str = "Loading reference data";
const SKIPPED_STRING: &str = "update skipped";

/// Defines the output formats a view can be written in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    Json,
    Html,
    Csv,
}

fn write_output<T, U>(
    output_generator: T,
    figure: &Figure,
    output_file: Option<U>,
) -> CovidashCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        output_generator.save(&mut f, figure)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        output_generator.save(&mut stdout_lock, figure)?;
    };
    Ok(())
}

fn write_table<U: AsRef<Path>>(
    mut table: DataFrame,
    output_file: Option<U>,
) -> CovidashCliResult<()> {
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        write_table_csv(&mut f, &mut table)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        write_table_csv(&mut stdout_lock, &mut table)?;
    };
    Ok(())
}

/// Options shared by the commands that produce a view.
#[derive(Args, Debug, Clone)]
struct OutputArgs {
    #[arg(
        short = 'f',
        long,
        value_name = "json|html|csv",
        default_value = "json",
        help = "Output format: the chart as JSON or as a standalone page, or the table as CSV"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<String>,
    #[arg(long, help = "Print the query that would be sent instead of running it")]
    sql: bool,
}

impl OutputArgs {
    fn emit(&self, figure: &Figure, table: DataFrame, title: String) -> CovidashCliResult<()> {
        let output_file = self.output_file.as_deref();
        match self.output_format {
            OutputFormat::Csv => write_table(table, output_file),
            OutputFormat::Json => write_output(
                OutputFormatter::from(JsonFormatter { pretty: true }),
                figure,
                output_file,
            ),
            OutputFormat::Html => write_output(
                OutputFormatter::from(HtmlFormatter { title: Some(title) }),
                figure,
                output_file,
            ),
        }
    }
}

async fn load(config: Config, quiet: bool) -> CovidashCliResult<Covidash> {
    let sp = (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            LOADING_STRING.to_string() + RUNNING_TAIL_STRING,
        )
    });
    let covidash = Covidash::new_with_config(config).await?;
    if let Some(mut s) = sp {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
    Ok(covidash)
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> CovidashCliResult<()>;
}

/// The `countries` command lists the countries that can be selected.
#[derive(Args, Debug)]
pub struct CountriesCommand {
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for CountriesCommand {
    async fn run(&self, config: Config) -> CovidashCliResult<()> {
        info!("Running `countries` subcommand");
        let covidash = load(config, self.quiet).await?;
        println!("\nThe following countries are available:");
        display_countries(&covidash.catalog.countries);
        Ok(())
    }
}

/// The `metrics` command lists the time-series metrics, the correlation metrics and the country
/// attributes.
#[derive(Args, Debug)]
pub struct MetricsCommand {
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for MetricsCommand {
    async fn run(&self, config: Config) -> CovidashCliResult<()> {
        info!("Running `metrics` subcommand");
        let covidash = load(config, self.quiet).await?;
        display_metrics(&covidash.catalog);
        Ok(())
    }
}

/// The `time-series` command plots the smoothed daily evolution of the selected metrics, one
/// panel per metric.
#[derive(Args, Debug)]
pub struct TimeSeriesCommand {
    #[arg(
        short = 'c',
        long = "countries",
        value_delimiter = ',',
        num_args = 0..,
        help = "Country identifiers (see `covidash countries`)"
    )]
    countries: Vec<i64>,
    #[arg(
        short = 'm',
        long = "metrics",
        value_delimiter = ',',
        num_args = 0..,
        help = "Metrics to plot, one panel each (see `covidash metrics`)"
    )]
    metrics: Vec<String>,
    #[arg(
        long,
        help = "Fill in the dashboard's default countries and metrics when none are given"
    )]
    defaults: bool,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl TimeSeriesCommand {
    fn selection(&self) -> TimeSeriesSelection {
        let mut selection = TimeSeriesSelection {
            countries: self.countries.clone(),
            metrics: self.metrics.clone(),
        };
        if self.defaults {
            if selection.countries.is_empty() {
                selection.countries = DEFAULT_COUNTRIES.to_vec();
            }
            if selection.metrics.is_empty() {
                selection.metrics = DEFAULT_METRICS.map(String::from).to_vec();
            }
        }
        selection
    }
}

impl RunCommand for TimeSeriesCommand {
    async fn run(&self, config: Config) -> CovidashCliResult<()> {
        info!("Running `time-series` subcommand");
        let selection = self.selection();
        debug!("{selection:?}");
        let covidash = load(config, self.quiet).await?;

        if self.output.sql {
            let today = Local::now().date_naive();
            match TimeSeriesRequest::from_selection(&selection, &covidash.catalog, today)? {
                Update::Ready(request) => print!("{}", request.to_sql()),
                Update::Skipped => println!("{SKIPPED_STRING}"),
            }
            return Ok(());
        }

        match covidash.time_series(&selection).await? {
            Update::Ready(view) => {
                let title = selection.metrics.join(", ");
                self.output.emit(&view.figure, view.table.0, title)
            }
            Update::Skipped => {
                println!("{SKIPPED_STRING}");
                Ok(())
            }
        }
    }
}

/// The `correlation` command plots one metric against another across countries on a single
/// recent date.
#[derive(Args, Debug)]
pub struct CorrelationCommand {
    #[arg(
        short = 'c',
        long = "countries",
        value_delimiter = ',',
        num_args = 0..,
        help = "Country identifiers (see `covidash countries`)"
    )]
    countries: Vec<i64>,
    #[arg(
        long = "all",
        help = "Select every available country, ignoring `--countries`"
    )]
    select_all: bool,
    #[arg(
        short = 'x',
        long = "x-metric",
        value_delimiter = ',',
        num_args = 0..,
        help = "Metric or country attribute for the x axis; only the first is used"
    )]
    x_metrics: Vec<String>,
    #[arg(
        short = 'y',
        long = "y-metric",
        value_delimiter = ',',
        num_args = 0..,
        help = "Metric or country attribute for the y axis; only the first is used"
    )]
    y_metrics: Vec<String>,
    #[command(flatten)]
    output: OutputArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl CorrelationCommand {
    fn selection(&self) -> CorrelationSelection {
        CorrelationSelection {
            countries: self.countries.clone(),
            select_all: self.select_all,
            x_metrics: self.x_metrics.clone(),
            y_metrics: self.y_metrics.clone(),
        }
    }
}

impl RunCommand for CorrelationCommand {
    async fn run(&self, config: Config) -> CovidashCliResult<()> {
        info!("Running `correlation` subcommand");
        let selection = self.selection();
        debug!("{selection:?}");
        let covidash = load(config, self.quiet).await?;
        if selection.selector_disabled() {
            eprintln!(
                "Country selector disabled: all {} countries selected",
                covidash.catalog.countries.len()
            );
        }

        if self.output.sql {
            let today = Local::now().date_naive();
            match CrossSectionRequest::from_selection(&selection, &covidash.catalog, today)? {
                Update::Ready(request) => print!("{}", request.to_sql()),
                Update::Skipped => println!("{SKIPPED_STRING}"),
            }
            return Ok(());
        }

        match covidash.correlation(&selection).await? {
            Update::Ready(view) => {
                let title = view
                    .figure
                    .layout
                    .title
                    .as_ref()
                    .and_then(|title| title.text.clone())
                    .unwrap_or_default();
                self.output.emit(&view.figure, view.table, title)
            }
            Update::Skipped => {
                println!("{SKIPPED_STRING}");
                Ok(())
            }
        }
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Covidash draws the pandemic statistics dashboard's charts from the command line", long_about = None, name="covidash")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
    #[arg(
        long = "data-path",
        help = "Directory holding the data tables, overriding the config file",
        global = true
    )]
    pub data_path: Option<String>,
}

/// Commands contains the list of subcommands available for use in the CLI.
/// Each command should implement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// List countries that can be selected
    Countries(CountriesCommand),
    /// List the metrics available to each view
    Metrics(MetricsCommand),
    /// Plot smoothed metrics over time for the selected countries
    TimeSeries(TimeSeriesCommand),
    /// Plot one metric against another across countries
    Correlation(CorrelationCommand),
}
