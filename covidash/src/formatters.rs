use std::io::{Cursor, Write};

use anyhow::Result;
use enum_dispatch::enum_dispatch;
use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use serde::{Deserialize, Serialize};

use crate::chart::Figure;

/// Plotly.js bundle loaded by the standalone HTML page.
pub const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.27.0.min.js";

/// Trait to define different output generators for a chart specification. `save` writes the
/// figure to a writer and `format` renders it to a string.
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, figure: &Figure) -> Result<()>;
    fn format(&self, figure: &Figure) -> Result<String> {
        let mut data: Vec<u8> = vec![];
        let mut buff = Cursor::new(&mut data);
        self.save(&mut buff, figure)?;

        Ok(String::from_utf8(data)?)
    }
}

/// Enum of formatters, one for each way a figure can be handed to the renderer.
#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    Json(JsonFormatter),
    Html(HtmlFormatter),
}

/// The figure as Plotly JSON (`{"data": [...], "layout": {...}}`).
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl OutputGenerator for JsonFormatter {
    fn save(&self, writer: &mut impl Write, figure: &Figure) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *writer, figure)?;
        } else {
            serde_json::to_writer(&mut *writer, figure)?;
        }
        writeln!(writer)?;
        Ok(())
    }
}

/// A standalone page that loads Plotly.js and draws the figure.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct HtmlFormatter {
    pub title: Option<String>,
}

impl OutputGenerator for HtmlFormatter {
    fn save(&self, writer: &mut impl Write, figure: &Figure) -> Result<()> {
        // A literal `</` inside the inline script would close the tag early
        let figure_json = serde_json::to_string(figure)?.replace("</", "<\\/");
        let title = self
            .title
            .as_deref()
            .unwrap_or("covidash")
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        write!(
            writer,
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="{PLOTLY_CDN}"></script>
</head>
<body>
<div id="chart"></div>
<script>
const figure = {figure_json};
Plotly.newPlot("chart", figure.data, figure.layout);
</script>
</body>
</html>
"#
        )?;
        Ok(())
    }
}

/// Writes a table (typically the smoothed wide table) as CSV with a header row.
pub fn write_table_csv(writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
    CsvWriter::new(writer).include_header(true).finish(df)?;
    Ok(())
}
