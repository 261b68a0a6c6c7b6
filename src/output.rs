//! Output formatting and persistence for run results.
//!
//! Tables are written as CSV with stable headers, the run report as JSON.
//! Any path ending in `.gz` is gzip-compressed.

use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analyzers::analyzer::RunOutput;
use crate::analyzers::types::{LaborRow, RunReport, SummaryRow, SummaryTable};
use crate::error::Result;
use crate::record::PeriodKey;
use crate::stats::{Distribution, quantile_label};

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = BufWriter::new(File::create(path)?);
        if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            Ok(Sink::Gzip(GzEncoder::new(file, Compression::default())))
        } else {
            Ok(Sink::Plain(file))
        }
    }

    fn finish(self) -> io::Result<()> {
        match self {
            Sink::Plain(mut w) => w.flush(),
            Sink::Gzip(enc) => enc.finish()?.flush(),
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
        }
    }
}

/// Logs a table using Rust's debug pretty-print format.
pub fn print_pretty(table: &SummaryTable) {
    debug!("{:#?}", table);
}

/// Logs the run report as pretty-printed JSON.
pub fn print_json(report: &RunReport) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn period_cells(period: &PeriodKey) -> [String; 2] {
    [
        period.year.to_string(),
        period.quarter.map(|q| q.to_string()).unwrap_or_default(),
    ]
}

/// Configured levels written after the fixed median column.
fn extra_levels(table: &SummaryTable) -> impl Iterator<Item = f64> + '_ {
    table.quantiles.iter().copied().filter(|q| *q != 0.5)
}

fn distribution_cells(dist: Option<&Distribution>, table: &SummaryTable, cells: &mut Vec<String>) {
    match dist {
        Some(d) => {
            cells.push(d.respondents.to_string());
            cells.push(d.weight_total.to_string());
            cells.push(d.mean.to_string());
            cells.push(d.median.to_string());
            for level in extra_levels(table) {
                cells.push(d.quantile(level).map(|v| v.to_string()).unwrap_or_default());
            }
        }
        None => cells.extend(std::iter::repeat_n(
            String::new(),
            extra_levels(table).count() + 4,
        )),
    }
}

/// Column names of a summary table, in write order.
///
/// Every distribution gets respondents, weight total, mean and median
/// columns, then one column per other configured quantile level.
pub fn summary_headers(table: &SummaryTable) -> Vec<String> {
    let mut headers: Vec<String> = vec![
        "domain".into(),
        "domain_label".into(),
        "year".into(),
        "quarter".into(),
    ];
    if let Some(d) = table.dimension {
        headers.push(d.name().to_string());
    }
    for suffix in ["nominal", "real"] {
        headers.push(format!("respondents_{suffix}"));
        headers.push(format!("weight_total_{suffix}"));
        headers.push(format!("mean_{suffix}"));
        headers.push(format!("median_{suffix}"));
        for level in extra_levels(table) {
            headers.push(format!("{}_{suffix}", quantile_label(level)));
        }
    }
    headers
}

fn summary_cells(table: &SummaryTable, row: &SummaryRow) -> Vec<String> {
    let mut cells = vec![row.domain.to_string(), row.domain_label.to_string()];
    cells.extend(period_cells(&row.period));
    if table.dimension.is_some() {
        cells.push(row.category.map(|c| c.name().to_string()).unwrap_or_default());
    }
    distribution_cells(Some(&row.nominal), table, &mut cells);
    distribution_cells(row.real.as_ref(), table, &mut cells);
    cells
}

/// Writes one summary table as CSV. Real columns are empty for rows without
/// a real distribution.
pub fn write_summary_csv(path: &Path, table: &SummaryTable) -> Result<()> {
    debug!(path = %path.display(), rows = table.rows.len(), "Writing summary table");
    let mut writer = WriterBuilder::new().from_writer(Sink::create(path)?);

    writer.write_record(summary_headers(table))?;
    for row in &table.rows {
        writer.write_record(summary_cells(table, row))?;
    }

    writer.flush()?;
    finish(writer)
}

/// Writes labor-force rates as CSV.
pub fn write_labor_csv(path: &Path, rows: &[LaborRow]) -> Result<()> {
    debug!(path = %path.display(), rows = rows.len(), "Writing labor rates");
    let mut writer = WriterBuilder::new().from_writer(Sink::create(path)?);

    writer.write_record([
        "domain",
        "domain_label",
        "year",
        "quarter",
        "respondents",
        "activity_rate",
        "employment_rate",
        "unemployment_rate",
    ])?;
    for row in rows {
        let [year, quarter] = period_cells(&row.period);
        writer.write_record([
            row.domain.to_string(),
            row.domain_label.to_string(),
            year,
            quarter,
            row.respondents.to_string(),
            row.activity_rate.to_string(),
            row.employment_rate.to_string(),
            row.unemployment_rate.map(|r| r.to_string()).unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    finish(writer)
}

/// Writes the run report as pretty JSON.
pub fn write_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let mut sink = Sink::create(path)?;
    serde_json::to_writer_pretty(&mut sink, report)?;
    sink.write_all(b"\n")?;
    sink.finish()?;
    Ok(())
}

fn finish(writer: csv::Writer<Sink>) -> Result<()> {
    let sink = writer
        .into_inner()
        .map_err(|e| io::Error::other(e.to_string()))?;
    sink.finish()?;
    Ok(())
}

/// Writes every table, the labor rates and `run_report.json` under `out_dir`.
///
/// Returns the written paths.
pub fn write_outputs(out_dir: &Path, output: &RunOutput, compress: bool) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let ext = if compress { "csv.gz" } else { "csv" };
    let mut written = Vec::new();

    for table in &output.tables {
        let path = out_dir.join(format!("{}.{}", table.name(), ext));
        write_summary_csv(&path, table)?;
        written.push(path);
    }

    if !output.labor.is_empty() {
        let path = out_dir.join(format!("labor_rates.{}", ext));
        write_labor_csv(&path, &output.labor)?;
        written.push(path);
    }

    let path = out_dir.join("run_report.json");
    write_report_json(&path, &output.report)?;
    written.push(path);

    info!(dir = %out_dir.display(), files = written.len(), "Outputs written");
    Ok(written)
}
