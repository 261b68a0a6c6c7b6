//! Loading periodic survey extracts into [`MicroRecord`]s.
//!
//! A source is accepted only if its header exposes every required column.
//! Rejected sources are reported and skipped; the run fails only when no
//! source is accepted.

use encoding_rs::{Encoding, WINDOWS_1252};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::category::Dimension;
use crate::error::{PipelineError, Result};
use crate::parser::{decode_field, parse_code, parse_domain, parse_income, parse_number, parse_quarter};
use crate::record::{MicroRecord, Period};

/// Column names of a survey extract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractSchema {
    pub year: String,
    pub quarter: String,
    pub domain: String,
    pub income: String,
    /// Weight columns in order of preference; the first one present is used.
    pub weight: Vec<String>,
    pub age: String,
    pub sex: String,
    pub education: String,
    pub occupation: String,
    pub activity: String,
    /// Income codes meaning "no response".
    pub missing_income_codes: Vec<f64>,
}

impl Default for ExtractSchema {
    fn default() -> Self {
        Self {
            year: "ANO4".to_string(),
            quarter: "TRIMESTRE".to_string(),
            domain: "AGLOMERADO".to_string(),
            income: "P47T".to_string(),
            weight: vec!["PONDII".to_string(), "PONDERA".to_string()],
            age: "CH06".to_string(),
            sex: "CH04".to_string(),
            education: "NIVEL_ED".to_string(),
            occupation: "PP04B_COD".to_string(),
            activity: "ESTADO".to_string(),
            missing_income_codes: vec![-9.0],
        }
    }
}

/// Raw covariates a run may require a source to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Covariate {
    Age,
    Sex,
    Education,
    Occupation,
    Activity,
}

impl Covariate {
    pub fn for_dimension(dimension: Dimension) -> Self {
        match dimension {
            Dimension::Sex => Covariate::Sex,
            Dimension::Education => Covariate::Education,
            Dimension::AgeBand => Covariate::Age,
            Dimension::Occupation => Covariate::Occupation,
        }
    }

    fn column<'a>(&self, schema: &'a ExtractSchema) -> &'a str {
        match self {
            Covariate::Age => &schema.age,
            Covariate::Sex => &schema.sex,
            Covariate::Education => &schema.education,
            Covariate::Occupation => &schema.occupation,
            Covariate::Activity => &schema.activity,
        }
    }
}

/// Field separator and text encoding of the extracts.
#[derive(Debug, Clone, Copy)]
pub struct ExtractFormat {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
}

impl Default for ExtractFormat {
    fn default() -> Self {
        Self {
            delimiter: b';',
            encoding: WINDOWS_1252,
        }
    }
}

impl ExtractFormat {
    /// Builds a format from a one-byte delimiter and a WHATWG encoding label
    /// such as `latin1` or `utf-8`.
    pub fn from_labels(delimiter: &str, encoding: &str) -> Result<Self> {
        let delimiter = match delimiter.as_bytes() {
            [b] => *b,
            _ if delimiter == "\\t" => b'\t',
            _ => {
                return Err(PipelineError::Config(format!(
                    "delimiter must be a single byte, got '{delimiter}'"
                )));
            }
        };
        let encoding = Encoding::for_label(encoding.as_bytes()).ok_or_else(|| {
            PipelineError::Config(format!("unknown text encoding '{encoding}'"))
        })?;
        Ok(Self {
            delimiter,
            encoding,
        })
    }
}

/// Why a source was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    MissingFields { fields: Vec<String> },
    Unreadable { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRejection {
    pub source: String,
    pub reason: RejectionReason,
}

impl SourceRejection {
    fn missing(source: &str, fields: Vec<String>) -> Self {
        Self {
            source: source.to_string(),
            reason: RejectionReason::MissingFields { fields },
        }
    }

    fn unreadable(source: &str, err: impl fmt::Display) -> Self {
        Self {
            source: source.to_string(),
            reason: RejectionReason::Unreadable {
                message: err.to_string(),
            },
        }
    }
}

impl fmt::Display for SourceRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            RejectionReason::MissingFields { fields } => write!(
                f,
                "{}: missing required fields {}",
                self.source,
                fields.join(", ")
            ),
            RejectionReason::Unreadable { message } => {
                write!(f, "{}: unreadable ({})", self.source, message)
            }
        }
    }
}

/// Per-source load counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AcceptedSource {
    pub source: String,
    pub rows: usize,
    pub records: usize,
    /// Rows dropped because year, quarter or domain did not parse.
    pub rows_without_key: usize,
    /// Records whose income was blank, non-numeric, or a no-response code.
    pub income_missing: usize,
    pub weight_column: String,
}

/// One accepted source's records.
#[derive(Debug, Clone)]
pub struct Extract {
    pub records: Vec<MicroRecord>,
    pub summary: AcceptedSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub accepted: Vec<AcceptedSource>,
    pub rejected: Vec<SourceRejection>,
}

impl LoadReport {
    pub fn supplied(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }

    pub fn total_records(&self) -> usize {
        self.accepted.iter().map(|a| a.records).sum()
    }
}

#[derive(Debug, Clone)]
pub struct LoadedRecords {
    pub records: Vec<MicroRecord>,
    pub report: LoadReport,
}

struct ColumnIndex {
    year: usize,
    quarter: usize,
    domain: usize,
    income: usize,
    weight: usize,
    weight_name: String,
    age: Option<usize>,
    sex: Option<usize>,
    education: Option<usize>,
    occupation: Option<usize>,
    activity: Option<usize>,
}

impl ColumnIndex {
    /// Locates every column; `Err` lists the required ones that are absent.
    fn resolve(
        headers: &[String],
        schema: &ExtractSchema,
        needs: &[Covariate],
    ) -> std::result::Result<Self, Vec<String>> {
        let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let mut missing = Vec::new();

        let mut required = |name: &str| {
            let idx = find(name);
            if idx.is_none() {
                missing.push(name.to_string());
            }
            idx
        };
        let year = required(&schema.year);
        let quarter = required(&schema.quarter);
        let domain = required(&schema.domain);
        let income = required(&schema.income);

        let weight = schema
            .weight
            .iter()
            .find_map(|name| find(name).map(|idx| (idx, name.clone())));
        if weight.is_none() {
            missing.push(schema.weight.join("|"));
        }

        for need in needs {
            let name = need.column(schema);
            if find(name).is_none() && !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
        }

        match (year, quarter, domain, income, weight) {
            (Some(year), Some(quarter), Some(domain), Some(income), Some((weight, weight_name)))
                if missing.is_empty() =>
            {
                Ok(Self {
                    year,
                    quarter,
                    domain,
                    income,
                    weight,
                    weight_name,
                    age: find(&schema.age),
                    sex: find(&schema.sex),
                    education: find(&schema.education),
                    occupation: find(&schema.occupation),
                    activity: find(&schema.activity),
                })
            }
            _ => Err(missing),
        }
    }
}

/// Parses one extract.
///
/// # Errors
///
/// Returns a [`SourceRejection`] if the header lacks a required column or the
/// data cannot be read as delimited text. Bad individual cells never reject
/// the source.
pub fn read_extract<R: Read>(
    source: &str,
    reader: R,
    schema: &ExtractSchema,
    format: &ExtractFormat,
    needs: &[Covariate],
) -> std::result::Result<Extract, SourceRejection> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(format.delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .byte_headers()
        .map_err(|e| SourceRejection::unreadable(source, e))?
        .iter()
        .map(|h| {
            decode_field(h, format.encoding)
                .trim()
                .trim_start_matches('\u{feff}')
                .to_string()
        })
        .collect();

    let columns = ColumnIndex::resolve(&headers, schema, needs)
        .map_err(|missing| SourceRejection::missing(source, missing))?;

    let source_name: Arc<str> = Arc::from(source);
    let mut summary = AcceptedSource {
        source: source.to_string(),
        weight_column: columns.weight_name.clone(),
        ..Default::default()
    };
    let mut records = Vec::new();
    let mut row = csv::ByteRecord::new();

    while rdr
        .read_byte_record(&mut row)
        .map_err(|e| SourceRejection::unreadable(source, e))?
    {
        summary.rows += 1;

        let cell = |idx: usize| {
            row.get(idx)
                .map(|b| decode_field(b, format.encoding))
                .unwrap_or_default()
        };
        let optional_code = |idx: Option<usize>| idx.and_then(|i| parse_code(&cell(i)));

        let year = parse_code(&cell(columns.year));
        let quarter = parse_quarter(&cell(columns.quarter));
        let domain = parse_domain(&cell(columns.domain));
        let (Some(year), Some(quarter), Some(domain)) = (year, quarter, domain) else {
            summary.rows_without_key += 1;
            continue;
        };

        let income = parse_income(&cell(columns.income), &schema.missing_income_codes);
        if income.is_none() {
            summary.income_missing += 1;
        }

        records.push(MicroRecord {
            source: Arc::clone(&source_name),
            period: Period::new(year, quarter),
            domain,
            income,
            weight: parse_number(&cell(columns.weight)),
            age: optional_code(columns.age),
            sex: optional_code(columns.sex),
            education: optional_code(columns.education),
            occupation: optional_code(columns.occupation),
            activity: optional_code(columns.activity),
        });
    }

    summary.records = records.len();
    Ok(Extract { records, summary })
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Opens and parses one extract file, decompressing `.gz` files.
pub fn read_extract_file(
    path: &Path,
    schema: &ExtractSchema,
    format: &ExtractFormat,
    needs: &[Covariate],
) -> std::result::Result<Extract, SourceRejection> {
    let name = source_name(path);
    let file = File::open(path).map_err(|e| SourceRejection::unreadable(&name, e))?;

    let reader: Box<dyn Read> = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    read_extract(&name, reader, schema, format, needs)
}

/// Replaces directories with the extract files they contain (`.txt`, `.csv`,
/// `.gz`), sorted by name. Plain file paths pass through unchanged.
pub fn expand_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut expanded = Vec::new();

    for path in paths {
        if !path.is_dir() {
            expanded.push(path.clone());
            continue;
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let p = entry.path();
            let is_extract = matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("txt" | "csv" | "gz")
            );
            if entry.file_type()?.is_file() && is_extract {
                files.push(p);
            }
        }
        files.sort();
        debug!(dir = %path.display(), files = files.len(), "Expanded source directory");
        expanded.extend(files);
    }

    Ok(expanded)
}

/// Concatenates per-source results, logging every rejection.
///
/// # Errors
///
/// [`PipelineError::NoValidSources`] if nothing was accepted.
pub fn combine(
    results: Vec<std::result::Result<Extract, SourceRejection>>,
) -> Result<LoadedRecords> {
    let mut records = Vec::new();
    let mut report = LoadReport::default();

    for result in results {
        match result {
            Ok(extract) => {
                info!(
                    source = %extract.summary.source,
                    rows = extract.summary.rows,
                    records = extract.summary.records,
                    income_missing = extract.summary.income_missing,
                    weight_column = %extract.summary.weight_column,
                    "Source accepted"
                );
                records.extend(extract.records);
                report.accepted.push(extract.summary);
            }
            Err(rejection) => {
                warn!(source = %rejection.source, reason = ?rejection.reason, "Source skipped");
                report.rejected.push(rejection);
            }
        }
    }

    if report.accepted.is_empty() {
        return Err(PipelineError::NoValidSources {
            supplied: report.supplied(),
            rejected: report.rejected.len(),
        });
    }

    info!(
        accepted = report.accepted.len(),
        rejected = report.rejected.len(),
        records = records.len(),
        "Sources loaded"
    );
    Ok(LoadedRecords { records, report })
}

/// Loads sources one after another.
#[tracing::instrument(skip_all, fields(sources = paths.len()))]
pub fn load_sources(
    paths: &[PathBuf],
    schema: &ExtractSchema,
    format: &ExtractFormat,
    needs: &[Covariate],
) -> Result<LoadedRecords> {
    let results = paths
        .iter()
        .map(|p| read_extract_file(p, schema, format, needs))
        .collect();
    combine(results)
}

/// Loads sources in parallel, at most `concurrency` at a time.
///
/// Results are combined in input order, so the output matches
/// [`load_sources`].
#[tracing::instrument(skip_all, fields(sources = paths.len(), concurrency = concurrency))]
pub async fn load_sources_concurrent(
    paths: Vec<PathBuf>,
    schema: ExtractSchema,
    format: ExtractFormat,
    needs: Vec<Covariate>,
    concurrency: usize,
) -> Result<LoadedRecords> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let schema = Arc::new(schema);
    let needs: Arc<[Covariate]> = Arc::from(needs);

    let mut tasks = Vec::with_capacity(paths.len());
    for path in paths {
        let name = source_name(&path);
        let sem = Arc::clone(&semaphore);
        let schema = Arc::clone(&schema);
        let needs = Arc::clone(&needs);

        let task = tokio::spawn(async move {
            let permit = match sem.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return Ok(Err(SourceRejection::unreadable(&source_name(&path), e))),
            };
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                read_extract_file(&path, &schema, &format, &needs)
            })
            .await
        });
        tasks.push((name, task));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for (name, task) in tasks {
        results.push(settle(&name, task.await));
    }

    combine(results)
}

type Joined<T> = std::result::Result<T, tokio::task::JoinError>;

/// Turns a failed or panicked read task into a rejection of its source.
fn settle(
    source: &str,
    joined: Joined<Joined<std::result::Result<Extract, SourceRejection>>>,
) -> std::result::Result<Extract, SourceRejection> {
    match joined.and_then(|inner| inner) {
        Ok(result) => result,
        Err(e) => {
            error!(source, error = %e, "Read task failed");
            Err(SourceRejection::unreadable(source, e))
        }
    }
}
