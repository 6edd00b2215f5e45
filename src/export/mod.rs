// src/export/mod.rs
//
// Serializes accumulated results. Pure: writing the output somewhere is the caller's job.

pub mod csv;
pub mod sql;

use crate::model::ScrapeResult;
use crate::utils::error::ExportError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
    SqlInsert { table: String },
    VectorReady,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::SqlInsert { .. } => "sql",
            ExportFormat::VectorReady => "vector.json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json | ExportFormat::VectorReady => "application/json",
            ExportFormat::Csv => "text/csv",
            ExportFormat::SqlInsert { .. } => "application/sql",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => f.write_str("json"),
            ExportFormat::Csv => f.write_str("csv"),
            ExportFormat::SqlInsert { .. } => f.write_str("sql-insert"),
            ExportFormat::VectorReady => f.write_str("vector-ready"),
        }
    }
}

/// `json`, `csv`, `sql`/`sql-insert` (default table) or `vector`/`vector-ready`.
impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "sql" | "sql-insert" => Ok(ExportFormat::SqlInsert {
                table: sql::DEFAULT_TABLE.to_string(),
            }),
            "vector" | "vector-ready" => Ok(ExportFormat::VectorReady),
            other => Err(ExportError::Parse {
                format: "format name",
                reason: format!("unknown export format '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutput {
    pub content: String,
    pub file_name: String,
    pub mime_type: &'static str,
}

#[derive(Serialize)]
struct VectorEnvelope<'a> {
    format: &'static str,
    documents: &'a [ScrapeResult],
}

pub fn export_as(results: &[ScrapeResult], format: &ExportFormat) -> Result<ExportOutput, ExportError> {
    export_at(results, format, Utc::now())
}

/// Same as [`export_as`] with an explicit timestamp for the file name.
pub fn export_at(
    results: &[ScrapeResult],
    format: &ExportFormat,
    now: DateTime<Utc>,
) -> Result<ExportOutput, ExportError> {
    let content = match format {
        ExportFormat::Json => serde_json::to_string_pretty(results)?,
        ExportFormat::Csv => csv::to_csv(results),
        ExportFormat::SqlInsert { table } => sql::to_sql(results, table)?,
        ExportFormat::VectorReady => serde_json::to_string_pretty(&VectorEnvelope {
            format: "vector-ready",
            documents: results,
        })?,
    };
    tracing::debug!("Exported {} results as {} ({} bytes)", results.len(), format, content.len());
    Ok(ExportOutput {
        content,
        file_name: file_name(format, now),
        mime_type: format.mime_type(),
    })
}

pub fn file_name(format: &ExportFormat, now: DateTime<Utc>) -> String {
    format!("scrape-results-{}.{}", now.format("%Y%m%d-%H%M%S"), format.extension())
}
