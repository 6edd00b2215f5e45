// src/export/csv.rs
//
// Flat `(url, fieldName, fieldType, value)` rows with RFC 4180 quoting.

use crate::model::{FieldValue, ScrapeResult};
use crate::utils::error::ExportError;

pub const HEADER: [&str; 4] = ["url", "fieldName", "fieldType", "value"];

/// Separator for `list` values inside a single cell.
pub const LIST_DELIMITER: &str = "; ";

/// Field type written for a failed URL; the value column carries the message.
pub const ERROR_FIELD_TYPE: &str = "error";

pub fn to_csv(results: &[ScrapeResult]) -> String {
    let mut out = String::new();
    write_row(&mut out, &HEADER);
    for result in results {
        if let Some(error) = &result.error {
            write_row(&mut out, &[&result.url, "", ERROR_FIELD_TYPE, error]);
            continue;
        }
        for record in &result.records {
            for (name, value) in record.iter() {
                let cell = match value {
                    FieldValue::Scalar(s) => s.clone(),
                    FieldValue::List(items) => items.join(LIST_DELIMITER),
                };
                write_row(&mut out, &[&result.url, name, value.kind(), &cell]);
            }
        }
    }
    out
}

fn write_row(out: &mut String, cells: &[&str]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape(cell));
    }
    out.push_str("\r\n");
}

pub fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\r', '\n']) || cell.starts_with(' ') || cell.ends_with(' ') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Parses CSV text back into rows of cells.
pub fn parse_rows(input: &str) -> Result<Vec<Vec<String>>, ExportError> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                other => cell.push(other),
            }
            continue;
        }
        match c {
            '"' if cell.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut cell)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            other => cell.push(other),
        }
    }
    if in_quotes {
        return Err(ExportError::Parse {
            format: "csv",
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !cell.is_empty() || !row.is_empty() {
        row.push(cell);
        rows.push(row);
    }
    Ok(rows)
}
