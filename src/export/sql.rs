// src/export/sql.rs
use crate::model::{FieldValue, ScrapeResult, ScrapedRecord};
use crate::utils::error::ExportError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("Failed to compile TABLE_NAME_RE"));

pub const DEFAULT_TABLE: &str = "scraped_data";

const COLUMNS: &str = "url, record_index, field_name, field_type, value, scraped_at";

/// Marker rows carry `record_index = -1`: one per failed URL (value is the message)
/// and one per successful URL that produced no records.
const MARKER_INDEX: i64 = -1;
const ERROR_TYPE: &str = "error";
const EMPTY_TYPE: &str = "empty";

pub fn to_sql(results: &[ScrapeResult], table: &str) -> Result<String, ExportError> {
    if !TABLE_NAME_RE.is_match(table) {
        return Err(ExportError::InvalidTableName(table.to_string()));
    }

    let mut out = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  url TEXT NOT NULL,\n  record_index INTEGER NOT NULL,\n  \
         field_name TEXT NOT NULL,\n  field_type TEXT NOT NULL,\n  value TEXT,\n  scraped_at TEXT NOT NULL\n);\n",
        table
    );
    for result in results {
        let scraped_at = result.timestamp.to_rfc3339();
        if let Some(error) = &result.error {
            out.push_str(&insert(table, &result.url, MARKER_INDEX, "", ERROR_TYPE, error, &scraped_at));
            continue;
        }
        if result.records.is_empty() {
            out.push_str(&insert(table, &result.url, MARKER_INDEX, "", EMPTY_TYPE, "", &scraped_at));
            continue;
        }
        for (index, record) in result.records.iter().enumerate() {
            for (name, value) in record.iter() {
                let stored = match value {
                    FieldValue::Scalar(s) => s.clone(),
                    FieldValue::List(items) => serde_json::to_string(items)?,
                };
                out.push_str(&insert(
                    table,
                    &result.url,
                    index as i64,
                    name,
                    value.kind(),
                    &stored,
                    &scraped_at,
                ));
            }
        }
    }
    Ok(out)
}

fn insert(table: &str, url: &str, index: i64, name: &str, kind: &str, value: &str, scraped_at: &str) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({}, {}, {}, {}, {}, {});\n",
        table,
        COLUMNS,
        quote(url),
        index,
        quote(name),
        quote(kind),
        quote(value),
        quote(scraped_at)
    )
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Rebuilds the results from statements produced by [`to_sql`]. Every URL comes
/// back, failed ones with their error message and no records.
pub fn parse_inserts(sql: &str) -> Result<Vec<ScrapeResult>, ExportError> {
    let mut pages: Vec<ScrapeResult> = Vec::new();
    let mut rest = sql;

    while let Some(start) = rest.find("VALUES (") {
        let (values, consumed) = parse_tuple(&rest[start + "VALUES (".len()..])?;
        rest = &rest[start + "VALUES (".len() + consumed..];

        let [url, index, name, kind, value, scraped_at]: [SqlValue; 6] = values
            .try_into()
            .map_err(|v: Vec<SqlValue>| parse_error(format!("expected 6 values, got {}", v.len())))?;
        let url = url.into_text()?;
        let timestamp = DateTime::parse_from_rfc3339(&scraped_at.into_text()?)
            .map_err(|e| parse_error(format!("bad scraped_at: {}", e)))?
            .with_timezone(&Utc);

        let same_page = pages
            .last()
            .map(|page| page.url == url && page.timestamp == timestamp)
            .unwrap_or(false);
        if !same_page {
            pages.push(ScrapeResult {
                url,
                records: Vec::new(),
                timestamp,
                error: None,
            });
        }
        let page = match pages.last_mut() {
            Some(page) => page,
            None => continue,
        };

        let name = name.into_text()?;
        let kind = kind.into_text()?;
        let value = value.into_text()?;
        let index = match index {
            SqlValue::Integer(i) if i >= 0 => i as usize,
            SqlValue::Integer(_) => {
                if kind == ERROR_TYPE {
                    page.error = Some(value);
                }
                continue;
            }
            SqlValue::Text(t) => return Err(parse_error(format!("expected record_index, found '{}'", t))),
        };
        let field = match kind.as_str() {
            "list" => FieldValue::List(serde_json::from_str(&value).map_err(|e| parse_error(e.to_string()))?),
            _ => FieldValue::Scalar(value),
        };
        while page.records.len() <= index {
            page.records.push(ScrapedRecord::new());
        }
        page.records[index].insert(name, field);
    }
    Ok(pages)
}

#[derive(Debug)]
enum SqlValue {
    Text(String),
    Integer(i64),
}

impl SqlValue {
    fn into_text(self) -> Result<String, ExportError> {
        match self {
            SqlValue::Text(s) => Ok(s),
            SqlValue::Integer(i) => Err(parse_error(format!("expected text, found {}", i))),
        }
    }
}

// Parses `'a', 1, 'b''c')` and returns the values plus bytes consumed (closing paren included).
fn parse_tuple(input: &str) -> Result<(Vec<SqlValue>, usize), ExportError> {
    let mut values = Vec::new();
    let mut chars = input.char_indices().peekable();

    loop {
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        match chars.next() {
            Some((_, '\'')) => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\'')) if matches!(chars.peek(), Some((_, '\''))) => {
                            chars.next();
                            text.push('\'');
                        }
                        Some((_, '\'')) => break,
                        Some((_, c)) => text.push(c),
                        None => return Err(parse_error("unterminated string literal".to_string())),
                    }
                }
                values.push(SqlValue::Text(text));
            }
            Some((_, ')')) => return Ok((values, consumed_through(input, &mut chars))),
            Some((_, c)) if c == '-' || c.is_ascii_digit() => {
                let mut number = c.to_string();
                while let Some((_, d)) = chars.peek().filter(|(_, d)| d.is_ascii_digit()) {
                    number.push(*d);
                    chars.next();
                }
                let n = number.parse().map_err(|_| parse_error(format!("bad integer '{}'", number)))?;
                values.push(SqlValue::Integer(n));
            }
            Some((i, c)) => return Err(parse_error(format!("unexpected '{}' at offset {}", c, i))),
            None => return Err(parse_error("unterminated VALUES tuple".to_string())),
        }
    }
}

fn consumed_through(input: &str, chars: &mut std::iter::Peekable<std::str::CharIndices>) -> usize {
    chars.peek().map(|(i, _)| *i).unwrap_or(input.len())
}

fn parse_error(reason: String) -> ExportError {
    ExportError::Parse { format: "sql", reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ScrapeResult> {
        let mut first = ScrapedRecord::new();
        first.insert("title", "O'Brien's \"shop\"");
        first.insert("tags", vec!["a".to_string(), "it's".to_string()]);
        let mut second = ScrapedRecord::new();
        second.insert("title", "VALUES (tricky)\nmultiline");
        vec![
            ScrapeResult::success("https://a.test", vec![first, second]),
            ScrapeResult::failure("https://b.test", "boom"),
            ScrapeResult::success("https://c.test", vec![]),
        ]
    }

    #[test]
    fn test_round_trip_restores_record_shape() {
        let results = sample();
        let sql = to_sql(&results, "products").unwrap();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS products"));
        assert!(sql.contains("'O''Brien''s \"shop\"'"));

        let parsed = parse_inserts(&sql).unwrap();
        assert_eq!(parsed, results);
    }

    #[test]
    fn test_empty_and_failed_pages_survive() {
        let results = vec![
            ScrapeResult::success("https://empty.test", vec![]),
            ScrapeResult::failure("https://down.test", "proxy said 'no'"),
        ];
        let sql = to_sql(&results, DEFAULT_TABLE).unwrap();
        assert!(sql.contains("-1, '', 'empty', ''"));

        let parsed = parse_inserts(&sql).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].url, "https://empty.test");
        assert!(parsed[0].records.is_empty() && parsed[0].error.is_none());
        assert_eq!(parsed[1].error.as_deref(), Some("proxy said 'no'"));
    }

    #[test]
    fn test_rejects_unsafe_table_names() {
        for bad in ["", "1table", "t; DROP TABLE x", "my-table", "\"q\""] {
            assert!(
                matches!(to_sql(&[], bad), Err(ExportError::InvalidTableName(_))),
                "{} accepted",
                bad
            );
        }
        assert!(to_sql(&[], DEFAULT_TABLE).is_ok());
    }
}
