//! Typed nullable columns with type inference from raw CSV cells.

use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int64,
    Float64,
    Bool,
    Text,
    DateTime,
}

impl DataType {
    /// Semantic name used in schema summaries shown to the model.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int64 => "integer",
            DataType::Float64 => "float",
            DataType::Bool => "boolean",
            DataType::Text => "text",
            DataType::DateTime => "datetime",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
    DateTime(Vec<Option<NaiveDateTime>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int64(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::DateTime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Column::Int64(_) => DataType::Int64,
            Column::Float64(_) => DataType::Float64,
            Column::Bool(_) => DataType::Bool,
            Column::Text(_) => DataType::Text,
            Column::DateTime(_) => DataType::DateTime,
        }
    }

    /// String rendering of one cell, `None` for nulls or out-of-range indexes.
    pub fn cell_string(&self, index: usize) -> Option<String> {
        match self {
            Column::Int64(v) => v.get(index)?.map(|x| x.to_string()),
            Column::Float64(v) => v.get(index)?.map(|x| x.to_string()),
            Column::Bool(v) => v.get(index)?.map(|x| x.to_string()),
            Column::Text(v) => v.get(index)?.clone(),
            Column::DateTime(v) => v.get(index)?.map(|x| x.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// Builds a column from raw string cells, inferring the narrowest type
    /// that fits every non-null value. Falls back to text when values are
    /// mixed, the way a loader should rather than erroring out.
    pub fn from_strings(values: &[Option<String>]) -> Column {
        let sample = values
            .iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty());
        let Some(sample) = sample else {
            return Column::Text(values.to_vec());
        };

        if sample.parse::<f64>().is_ok() {
            if let Some(ints) = try_parse_all(values, |s| s.parse::<i64>().ok()) {
                return Column::Int64(ints);
            }
            if let Some(floats) = try_parse_all(values, |s| s.parse::<f64>().ok()) {
                return Column::Float64(floats);
            }
        }
        if parse_bool(sample).is_some() {
            if let Some(bools) = try_parse_all(values, parse_bool) {
                return Column::Bool(bools);
            }
        }
        Column::Text(values.to_vec())
    }
}

/// `Some` only if every non-null value parses; nulls stay nulls.
fn try_parse_all<T>(
    values: &[Option<String>],
    parse: impl Fn(&str) -> Option<T>,
) -> Option<Vec<Option<T>>> {
    values
        .iter()
        .map(|cell| match cell.as_deref().map(str::trim) {
            None | Some("") => Some(None),
            Some(s) => parse(s).map(Some),
        })
        .collect()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Some(true),
        "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Lenient datetime parsing against a fixed format list, date-only formats
/// normalized to midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d"];

    let s = s.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}
