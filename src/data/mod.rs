//! Tabular dataset shared with generated scripts, and the CSV data source.

pub mod column;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Datelike;
use thiserror::Error;
use tracing::{debug, error};

pub use column::{parse_datetime, Column, DataType};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("column '{name}' has length {got}, dataset height is {want}")]
    LengthMismatch {
        name: String,
        got: usize,
        want: usize,
    },
}

/// In-memory frame of named, typed columns with uniform length.
///
/// Insertion order is preserved; the schema summary is emitted in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<(String, Column)>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn height(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Replaces the named column, or appends it if absent. Length must match
    /// the frame height unless the frame has no columns yet.
    pub fn set_column(&mut self, name: &str, column: Column) -> Result<(), DataError> {
        if self.width() > 0 && column.len() != self.height() {
            return Err(DataError::LengthMismatch {
                name: name.to_string(),
                got: column.len(),
                want: self.height(),
            });
        }
        match self.columns.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = column,
            None => self.columns.push((name.to_string(), column)),
        }
        Ok(())
    }

    /// "- name: type" lines, one per column, embedded verbatim into prompts.
    pub fn schema_text(&self) -> String {
        self.columns
            .iter()
            .map(|(n, c)| format!("- {}: {}", n, c.data_type().name()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Shared mutable handle to one run's dataset. Generated code mutates the
/// frame through this handle, so V1's derived columns are visible to V2.
#[derive(Debug, Clone, Default)]
pub struct FrameHandle(Arc<Mutex<Frame>>);

impl FrameHandle {
    pub fn new(frame: Frame) -> Self {
        Self(Arc::new(Mutex::new(frame)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Frame> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// External dataset loader seam: `None` means "no data available", which the
/// orchestrator turns into a `NoData` terminal result.
pub trait DataSource {
    fn load(&self) -> Result<Option<Frame>, DataError>;
}

pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DataSource for CsvSource {
    fn load(&self) -> Result<Option<Frame>, DataError> {
        if !self.path.exists() {
            error!(path = %self.path.display(), "csv file not found");
            return Ok(None);
        }
        debug!(path = %self.path.display(), "loading data from csv");
        load_csv(&self.path).map(Some)
    }
}

/// Loads a CSV file into a typed frame: header names are lower-cased and
/// trimmed, empty cells become nulls, and a `date` column (if present) is
/// parsed to datetime with derived `quarter`/`month`/`year` columns appended.
pub fn load_csv(path: &Path) -> Result<Frame, DataError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, field) in record.iter().enumerate().take(headers.len()) {
            let field = field.trim();
            cells[i].push((!field.is_empty()).then(|| field.to_string()));
        }
    }

    let mut frame = Frame::new();
    for (name, values) in headers.iter().zip(cells) {
        frame.set_column(name, Column::from_strings(&values))?;
    }
    prepare_dates(&mut frame)?;
    Ok(frame)
}

/// If a `date` column exists, re-parse it as datetime and derive integer
/// `quarter`, `month` and `year` columns. Unparseable dates become nulls and
/// the null propagates into the derived columns for that row.
fn prepare_dates(frame: &mut Frame) -> Result<(), DataError> {
    let Some(col) = frame.column("date") else {
        return Ok(());
    };
    let parsed: Vec<_> = (0..col.len())
        .map(|i| col.cell_string(i).as_deref().and_then(parse_datetime))
        .collect();

    let quarters = parsed
        .iter()
        .map(|d| d.map(|d| (d.month0() / 3 + 1) as i64))
        .collect();
    let months = parsed.iter().map(|d| d.map(|d| d.month() as i64)).collect();
    let years = parsed.iter().map(|d| d.map(|d| d.year() as i64)).collect();

    frame.set_column("date", Column::DateTime(parsed))?;
    frame.set_column("quarter", Column::Int64(quarters))?;
    frame.set_column("month", Column::Int64(months))?;
    frame.set_column("year", Column::Int64(years))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write csv");
        file
    }

    #[test]
    fn loads_csv_with_normalized_headers() {
        let file = write_csv(" Product , Amount \nespresso,3\nlatte,5\n");
        let frame = load_csv(file.path()).expect("load");
        assert_eq!(frame.names(), vec!["product", "amount"]);
        assert_eq!(
            frame.column("amount"),
            Some(&Column::Int64(vec![Some(3), Some(5)]))
        );
    }

    #[test]
    fn derives_quarter_month_year_from_date() {
        let file = write_csv("date,sales\n2024-02-10,100\n2025-08-01,200\n");
        let frame = load_csv(file.path()).expect("load");
        assert_eq!(
            frame.column("quarter"),
            Some(&Column::Int64(vec![Some(1), Some(3)]))
        );
        assert_eq!(
            frame.column("month"),
            Some(&Column::Int64(vec![Some(2), Some(8)]))
        );
        assert_eq!(
            frame.column("year"),
            Some(&Column::Int64(vec![Some(2024), Some(2025)]))
        );
    }

    #[test]
    fn unparseable_dates_propagate_nulls_into_derived_columns() {
        let file = write_csv("date,sales\n2024-02-10,100\nnot-a-date,200\n");
        let frame = load_csv(file.path()).expect("load");
        assert_eq!(
            frame.column("quarter"),
            Some(&Column::Int64(vec![Some(1), None]))
        );
        assert_eq!(
            frame.column("year"),
            Some(&Column::Int64(vec![Some(2024), None]))
        );
        match frame.column("date") {
            Some(Column::DateTime(values)) => assert!(values[1].is_none()),
            other => panic!("expected datetime column, got {other:?}"),
        }
    }

    #[test]
    fn set_column_rejects_length_mismatch() {
        let mut frame = Frame::new();
        frame
            .set_column("a", Column::Int64(vec![Some(1), Some(2)]))
            .expect("first column");
        let err = frame
            .set_column("b", Column::Int64(vec![Some(1)]))
            .expect_err("length mismatch");
        assert!(matches!(err, DataError::LengthMismatch { .. }));
    }

    #[test]
    fn schema_text_lists_columns_in_order() {
        let mut frame = Frame::new();
        frame
            .set_column("name", Column::Text(vec![Some("a".into())]))
            .expect("set");
        frame
            .set_column("count", Column::Int64(vec![Some(1)]))
            .expect("set");
        assert_eq!(frame.schema_text(), "- name: text\n- count: integer");
    }

    #[test]
    fn missing_csv_yields_none() {
        let source = CsvSource::new("/definitely/not/there.csv");
        assert!(source.load().expect("load").is_none());
    }
}
