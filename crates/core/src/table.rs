use std::io::Read;

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// One row keyed by column name.
pub type Record = Map<String, Value>;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("csv decode failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv export has no header row")]
    MissingHeader,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// A flat, column-ordered table. Cells are JSON values; `Null` marks a missing
/// cell until `fill_missing` runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Rows shorter than the header are padded with missing cells; longer rows
    /// are truncated.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Decodes a CSV export. A column is numeric when it has at least one
    /// non-empty cell and every non-empty cell parses as a number; missing
    /// cells are filled afterwards.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let columns = csv_reader
            .headers()?
            .iter()
            .map(|header| header.trim().to_string())
            .collect::<Vec<_>>();
        if columns.is_empty() || columns.iter().all(String::is_empty) {
            return Err(TableError::MissingHeader);
        }

        let mut raw_rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let mut cells = record.iter().map(str::to_string).collect::<Vec<_>>();
            cells.resize(columns.len(), String::new());
            raw_rows.push(cells);
        }

        let numeric_columns = (0..columns.len())
            .map(|index| {
                let mut present =
                    raw_rows.iter().map(|row| row[index].trim()).filter(|cell| !cell.is_empty()).peekable();
                present.peek().is_some() && present.all(|cell| parse_number(cell).is_some())
            })
            .collect::<Vec<_>>();

        let rows = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&numeric_columns)
                    .map(|(cell, numeric)| decode_cell(cell, *numeric))
                    .collect()
            })
            .collect();

        let mut table = Self::new(columns, rows);
        table.fill_missing();
        Ok(table)
    }

    pub fn from_csv_str(raw: &str) -> Result<Self, TableError> {
        Self::from_csv_reader(raw.as_bytes())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Numeric when at least one cell is present and every present cell is a
    /// number. An all-missing column is text.
    pub fn column_kind(&self, index: usize) -> ColumnKind {
        let mut present =
            self.rows.iter().filter_map(|row| row.get(index)).filter(|cell| !cell.is_null()).peekable();
        let numeric = present.peek().is_some() && present.all(Value::is_number);
        if numeric {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        }
    }

    /// Numeric columns get `0`, all others an empty string.
    pub fn fill_missing(&mut self) {
        let kinds = (0..self.columns.len()).map(|index| self.column_kind(index)).collect::<Vec<_>>();
        for row in &mut self.rows {
            for (cell, kind) in row.iter_mut().zip(&kinds) {
                if cell.is_null() {
                    *cell = match kind {
                        ColumnKind::Numeric => Value::from(0),
                        ColumnKind::Text => Value::String(String::new()),
                    };
                }
            }
        }
    }

    pub fn records(&self) -> Vec<Record> {
        self.head(self.rows.len())
    }

    pub fn head(&self, count: usize) -> Vec<Record> {
        self.rows
            .iter()
            .take(count)
            .map(|row| self.columns.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }
}

pub(crate) fn parse_number(raw: &str) -> Option<Number> {
    let trimmed = raw.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Some(Number::from(integer));
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite()).and_then(Number::from_f64)
}

fn decode_cell(raw: String, numeric: bool) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    if numeric {
        if let Some(number) = parse_number(&raw) {
            return Value::Number(number);
        }
    }
    Value::String(raw)
}
