//! Column-oriented table model and the address-column heuristic.
//!
//! Uploaded tables rarely announce which column holds addresses, so each
//! column's first [`SAMPLE_ROWS`] non-empty values are sampled and the column
//! is marked address-bearing if any sampled value contains `@`. When nothing
//! is marked at all, every text-typed column is harvested instead: headerless
//! or mislabeled exports may hide valid addresses past the sample window, and
//! recall matters more than precision once the heuristic has found nothing.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use super::ExtractError;

/// How many non-empty values per column feed the address heuristic.
pub const SAMPLE_ROWS: usize = 10;

/// One table cell, already stringified.
#[derive(Debug, Clone)]
pub(super) struct Cell {
    pub text: String,
    /// Whether the source typed this cell as a number.
    pub numeric: bool,
}

impl Cell {
    fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A parsed table, one entry per column.
#[derive(Debug, Default)]
pub(super) struct Table {
    pub columns: Vec<Vec<Cell>>,
}

impl Table {
    /// Parse delimited text into columns, first row as the header.
    ///
    /// Rows are allowed to be ragged; short rows simply leave the trailing
    /// columns empty for that row.
    pub fn from_delimited(text: &str) -> Result<Self, ExtractError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let width = reader
            .headers()
            .map_err(|e| ExtractError::Parse(e.to_string()))?
            .len();
        let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); width.max(1)];

        for record in reader.records() {
            let record = record.map_err(|e| ExtractError::Parse(e.to_string()))?;
            for (index, column) in columns.iter_mut().enumerate() {
                let text = record.get(index).unwrap_or_default().to_string();
                let numeric = !text.trim().is_empty() && text.trim().parse::<f64>().is_ok();
                column.push(Cell { text, numeric });
            }
        }

        Ok(Self { columns })
    }

    /// Parse the first worksheet of an XLS/XLSX workbook, first row as the
    /// header.
    pub fn from_spreadsheet(content: Vec<u8>) -> Result<Self, ExtractError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(content))
            .map_err(|e| ExtractError::Parse(e.to_string()))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ExtractError::Parse("Workbook has no worksheets".into()))?
            .map_err(|e| ExtractError::Parse(e.to_string()))?;

        let width = range.width();
        let mut columns: Vec<Vec<Cell>> = vec![Vec::new(); width.max(1)];

        for row in range.rows().skip(1) {
            for (index, column) in columns.iter_mut().enumerate() {
                let cell = row.get(index).unwrap_or(&Data::Empty);
                column.push(Cell {
                    text: stringify(cell),
                    numeric: matches!(cell, Data::Int(_) | Data::Float(_)),
                });
            }
        }

        Ok(Self { columns })
    }

    /// Harvest candidate tokens per the sampling heuristic.
    ///
    /// Exactly the marked columns when at least one column's sample contains
    /// `@`; otherwise every non-numeric column. Values come back in column
    /// order, non-empty only.
    pub fn candidates(&self) -> Vec<String> {
        let marked: Vec<&Vec<Cell>> = self
            .columns
            .iter()
            .filter(|column| {
                column
                    .iter()
                    .filter(|cell| !cell.is_empty())
                    .take(SAMPLE_ROWS)
                    .any(|cell| cell.text.contains('@'))
            })
            .collect();

        let harvest: Vec<&Vec<Cell>> = if marked.is_empty() {
            self.columns
                .iter()
                .filter(|column| !is_numeric_column(column))
                .collect()
        } else {
            marked
        };

        harvest
            .into_iter()
            .flatten()
            .filter(|cell| !cell.is_empty())
            .map(|cell| cell.text.clone())
            .collect()
    }
}

/// A column counts as numeric when it has values and all of them are numbers.
fn is_numeric_column(column: &[Cell]) -> bool {
    let mut values = column.iter().filter(|cell| !cell.is_empty()).peekable();
    values.peek().is_some() && values.all(|cell| cell.numeric)
}

fn stringify(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}
