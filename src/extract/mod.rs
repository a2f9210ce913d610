//! Recipient extraction from uploaded list files.
//!
//! Takes an uploaded file (plain list, delimited table, or spreadsheet) and
//! produces a deduplicated, syntactically validated candidate address set.
//! The file content is consumed by value: whatever happens, nothing of the
//! upload outlives the extraction.

mod decode;
mod table;

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::info;

use crate::address;
use table::Table;

pub use table::SAMPLE_ROWS;

/// Recognized upload formats, keyed off the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// One candidate per line.
    PlainList,
    /// Comma-separated table, first row is the header.
    DelimitedTable,
    /// XLS/XLSX workbook, first worksheet only.
    Spreadsheet,
}

impl FileFormat {
    /// Map a file name to a format, rejecting anything unsupported before a
    /// single byte is parsed.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext)?;

        match extension.to_ascii_lowercase().as_str() {
            "txt" => Some(Self::PlainList),
            "csv" => Some(Self::DelimitedTable),
            "xls" | "xlsx" => Some(Self::Spreadsheet),
            _ => None,
        }
    }
}

/// A file handed to the pipeline. Owned exclusively for the duration of
/// extraction, then dropped.
#[derive(Debug)]
pub struct UploadedFile {
    pub format: FileFormat,
    pub content: Vec<u8>,
}

impl UploadedFile {
    /// Build an upload from a file name and its raw content.
    ///
    /// # Errors
    /// [`ExtractError::UnsupportedFormat`] when the extension is not one of
    /// `txt`, `csv`, `xls`, `xlsx`.
    pub fn new(name: &str, content: Vec<u8>) -> Result<Self, ExtractError> {
        let format = FileFormat::from_name(name)
            .ok_or_else(|| ExtractError::UnsupportedFormat(name.to_string()))?;

        Ok(Self { format, content })
    }
}

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Deduplicated, lower-cased, syntactically valid addresses.
    pub candidates: BTreeSet<String>,
    /// Raw candidate tokens examined, for user feedback only.
    pub scanned: usize,
}

impl Extraction {
    /// Human-readable summary for the submitting user.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Found {} potential addresses ({} valid)",
            self.scanned,
            self.candidates.len()
        )
    }
}

/// Extraction failures, always with a user-presentable cause.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file extension is not one the pipeline knows how to parse.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Every attempted encoding failed to decode the content.
    #[error("Content is not decodable (last attempted encoding: {0})")]
    Undecodable(&'static str),

    /// The content decoded but could not be parsed as its claimed format.
    #[error("Failed to parse file: {0}")]
    Parse(String),
}

/// Run the pipeline over `file`, producing the candidate address set.
///
/// Post-processing is format-independent: every raw candidate is trimmed,
/// lower-cased, validated, and deduplicated.
///
/// # Errors
/// Any [`ExtractError`]; the upload is consumed and released regardless.
pub fn extract(file: UploadedFile) -> Result<Extraction, ExtractError> {
    let raw = match file.format {
        FileFormat::PlainList => plain_list(&file.content)?,
        FileFormat::DelimitedTable => {
            let text = decode::decode_table(&file.content)?;
            Table::from_delimited(&text)?.candidates()
        }
        FileFormat::Spreadsheet => Table::from_spreadsheet(file.content)?.candidates(),
    };

    let scanned = raw.len();
    let candidates: BTreeSet<String> = raw
        .into_iter()
        .map(|candidate| candidate.trim().to_lowercase())
        .filter(|candidate| address::is_valid(candidate))
        .collect();

    info!(scanned, valid = candidates.len(), "Extraction complete");

    Ok(Extraction {
        candidates,
        scanned,
    })
}

/// One candidate per non-blank line, trimmed.
fn plain_list(content: &[u8]) -> Result<Vec<String>, ExtractError> {
    let text =
        std::str::from_utf8(content).map_err(|_| ExtractError::Undecodable("UTF-8"))?;

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}
