//! Decoding of untrusted tabular bytes.
//!
//! List exports routinely arrive in whatever encoding the producing
//! spreadsheet tool favored, so a strict UTF-8 decode is tried first and the
//! fallbacks only kick in when it fails.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use super::ExtractError;

/// Decode table bytes into text, trying alternate encodings in order.
///
/// Order of attempts:
/// 1. A BOM, if present, wins (handles UTF-16 exports).
/// 2. Strict UTF-8.
/// 3. windows-1252, the usual suspect for legacy CSV exports.
///
/// # Errors
/// [`ExtractError::Undecodable`] when every attempted encoding fails to
/// produce text without replacement characters.
pub(super) fn decode_table(bytes: &[u8]) -> Result<String, ExtractError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _, malformed) = encoding.decode(&bytes[bom_len..]);
        if malformed {
            return Err(ExtractError::Undecodable(encoding.name()));
        }
        return Ok(text.into_owned());
    }

    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        return Ok(text.into_owned());
    }

    let (text, _, malformed) = WINDOWS_1252.decode(bytes);
    if malformed {
        return Err(ExtractError::Undecodable(WINDOWS_1252.name()));
    }

    Ok(text.into_owned())
}
