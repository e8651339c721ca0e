//! Opaque cursors for list pagination.
//!
//! The cursor encodes an offset; its only contract is round-trip
//! stability for an unchanged catalog. Clients must treat it as opaque.

use base64::Engine;

use crate::error::{Error, Result};

/// Encode an offset into an opaque cursor string.
pub fn encode_cursor(offset: usize) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(format!("o:{offset}"))
}

/// Decode a cursor previously produced by [`encode_cursor`].
pub fn decode_cursor(cursor: &str) -> Result<usize> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| Error::invalid_params("malformed cursor"))?;
    let text =
        String::from_utf8(bytes).map_err(|_| Error::invalid_params("malformed cursor"))?;
    let offset = text
        .strip_prefix("o:")
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| Error::invalid_params("malformed cursor"))?;
    Ok(offset)
}

/// Slice one page out of a snapshot, returning the page and the cursor
/// for the next one (if any).
pub fn paginate<T: Clone>(
    items: &[T],
    cursor: Option<&str>,
    page_size: usize,
) -> Result<(Vec<T>, Option<String>)> {
    let offset = match cursor {
        Some(cursor) => decode_cursor(cursor)?,
        None => 0,
    };
    if offset > items.len() {
        return Err(Error::invalid_params("cursor past end of catalog"));
    }
    let end = (offset + page_size).min(items.len());
    let page = items[offset..end].to_vec();
    let next = (end < items.len()).then(|| encode_cursor(end));
    Ok((page, next))
}
