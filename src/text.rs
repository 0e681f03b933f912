//! Plain-text decoding for `.txt` uploads.

/// Decodes bytes as UTF-8, dropping a leading BOM. Malformed sequences
/// become U+FFFD rather than failing the upload.
pub fn decode_txt(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
