//! Format classification from filename and declared MIME type.
//!
//! Browsers are unreliable MIME sniffers, so the extension is consulted
//! first: every extension predicate is tried (in [`DocumentKind`] order)
//! before any MIME predicate. Either side matching is sufficient.

use serde::Serialize;

pub const MIME_TXT: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_RTF: &str = "application/rtf";
pub const MIME_RTF_TEXT: &str = "text/rtf";
pub const MIME_MSWORD: &str = "application/msword";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Handling branch for an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Txt,
    Pdf,
    Docx,
    Rtf,
    Image,
    LegacyDoc,
    Unknown,
}

impl DocumentKind {
    /// Kinds with a predicate, in evaluation order.
    const ORDERED: [DocumentKind; 6] = [
        DocumentKind::Txt,
        DocumentKind::Pdf,
        DocumentKind::Docx,
        DocumentKind::Rtf,
        DocumentKind::Image,
        DocumentKind::LegacyDoc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Txt => "txt",
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
            DocumentKind::Rtf => "rtf",
            DocumentKind::Image => "image",
            DocumentKind::LegacyDoc => "legacy_doc",
            DocumentKind::Unknown => "unknown",
        }
    }

    fn matches_extension(&self, ext: &str) -> bool {
        match self {
            DocumentKind::Txt => ext == "txt",
            DocumentKind::Pdf => ext == "pdf",
            DocumentKind::Docx => ext == "docx",
            DocumentKind::Rtf => ext == "rtf",
            DocumentKind::Image => matches!(ext, "png" | "jpg" | "jpeg"),
            DocumentKind::LegacyDoc => ext == "doc",
            DocumentKind::Unknown => false,
        }
    }

    fn matches_mime(&self, mime: &str) -> bool {
        match self {
            DocumentKind::Txt => mime == MIME_TXT,
            DocumentKind::Pdf => mime == MIME_PDF,
            DocumentKind::Docx => mime == MIME_DOCX,
            DocumentKind::Rtf => mime == MIME_RTF || mime == MIME_RTF_TEXT,
            DocumentKind::Image => mime.starts_with("image/"),
            DocumentKind::LegacyDoc => mime == MIME_MSWORD,
            DocumentKind::Unknown => false,
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a document. Pure and total: every input maps to one kind.
pub fn classify(filename: &str, mime_type: &str) -> DocumentKind {
    let ext = extension(filename);
    let mime = essence(mime_type);

    if let Some(ext) = ext.as_deref() {
        if let Some(kind) = DocumentKind::ORDERED
            .iter()
            .find(|k| k.matches_extension(ext))
        {
            return *kind;
        }
    }

    DocumentKind::ORDERED
        .iter()
        .find(|k| k.matches_mime(&mime))
        .copied()
        .unwrap_or(DocumentKind::Unknown)
}

/// Best-effort MIME type for a filename, used when the caller gives none.
pub fn guess_mime(filename: &str) -> &'static str {
    match extension(filename).as_deref() {
        Some("txt") => MIME_TXT,
        Some("pdf") => MIME_PDF,
        Some("docx") => MIME_DOCX,
        Some("rtf") => MIME_RTF,
        Some("doc") => MIME_MSWORD,
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => MIME_OCTET_STREAM,
    }
}

/// Lowercased extension without the dot, if the name has one.
fn extension(filename: &str) -> Option<String> {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// MIME type without parameters, lowercased: `Text/Plain; charset=utf-8` -> `text/plain`.
fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension() {
        assert_eq!(classify("cv.txt", ""), DocumentKind::Txt);
        assert_eq!(classify("cv.pdf", ""), DocumentKind::Pdf);
        assert_eq!(classify("cv.docx", ""), DocumentKind::Docx);
        assert_eq!(classify("cv.rtf", ""), DocumentKind::Rtf);
        assert_eq!(classify("scan.png", ""), DocumentKind::Image);
        assert_eq!(classify("scan.JPG", ""), DocumentKind::Image);
        assert_eq!(classify("scan.jpeg", ""), DocumentKind::Image);
        assert_eq!(classify("old.doc", ""), DocumentKind::LegacyDoc);
    }

    #[test]
    fn classifies_by_mime() {
        assert_eq!(classify("upload", "text/plain"), DocumentKind::Txt);
        assert_eq!(classify("upload", "application/pdf"), DocumentKind::Pdf);
        assert_eq!(classify("upload", MIME_DOCX), DocumentKind::Docx);
        assert_eq!(classify("upload", "text/rtf"), DocumentKind::Rtf);
        assert_eq!(classify("upload", "application/rtf"), DocumentKind::Rtf);
        assert_eq!(classify("upload", "image/webp"), DocumentKind::Image);
        assert_eq!(classify("upload", "application/msword"), DocumentKind::LegacyDoc);
    }

    #[test]
    fn extension_wins_when_mime_disagrees() {
        assert_eq!(classify("x.pdf", "text/plain"), DocumentKind::Pdf);
        assert_eq!(classify("x.doc", "image/png"), DocumentKind::LegacyDoc);
        assert_eq!(classify("x.txt", "application/pdf"), DocumentKind::Txt);
    }

    #[test]
    fn unknown_extension_defers_to_mime() {
        assert_eq!(classify("resume.pages", "application/pdf"), DocumentKind::Pdf);
        assert_eq!(classify("resume.bin", "application/zip"), DocumentKind::Unknown);
    }

    #[test]
    fn mime_parameters_and_case_are_ignored() {
        assert_eq!(
            classify("notes", "Text/Plain; charset=utf-8"),
            DocumentKind::Txt
        );
    }

    #[test]
    fn classification_is_total() {
        let names = ["", ".", "a", "a.", ".pdf", "dir.pdf/file", "a.b.c.docx", "x.PDF"];
        let mimes = ["", "text/plain", "image/", "application/pdf", "garbage"];
        for name in names {
            for mime in mimes {
                // Must not panic, must be deterministic.
                assert_eq!(classify(name, mime), classify(name, mime));
            }
        }
        assert_eq!(classify("", ""), DocumentKind::Unknown);
        assert_eq!(classify("a.b.c.docx", ""), DocumentKind::Docx);
        assert_eq!(classify("dir.pdf/file", ""), DocumentKind::Unknown);
    }

    #[test]
    fn guesses_mime_from_extension() {
        assert_eq!(guess_mime("a.PDF"), MIME_PDF);
        assert_eq!(guess_mime("a.jpeg"), "image/jpeg");
        assert_eq!(guess_mime("a"), MIME_OCTET_STREAM);
    }
}
