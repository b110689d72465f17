//! Pluggable collaborators (spec §6): the store core needs a way to guess a
//! payload's MIME type and to pull indexable text out of it, but has no
//! opinion on how. Grounded on the plugin-trait style the teacher's own
//! embedding/reranking backends use (a small trait, a null/default impl,
//! concrete impls behind the same interface).

use std::path::Path;

/// Extracts plain text from a payload for full-text indexing (e.g. PDF body
/// text, document contents). Entries with no extractable text are fine —
/// `find`'s free-text search just won't match anything beyond stored
/// properties for them.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, path: &Path, mime_type: &str) -> Option<String>;
}

/// Extracts nothing. The default collaborator; callers that want preview
/// text out of binary payloads provide their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTextExtractor;

impl TextExtractor for NullTextExtractor {
    fn extract_text(&self, _path: &Path, _mime_type: &str) -> Option<String> {
        None
    }
}

/// Guesses a MIME type for a payload, used to fill in `mime_type` when a
/// caller doesn't supply one explicitly.
pub trait MimeDetector: Send + Sync {
    fn detect(&self, path: &Path) -> Option<String>;
}

/// Extension-based detection covering a handful of common types. Good
/// enough for CLI ergonomics; callers who need real sniffing (magic bytes)
/// should supply their own `MimeDetector`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionMimeDetector;

impl MimeDetector for ExtensionMimeDetector {
    fn detect(&self, path: &Path) -> Option<String> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        let mime = match extension.as_str() {
            "txt" => "text/plain",
            "md" => "text/markdown",
            "html" | "htm" => "text/html",
            "pdf" => "application/pdf",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "json" => "application/json",
            "csv" => "text/csv",
            "zip" => "application/zip",
            _ => return None,
        };
        Some(mime.to_string())
    }
}

/// The inverse of `ExtensionMimeDetector`: picks a canonical file extension
/// for a MIME type, used by `get_filename` to name the caller-visible copy
/// it hands back (`mime.get_primary_extension` in the original datastore).
pub fn primary_extension(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "text/plain" => Some("txt"),
        "text/markdown" => Some("md"),
        "text/html" => Some("html"),
        "application/pdf" => Some("pdf"),
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "application/json" => Some("json"),
        "text/csv" => Some("csv"),
        "application/zip" => Some("zip"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_extractor_extracts_nothing() {
        let extractor = NullTextExtractor;
        assert_eq!(extractor.extract_text(Path::new("/tmp/x.txt"), "text/plain"), None);
    }

    #[test]
    fn test_extension_mime_detector_known_types() {
        let detector = ExtensionMimeDetector;
        assert_eq!(detector.detect(Path::new("notes.txt")), Some("text/plain".to_string()));
        assert_eq!(detector.detect(Path::new("photo.JPG")), Some("image/jpeg".to_string()));
    }

    #[test]
    fn test_primary_extension_roundtrips_known_types() {
        assert_eq!(primary_extension("image/png"), Some("png"));
        assert_eq!(primary_extension("application/x-unknown"), None);
    }

    #[test]
    fn test_extension_mime_detector_unknown_type() {
        let detector = ExtensionMimeDetector;
        assert_eq!(detector.detect(Path::new("archive.xyz")), None);
        assert_eq!(detector.detect(Path::new("noextension")), None);
    }
}
