//! Text extraction for uploaded documents.
//!
//! Uploads arrive as bytes plus the original filename; this module returns
//! plain UTF-8 text. Supported formats: PDF (via `pdf-extract`) and plain
//! text (UTF-8, with lossy decoding as the fallback for legacy encodings).

/// Extraction error. The ingestion pipeline records the failure and leaves
/// the document record in its placeholder state.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFormat(String),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFormat(name) => {
                write!(f, "unsupported document format: {}", name)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract plain text from an uploaded file's bytes, dispatching on the
/// filename extension.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<String, ExtractError> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        extract_pdf(bytes)
    } else if lower.ends_with(".txt") {
        Ok(extract_plain(bytes))
    } else {
        Err(ExtractError::UnsupportedFormat(filename.to_string()))
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_plain(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        // Legacy single-byte encodings decode lossily rather than failing.
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text(b"Termination requires 30 days notice.", "contract.txt").unwrap();
        assert_eq!(text, "Termination requires 30 days notice.");
    }

    #[test]
    fn non_utf8_text_decodes_lossily() {
        // 0xE9 is 'é' in latin-1; invalid as standalone UTF-8.
        let text = extract_text(b"r\xE9sum\xE9", "cv.txt").unwrap();
        assert!(text.starts_with('r'));
        assert!(!text.is_empty());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = extract_text(b"GIF89a", "diagram.gif").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", "contract.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}
