//! Input validation for uploaded files.
//!
//! The HTTP layer hands us the declared content type of the multipart part
//! and, once that passes, the raw bytes. Checking the declared type first
//! means a wrong upload is rejected before the body is even read, so it never
//! reaches pdfium or the model. The `%PDF` magic check afterwards turns
//! "this is not a PDF at all" into a clear error instead of a pdfium failure.

use crate::error::Pdf2HtmlError;
use tracing::debug;

/// MIME type accepted by the PDF endpoints.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// MIME type accepted by the HTML endpoint.
pub const HTML_CONTENT_TYPE: &str = "text/html";

/// Reduce a `Content-Type` value to its lowercase essence.
///
/// `"Text/HTML; charset=utf-8"` → `"text/html"`.
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Check that a part's declared content type matches `expected`.
///
/// A missing content type is treated like a wrong one.
pub fn check_content_type(declared: Option<&str>, expected: &str) -> Result<(), Pdf2HtmlError> {
    let actual = declared.map(mime_essence).unwrap_or_default();
    if actual == expected {
        Ok(())
    } else {
        debug!("Rejected upload: declared '{}', expected '{}'", actual, expected);
        Err(Pdf2HtmlError::InvalidContentType {
            expected: expected.to_string(),
            actual: if actual.is_empty() {
                "<none>".to_string()
            } else {
                actual
            },
        })
    }
}

/// Validate that `bytes` is a non-empty PDF.
pub fn validate_pdf_bytes(bytes: &[u8]) -> Result<(), Pdf2HtmlError> {
    if bytes.is_empty() {
        return Err(Pdf2HtmlError::EmptyUpload);
    }
    if !bytes.starts_with(b"%PDF") {
        let magic = bytes.iter().take(4).copied().collect();
        return Err(Pdf2HtmlError::NotAPdf { magic });
    }
    Ok(())
}

/// Decode an HTML upload.
pub fn decode_html(bytes: Vec<u8>) -> Result<String, Pdf2HtmlError> {
    if bytes.is_empty() {
        return Err(Pdf2HtmlError::EmptyUpload);
    }
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_essence() {
        assert_eq!(mime_essence("application/pdf"), "application/pdf");
        assert_eq!(mime_essence("Text/HTML; charset=utf-8"), "text/html");
        assert_eq!(mime_essence("  application/PDF "), "application/pdf");
        assert_eq!(mime_essence(""), "");
    }

    #[test]
    fn content_type_mismatch_is_validation_error() {
        let err = check_content_type(Some("image/png"), PDF_CONTENT_TYPE).unwrap_err();
        assert!(err.is_client_error());
        assert!(matches!(err, Pdf2HtmlError::InvalidContentType { ref actual, .. } if actual == "image/png"));

        let err = check_content_type(None, HTML_CONTENT_TYPE).unwrap_err();
        assert!(err.to_string().contains("<none>"));

        check_content_type(Some("text/html; charset=utf-8"), HTML_CONTENT_TYPE)
            .expect("parameters are ignored");
    }

    #[test]
    fn pdf_magic_checked() {
        assert!(matches!(
            validate_pdf_bytes(b""),
            Err(Pdf2HtmlError::EmptyUpload)
        ));
        assert!(matches!(
            validate_pdf_bytes(b"<html>"),
            Err(Pdf2HtmlError::NotAPdf { ref magic }) if magic == b"<htm"
        ));
        assert!(matches!(
            validate_pdf_bytes(b"PK"),
            Err(Pdf2HtmlError::NotAPdf { ref magic }) if magic.len() == 2
        ));
        validate_pdf_bytes(b"%PDF-1.7\n...").expect("valid magic");
    }

    #[test]
    fn html_decoding() {
        assert_eq!(decode_html(b"<p>hi</p>".to_vec()).unwrap(), "<p>hi</p>");
        assert!(matches!(decode_html(Vec::new()), Err(Pdf2HtmlError::EmptyUpload)));
        let err = decode_html(vec![0xff, 0xfe, 0x00]).unwrap_err();
        assert!(err.is_client_error());
    }
}
