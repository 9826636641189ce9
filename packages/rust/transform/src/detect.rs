//! Raw document format detection.

use docket_shared::FileFormat;
use url::Url;

/// How many leading bytes the markup sniff looks at.
const SNIFF_LEN: usize = 1024;

/// Detect a document's format from its content, then its source link.
///
/// Magic bytes win over the link's extension, since portals routinely serve
/// PDFs from `.html` URLs and vice versa.
pub fn detect_format(bytes: &[u8], link: Option<&str>) -> FileFormat {
    if let Some(format) = infer::get(bytes).and_then(|kind| from_mime(kind.mime_type())) {
        return format;
    }
    if let Some(format) = link.and_then(from_link) {
        return format;
    }
    if looks_like_html(bytes) {
        return FileFormat::Html;
    }
    FileFormat::Unknown
}

fn from_mime(mime: &str) -> Option<FileFormat> {
    match mime {
        "application/pdf" => Some(FileFormat::Pdf),
        "application/msword"
        | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        | "application/rtf" => Some(FileFormat::Doc),
        "text/html" => Some(FileFormat::Html),
        _ => None,
    }
}

fn from_link(link: &str) -> Option<FileFormat> {
    // Links may be absolute URLs or bare paths.
    let path = match Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => link.split(['?', '#']).next().unwrap_or(link).to_string(),
    };
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some(FileFormat::Pdf),
        "doc" | "docx" | "rtf" => Some(FileFormat::Doc),
        "htm" | "html" => Some(FileFormat::Html),
        _ => None,
    }
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<body")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_beat_link_extension() {
        let pdf = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n";
        assert_eq!(
            detect_format(pdf, Some("https://example.org/decision.html")),
            FileFormat::Pdf
        );
    }

    #[test]
    fn link_extension_when_content_is_opaque() {
        assert_eq!(
            detect_format(b"opaque", Some("https://example.org/a/b/Report.DOCX?dl=1")),
            FileFormat::Doc
        );
        assert_eq!(detect_format(b"opaque", Some("files/x.pdf")), FileFormat::Pdf);
    }

    #[test]
    fn markup_sniff_and_unknown() {
        let html = b"\n  <!DOCTYPE html><html><body>x</body></html>";
        assert_eq!(detect_format(html, None), FileFormat::Html);
        assert_eq!(detect_format(b"plain words", None), FileFormat::Unknown);
        assert_eq!(
            detect_format(b"plain words", Some("https://example.org/view?id=3")),
            FileFormat::Unknown
        );
    }
}
