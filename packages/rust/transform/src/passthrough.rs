//! Strategies that do not look inside the document.

use docket_shared::FileFormat;

use crate::{Transform, TransformFailure, TransformOutput};

/// Returns the raw bytes unchanged with an empty metadata delta.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Transform for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn output_extension(&self, format: FileFormat) -> &'static str {
        format.extension()
    }

    fn transform(&self, raw: &[u8]) -> Result<TransformOutput, TransformFailure> {
        Ok(TransformOutput {
            bytes: raw.to_vec(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        })
    }
}

/// Always fails. Stands in for any format without a registered strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl Transform for Unsupported {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn output_extension(&self, format: FileFormat) -> &'static str {
        format.extension()
    }

    fn transform(&self, _raw: &[u8]) -> Result<TransformOutput, TransformFailure> {
        Err(TransformFailure::unsupported(
            "no transform strategy for this format",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_shared::FailureKind;

    #[test]
    fn passthrough_keeps_bytes() {
        let raw = b"%PDF-1.7 some bytes";
        let out = Passthrough.transform(raw).expect("passthrough");
        assert_eq!(out.bytes, raw);
        assert_eq!(out.metadata, serde_json::json!({}));
        assert_eq!(Passthrough.output_extension(FileFormat::Pdf), "pdf");
    }

    #[test]
    fn unsupported_always_fails() {
        let err = Unsupported.transform(b"anything").unwrap_err();
        assert_eq!(err.kind, FailureKind::UnsupportedFormat);
        assert!(err.to_string().starts_with("UNSUPPORTED_FORMAT"));
    }
}
