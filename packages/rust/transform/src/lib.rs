//! Format detection and transform strategies for processed documents.
//!
//! A [`TransformRegistry`] maps each [`FileFormat`] to one [`Transform`]
//! strategy. Built-in strategies:
//! - [`HtmlExtract`]: HTML to normalized plain text with structural metadata
//! - [`Passthrough`]: bytes unchanged (PDF, DOC)
//! - [`Unsupported`]: always fails; the fallback for unmapped formats
//!
//! New formats are supported by registering another strategy, never by
//! changing an existing one.

mod cleanup;
mod detect;
mod html;
mod passthrough;

use std::collections::HashMap;
use std::sync::Arc;

use docket_shared::{FailureKind, FileFormat};

pub use detect::detect_format;
pub use html::HtmlExtract;
pub use passthrough::{Passthrough, Unsupported};

// ---------------------------------------------------------------------------
// Transform capability
// ---------------------------------------------------------------------------

/// Output of a successful transform.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Transformed document bytes.
    pub bytes: Vec<u8>,
    /// Metadata the transform adds to the processed record.
    pub metadata: serde_json::Value,
}

/// Why a transform refused a document.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransformFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransformFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FailureKind::UnsupportedFormat, message)
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(FailureKind::EmptyContent, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedContent, message)
    }
}

/// A transformation strategy for one family of formats.
///
/// Implementations are pure: same bytes in, same output out.
pub trait Transform: Send + Sync {
    /// Short name, recorded in logs.
    fn name(&self) -> &'static str;

    /// Extension for the processed blob of a document in `format`.
    fn output_extension(&self, format: FileFormat) -> &'static str;

    /// Transform raw bytes into processed bytes plus a metadata delta.
    fn transform(&self, raw: &[u8]) -> Result<TransformOutput, TransformFailure>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps formats to strategies, falling back to [`Unsupported`].
pub struct TransformRegistry {
    strategies: HashMap<FileFormat, Arc<dyn Transform>>,
    fallback: Arc<dyn Transform>,
}

impl TransformRegistry {
    /// Registry with the built-in mappings: HTML is extracted, PDF and DOC
    /// pass through, everything else is unsupported.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry
            .register(FileFormat::Html, HtmlExtract)
            .register(FileFormat::Pdf, Passthrough)
            .register(FileFormat::Doc, Passthrough);
        registry
    }

    /// Registry with no mappings; every format dispatches to [`Unsupported`].
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            fallback: Arc::new(Unsupported),
        }
    }

    /// Map `format` to `strategy`, replacing any previous mapping.
    pub fn register(
        &mut self,
        format: FileFormat,
        strategy: impl Transform + 'static,
    ) -> &mut Self {
        self.strategies.insert(format, Arc::new(strategy));
        self
    }

    /// The strategy for `format`.
    pub fn dispatch(&self, format: FileFormat) -> Arc<dyn Transform> {
        self.strategies
            .get(&format)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Transform for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }
        fn output_extension(&self, _format: FileFormat) -> &'static str {
            "txt"
        }
        fn transform(&self, raw: &[u8]) -> Result<TransformOutput, TransformFailure> {
            Ok(TransformOutput {
                bytes: raw.to_ascii_uppercase(),
                metadata: serde_json::json!({}),
            })
        }
    }

    #[test]
    fn default_mappings() {
        let registry = TransformRegistry::new();
        assert_eq!(registry.dispatch(FileFormat::Html).name(), "html-extract");
        assert_eq!(registry.dispatch(FileFormat::Pdf).name(), "passthrough");
        assert_eq!(registry.dispatch(FileFormat::Doc).name(), "passthrough");
        assert_eq!(registry.dispatch(FileFormat::Unknown).name(), "unsupported");
    }

    #[test]
    fn registering_adds_a_format_without_touching_others() {
        let mut registry = TransformRegistry::new();
        registry.register(FileFormat::Unknown, Upper);

        let out = registry
            .dispatch(FileFormat::Unknown)
            .transform(b"abc")
            .expect("upper");
        assert_eq!(out.bytes, b"ABC");
        assert_eq!(registry.dispatch(FileFormat::Html).name(), "html-extract");
    }

    #[test]
    fn empty_registry_rejects_everything() {
        let registry = TransformRegistry::empty();
        let err = registry
            .dispatch(FileFormat::Html)
            .transform(b"<p>x</p>")
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::UnsupportedFormat);
    }
}
