//! HTML extraction: markup in, normalized plain text out.

use std::sync::LazyLock;

use docket_shared::FileFormat;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use tracing::{debug, instrument};

use crate::cleanup;
use crate::{Transform, TransformFailure, TransformOutput};

/// Content containers, most specific first. Decision pages put the judgment
/// body in `div.col-sm-9`; generic pages fall back through the usual landmarks.
const CONTAINER_SELECTORS: &[&str] = &["div.col-sm-9", "main", "article", "[role=main]", "body"];

/// Elements whose content is never part of the document text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe", "svg", "form",
    "button", "template",
];

/// Elements rendered on their own paragraph.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol",
    "li", "table", "tr", "blockquote", "pre", "dl", "dt", "dd", "address", "figure",
    "figcaption", "hr",
];

static CONTAINERS: LazyLock<Vec<(&'static str, Selector)>> = LazyLock::new(|| {
    CONTAINER_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok().map(|sel| (*s, sel)))
        .collect()
});
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static H1_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("valid selector"));
static HEADINGS_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3").expect("valid selector"));

/// Strips markup, normalizes whitespace, and extracts plain text plus
/// structural metadata (`title`, `headings`, `word_count`, `container`).
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtract;

impl Transform for HtmlExtract {
    fn name(&self) -> &'static str {
        "html-extract"
    }

    fn output_extension(&self, _format: FileFormat) -> &'static str {
        "txt"
    }

    #[instrument(skip_all, fields(bytes = raw.len()))]
    fn transform(&self, raw: &[u8]) -> Result<TransformOutput, TransformFailure> {
        if raw.contains(&0) {
            return Err(TransformFailure::malformed("binary data in HTML document"));
        }
        let source = String::from_utf8_lossy(raw);
        let doc = Html::parse_document(&source);

        let Some((container_name, container)) = pick_container(&doc) else {
            return Err(TransformFailure::empty("no text content found"));
        };

        let mut text = String::new();
        collect_text(container, &mut text);
        let text = cleanup::run_pipeline(&text);
        if text.is_empty() {
            return Err(TransformFailure::empty("no text content found"));
        }

        let title = doc
            .select(&TITLE_SEL)
            .chain(doc.select(&H1_SEL))
            .map(element_text)
            .find(|t| !t.is_empty());
        let headings: Vec<String> = container
            .select(&HEADINGS_SEL)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();
        let word_count = text.split_whitespace().count();

        debug!(container = container_name, word_count, "html extracted");

        Ok(TransformOutput {
            bytes: text.into_bytes(),
            metadata: json!({
                "title": title,
                "headings": headings,
                "word_count": word_count,
                "container": container_name,
            }),
        })
    }
}

/// First container, in priority order, that carries any text.
fn pick_container(doc: &Html) -> Option<(&'static str, ElementRef<'_>)> {
    CONTAINERS.iter().find_map(|(name, sel)| {
        doc.select(sel)
            .find(|el| has_text(*el))
            .map(|el| (*name, el))
    })
}

fn has_text(el: ElementRef<'_>) -> bool {
    let mut text = String::new();
    collect_text(el, &mut text);
    !text.trim().is_empty()
}

/// One step of the text walk: visit a node, or close a block element.
enum Step<N> {
    Visit(N),
    CloseBlock,
}

/// Append the visible text under `el`, one paragraph per block element.
///
/// Walks with an explicit stack: nesting depth is bounded only by the input.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    let mut stack: Vec<Step<_>> = el.children().rev().map(Step::Visit).collect();

    while let Some(step) = stack.pop() {
        let node = match step {
            Step::Visit(node) => node,
            Step::CloseBlock => {
                out.push_str("\n\n");
                continue;
            }
        };

        if let Some(child_el) = ElementRef::wrap(node) {
            let name = child_el.value().name();
            if SKIP_TAGS.contains(&name) {
                continue;
            }
            if name == "br" {
                out.push('\n');
                continue;
            }
            if BLOCK_TAGS.contains(&name) {
                out.push_str("\n\n");
                stack.push(Step::CloseBlock);
            }
            stack.extend(node.children().rev().map(Step::Visit));
        } else if let Some(text) = node.value().as_text() {
            // Source newlines inside text are layout, not content.
            for (i, word) in text.split_whitespace().enumerate() {
                if i > 0 || text.starts_with(char::is_whitespace) {
                    out.push(' ');
                }
                out.push_str(word);
            }
            if text.ends_with(char::is_whitespace) && !text.trim().is_empty() {
                out.push(' ');
            }
        }
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_shared::FailureKind;

    fn extract(html: &str) -> (String, serde_json::Value) {
        let out = HtmlExtract.transform(html.as_bytes()).expect("transform");
        (String::from_utf8(out.bytes).expect("utf8"), out.metadata)
    }

    #[test]
    fn prefers_decision_container_and_drops_chrome() {
        let html = r#"<html><head><title>ADJ-00051234 | Decision</title>
            <style>.x{}</style></head><body>
            <nav><a href="/">Home</a></nav>
            <div class="col-sm-3">Sidebar links</div>
            <div class="col-sm-9">
              <h1>Adjudication Officer Decision</h1>
              <p>The complainant   was employed
                 as a <b>chef</b>.</p>
              <script>track()</script>
              <p>The complaint is well founded.</p>
            </div>
            <footer>Copyright</footer></body></html>"#;

        let (text, meta) = extract(html);
        assert_eq!(
            text,
            "Adjudication Officer Decision\n\nThe complainant was employed as a chef.\n\nThe complaint is well founded.\n"
        );
        assert_eq!(meta["container"], "div.col-sm-9");
        assert_eq!(meta["title"], "ADJ-00051234 | Decision");
        assert_eq!(meta["headings"][0], "Adjudication Officer Decision");
        assert_eq!(meta["word_count"], 15);
    }

    #[test]
    fn falls_back_to_body() {
        let (text, meta) = extract("<html><body><p>Hello</p><p>World</p></body></html>");
        assert_eq!(text, "Hello\n\nWorld\n");
        assert_eq!(meta["container"], "body");
        assert!(meta["title"].is_null());
    }

    #[test]
    fn skips_empty_priority_containers() {
        let html = r#"<body><div class="col-sm-9">  </div><main><p>Body text</p></main></body>"#;
        let (_, meta) = extract(html);
        assert_eq!(meta["container"], "main");
    }

    #[test]
    fn line_breaks_and_lists() {
        let (text, _) = extract("<body><p>Line one<br>Line two</p><ul><li>a</li><li>b</li></ul></body>");
        assert_eq!(text, "Line one\nLine two\n\na\n\nb\n");
    }

    #[test]
    fn empty_document_fails() {
        let err = HtmlExtract
            .transform(b"<html><body><nav>Only nav</nav></body></html>")
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::EmptyContent);
    }

    #[test]
    fn deep_nesting_on_a_small_stack() {
        let depth = 10_000;
        let html = format!(
            "<html><body>{}<p>deep</p>{}</body></html>",
            "<span>".repeat(depth),
            "</span>".repeat(depth)
        );

        // Blocking-pool threads run with 2 MiB stacks.
        let handle = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || HtmlExtract.transform(html.as_bytes()).map(|out| out.bytes))
            .expect("spawn");
        let bytes = handle.join().expect("no overflow").expect("transform");
        assert_eq!(String::from_utf8(bytes).unwrap(), "deep\n");
    }

    #[test]
    fn binary_payload_is_malformed() {
        let err = HtmlExtract.transform(b"%PDF-1.7\x00\x01\x02").unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedContent);
    }
}
