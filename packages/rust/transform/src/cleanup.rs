//! Cleanup passes for extracted plain text.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on extracted text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = text.to_string();

    result = normalize_lines(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(result.trim());

    result
}

/// Collapse whitespace runs within lines and trim each line.
fn normalize_lines(text: &str) -> String {
    static SPACES_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));

    text.lines()
        .map(|line| SPACES_RE.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep at most one blank line between paragraphs.
fn clean_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n").to_string()
}

fn ensure_trailing_newline(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("{text}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_spaces_and_blank_runs() {
        let input = "  Title \t here \n\n\n\n\n  body   text\u{a0} \n";
        assert_eq!(run_pipeline(input), "Title here\n\nbody text\n");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(run_pipeline(" \n\n \t"), "");
    }
}
