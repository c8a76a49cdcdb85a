//! Text clean-up for LLM HTML output and the final merge.
//!
//! Pure functions, no async.

use regex::Regex;
use std::sync::LazyLock;

/// Heading inserted between the clinical summary and the lay explanation.
pub const EXPLANATION_HEADING: &str = "Patient-Friendly Explanation";

static MARKDOWN_BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));

/// A `<b>...</b>` heading alone on its line.
static BARE_BOLD_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(<b>[^<\n]*</b>)[ \t]*$").expect("valid regex"));

/// Start of an explanation section the summarizer was not asked to write.
static EXPLANATION_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:<p>\s*)?(?:<(?:b|strong|h[1-6])>|\*\*|#{1,6}[ \t]*)\s*patient[- ]friendly explanation",
    )
    .expect("valid regex")
});

/// Replace `**text**` with `text`.
pub fn remove_markdown_bold(text: &str) -> String {
    MARKDOWN_BOLD.replace_all(text, "$1").into_owned()
}

/// Wrap standalone `<b>` headings in a paragraph so they render as blocks.
pub fn normalize_bold_headings(html: &str) -> String {
    BARE_BOLD_HEADING.replace_all(html, "<p>$1</p>").into_owned()
}

/// Cut everything from a "Patient-Friendly Explanation" heading onwards.
pub fn truncate_explanation_section(html: &str) -> String {
    match EXPLANATION_SECTION.find(html) {
        Some(m) => html[..m.start()].trim_end().to_string(),
        None => html.to_string(),
    }
}

/// Summary and explanation inside the styled container.
pub fn merge(summary_html: &str, explanation_html: &str) -> String {
    format!(
        r#"
  <div style="font-family: Arial, sans-serif; line-height: 1.5;">
    {summary_html}
    <b>{EXPLANATION_HEADING}:</b>
    {explanation_html}
  </div>
"#
    )
}
