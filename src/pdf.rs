//! PDF text-layer reading.

use anyhow::Result;
use lopdf::Document;
use std::io::Cursor;
use tracing::debug;

/// Text fragments of one PDF page, in content order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfPage {
    pub items: Vec<String>,
}

/// Reads the text layer of a PDF, page by page.
pub trait PdfParser: Send + Sync {
    /// Pages 1..N in document order.
    fn pages(&self, data: &[u8]) -> Result<Vec<PdfPage>>;
}

/// [`PdfParser`] backed by `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfParser;

impl PdfParser for LopdfParser {
    fn pages(&self, data: &[u8]) -> Result<Vec<PdfPage>> {
        let doc = Document::load_from(Cursor::new(data))
            .map_err(|e| anyhow::anyhow!("Failed to load PDF: {}", e))?;

        // get_pages() is keyed by page number, so iteration is in page order.
        let pages = doc.get_pages();
        let mut result = Vec::with_capacity(pages.len());

        for (page_num, _) in pages {
            let content = doc
                .extract_text(&[page_num])
                .map_err(|e| anyhow::anyhow!("Failed to read text of page {}: {}", page_num, e))?;
            result.push(PdfPage {
                items: split_fragments(&content),
            });
        }

        debug!("Read {} PDF pages", result.len());
        Ok(result)
    }
}

/// Non-empty lines of lopdf's page text, each one a fragment.
fn split_fragments(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fragments joined by a space per page, pages joined by a newline, trimmed.
pub fn join_pages(pages: &[PdfPage]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(&page.items.join(" "));
        text.push('\n');
    }
    text.trim().to_string()
}
