use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageMetrics {
    /// 1-based.
    pub page_number: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub command_count: usize,
    pub output_bytes: usize,
    pub render_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentMetrics {
    pub pages: Vec<PageMetrics>,
    pub total_render_ms: f64,
    pub total_bytes: usize,
}

impl DocumentMetrics {
    pub(crate) fn from_pages(pages: Vec<PageMetrics>, total_bytes: usize) -> Self {
        let total_render_ms = pages.iter().map(|page| page.render_ms).sum();
        Self {
            pages,
            total_render_ms,
            total_bytes,
        }
    }
}
