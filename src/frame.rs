use crate::error::{FrameshotError, Result};
use crate::types::Rgba;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthStr;

bitflags! {
    /// Cell attributes carried by a span.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Attributes: u8 {
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
        const UNDERLINE = 1 << 2;
        const STRIKETHROUGH = 1 << 3;
        const DIM = 1 << 4;
    }
}

/// A run of text sharing one style within a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    #[serde(default)]
    pub foreground: Option<Rgba>,
    #[serde(default)]
    pub background: Option<Rgba>,
    #[serde(default)]
    pub attributes: Attributes,
    /// Number of terminal cells the glyphs occupy. Authoritative for positioning.
    pub cell_width: u32,
}

impl Span {
    /// Span with default colors; `cell_width` is the display width of `text`.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cell_width = UnicodeWidthStr::width(text.as_str()) as u32;
        Self {
            text,
            foreground: None,
            background: None,
            attributes: Attributes::empty(),
            cell_width,
        }
    }

    pub fn with_foreground(mut self, color: Rgba) -> Self {
        self.foreground = Some(color);
        self
    }

    pub fn with_background(mut self, color: Rgba) -> Self {
        self.background = Some(color);
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_cell_width(mut self, cell_width: u32) -> Self {
        self.cell_width = cell_width;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Line {
    #[serde(default)]
    pub spans: Vec<Span>,
}

impl Line {
    pub fn new(spans: Vec<Span>) -> Self {
        Self { spans }
    }

    pub fn plain(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }
        Self::new(vec![Span::new(text)])
    }

    /// A line is blank when it has no spans or every span is whitespace-only.
    pub fn is_blank(&self) -> bool {
        self.spans
            .iter()
            .all(|span| span.text.chars().all(char::is_whitespace))
    }

    pub fn cell_width(&self) -> u32 {
        self.spans.iter().map(|span| span.cell_width).sum()
    }
}

/// Full grid of styled rows produced by one render pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub columns: u32,
    pub rows: u32,
    #[serde(default)]
    pub cursor_position: (u32, u32),
    pub lines: Vec<Line>,
}

impl CapturedFrame {
    pub fn new(columns: u32, lines: Vec<Line>) -> Self {
        Self {
            columns,
            rows: lines.len() as u32,
            cursor_position: (0, 0),
            lines,
        }
    }

    /// Column count used for font fitting; falls back to the widest line.
    pub(crate) fn effective_columns(&self) -> u32 {
        if self.columns > 0 {
            return self.columns;
        }
        let widest = self.lines.iter().map(Line::cell_width).max().unwrap_or(0);
        if widest > 0 { widest } else { 80 }
    }
}

/// Drops trailing blank lines. Interior blank lines are kept.
pub fn trim_trailing_blank_lines(lines: &[Line]) -> Result<&[Line]> {
    let end = lines
        .iter()
        .rposition(|line| !line.is_blank())
        .map(|idx| idx + 1)
        .ok_or(FrameshotError::EmptyContent)?;
    Ok(&lines[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(texts: &[&str]) -> Vec<Line> {
        texts.iter().map(|text| Line::plain(text)).collect()
    }

    #[test]
    fn whitespace_only_spans_are_blank() {
        assert!(Line::default().is_blank());
        assert!(Line::new(vec![Span::new("   "), Span::new("\t")]).is_blank());
        assert!(!Line::new(vec![Span::new("  "), Span::new("x")]).is_blank());
    }

    #[test]
    fn trims_only_trailing_blank_lines() {
        let input = lines(&["a", "", "b", "", "   "]);
        let trimmed = trim_trailing_blank_lines(&input).expect("content");
        assert_eq!(trimmed.len(), 3);
        assert!(trimmed[1].is_blank());
    }

    #[test]
    fn trimming_is_idempotent() {
        let input = lines(&["a", "b", "", ""]);
        let once = trim_trailing_blank_lines(&input).expect("content");
        let twice = trim_trailing_blank_lines(once).expect("content");
        assert_eq!(once, twice);
    }

    #[test]
    fn fully_blank_frame_is_empty_content() {
        let input = lines(&["", "  ", ""]);
        let err = trim_trailing_blank_lines(&input).expect_err("blank frame");
        assert!(matches!(err, FrameshotError::EmptyContent));
        assert!(matches!(
            trim_trailing_blank_lines(&[]),
            Err(FrameshotError::EmptyContent)
        ));
    }

    #[test]
    fn span_width_counts_wide_glyphs() {
        assert_eq!(Span::new("abc").cell_width, 3);
        assert_eq!(Span::new("\u{4e2d}").cell_width, 2);
    }

    #[test]
    fn frame_round_trips_through_json() {
        let frame = CapturedFrame::new(
            10,
            vec![Line::new(vec![
                Span::new("hi")
                    .with_attributes(Attributes::BOLD | Attributes::DIM)
                    .with_background(Rgba::hex(0x0000ff)),
            ])],
        );
        let json = serde_json::to_string(&frame).expect("serialize");
        let back: CapturedFrame = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, frame);
    }

    #[test]
    fn effective_columns_falls_back_to_widest_line() {
        let mut frame = CapturedFrame::new(0, lines(&["abcd", "ab"]));
        assert_eq!(frame.effective_columns(), 4);
        frame.columns = 120;
        assert_eq!(frame.effective_columns(), 120);
    }
}
