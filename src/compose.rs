use crate::frame::{Attributes, Line, Span};
use crate::types::{Rgba, Theme};

/// One or more adjacent spans sharing resolved style and background.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub text: String,
    pub foreground: Rgba,
    pub background: Rgba,
    pub attributes: Attributes,
    /// First cell occupied by the run, counted from the start of the row.
    pub cell_offset: u32,
    pub cell_width: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedRow {
    /// Background of the last span, used to bleed across the unused row width.
    pub background: Rgba,
    pub runs: Vec<Run>,
}

impl ComposedRow {
    pub fn paints_background(&self, theme: &Theme) -> bool {
        self.background != theme.background
    }

    pub fn cell_width(&self) -> u32 {
        self.runs.last().map(|r| r.cell_offset + r.cell_width).unwrap_or(0)
    }
}

fn resolved_foreground(span: &Span, theme: &Theme) -> Rgba {
    span.foreground
        .map(|color| color.resolve(theme.foreground))
        .unwrap_or(theme.foreground)
}

fn resolved_background(span: &Span, theme: &Theme) -> Rgba {
    span.background
        .map(|color| color.resolve(theme.background))
        .unwrap_or(theme.background)
}

pub fn compose_line(line: &Line, theme: &Theme) -> ComposedRow {
    let background = line
        .spans
        .last()
        .map(|span| resolved_background(span, theme))
        .unwrap_or(theme.background);

    let mut runs: Vec<Run> = Vec::with_capacity(line.spans.len());
    let mut cell_offset = 0u32;
    for span in &line.spans {
        let foreground = resolved_foreground(span, theme);
        let span_background = resolved_background(span, theme);
        let width = span.cell_width;
        match runs.last_mut() {
            Some(run)
                if run.foreground == foreground
                    && run.attributes == span.attributes
                    && run.background == span_background =>
            {
                run.text.push_str(&span.text);
                run.cell_width += width;
            }
            _ => runs.push(Run {
                text: span.text.clone(),
                foreground,
                background: span_background,
                attributes: span.attributes,
                cell_offset,
                cell_width: width,
            }),
        }
        cell_offset += width;
    }

    ComposedRow { background, runs }
}

pub fn compose_lines(lines: &[Line], theme: &Theme) -> Vec<ComposedRow> {
    lines.iter().map(|line| compose_line(line, theme)).collect()
}
