use crate::canvas::Canvas;
use crate::compose::ComposedRow;
use crate::error::Result;
use crate::font::{FontMetrics, FontVariant};
use crate::frame::{Attributes, Line};
use crate::layout::PageGeometry;
use crate::types::{Color, Pt, Theme};

/// Fill and stroke opacity for dim text.
pub const DIM_OPACITY: f32 = 0.5;

/// Renders one page of lines. Implementations are fed pages in order.
pub trait PageRenderer {
    type Artifact;

    fn render_page(
        &mut self,
        lines: &[Line],
        geometry: &PageGeometry,
        theme: &Theme,
    ) -> Result<Self::Artifact>;
}

/// Where one composed row lands on the page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RowPlacement {
    pub(crate) top: f32,
    /// Width of the row background bleed, measured from the left page edge.
    pub(crate) bleed_width: f32,
    /// Left edge of each run, parallel to `ComposedRow::runs`.
    pub(crate) run_x: Vec<f32>,
}

impl RowPlacement {
    pub(crate) fn absolute(row: &ComposedRow, index: usize, geometry: &PageGeometry) -> Self {
        Self {
            top: geometry.row_top(index),
            bleed_width: geometry.width,
            run_x: row
                .runs
                .iter()
                .map(|run| geometry.padding_x + geometry.cells_width(run.cell_offset))
                .collect(),
        }
    }
}

pub(crate) fn paint_page_background(canvas: &mut Canvas, geometry: &PageGeometry, theme: &Theme) {
    canvas.set_fill_color(Color::from(theme.background));
    canvas.draw_rect(
        Pt::ZERO,
        Pt::ZERO,
        Pt::from_f32(geometry.width),
        Pt::from_f32(geometry.height),
    );
}

/// Records background fills, text and decorations for one row.
pub(crate) fn paint_row(
    canvas: &mut Canvas,
    row: &ComposedRow,
    placement: &RowPlacement,
    geometry: &PageGeometry,
    theme: &Theme,
    metrics: &FontMetrics,
) {
    let top = Pt::from_f32(placement.top);
    let row_height = Pt::from_f32(geometry.line_height);

    if row.paints_background(theme) {
        canvas.set_fill_color(Color::from(row.background));
        canvas.draw_rect(Pt::ZERO, top, Pt::from_f32(placement.bleed_width), row_height);
    }

    let font_size = geometry.font_size;
    let baseline = geometry.text_top(placement.top) + font_size * metrics.baseline_ratio();
    let cell_advance = Pt::from_f32(geometry.char_width);

    for (run, &x) in row.runs.iter().zip(&placement.run_x) {
        let width = geometry.cells_width(run.cell_width);

        if run.background != row.background {
            canvas.set_fill_color(Color::from(run.background));
            canvas.draw_rect(Pt::from_f32(x), top, Pt::from_f32(width), row_height);
        }

        let underline = run.attributes.contains(Attributes::UNDERLINE);
        let strikethrough = run.attributes.contains(Attributes::STRIKETHROUGH);
        let has_glyphs = !run.text.trim().is_empty();
        if !has_glyphs && !underline && !strikethrough {
            continue;
        }

        let dim = run.attributes.contains(Attributes::DIM);
        if dim {
            canvas.save_state();
            canvas.set_opacity(DIM_OPACITY, DIM_OPACITY);
        }

        let foreground = Color::from(run.foreground);
        if has_glyphs {
            canvas.set_fill_color(foreground);
            canvas.set_font(
                FontVariant::from_attributes(run.attributes),
                Pt::from_f32(font_size),
            );
            canvas.draw_text(
                Pt::from_f32(x),
                Pt::from_f32(baseline),
                &run.text,
                run.cell_width,
                cell_advance,
            );
        }

        let rules = [
            (underline, metrics.underline_rule(font_size)),
            (strikethrough, metrics.strikeout_rule(font_size)),
        ];
        for (enabled, (offset, thickness)) in rules {
            if !enabled || width <= 0.0 {
                continue;
            }
            let y = Pt::from_f32(baseline + offset);
            canvas.set_stroke_color(foreground);
            canvas.set_line_width(Pt::from_f32(thickness));
            canvas.draw_line(Pt::from_f32(x), y, Pt::from_f32(x + width), y);
        }

        if dim {
            canvas.restore_state();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::compose::compose_line;
    use crate::frame::Span;
    use crate::types::{Rgba, Size};

    fn geometry() -> PageGeometry {
        PageGeometry::new(200.0, 100.0, 10.0, 10.0, 10.0, 1.4).expect("geometry")
    }

    fn theme() -> Theme {
        Theme {
            background: Rgba::hex(0x000000),
            foreground: Rgba::hex(0xffffff),
        }
    }

    fn paint(line: &Line) -> Vec<Command> {
        let geometry = geometry();
        let row = compose_line(line, &theme());
        let placement = RowPlacement::absolute(&row, 0, &geometry);
        let mut canvas = Canvas::new(Size::new(geometry.width, geometry.height));
        paint_row(
            &mut canvas,
            &row,
            &placement,
            &geometry,
            &theme(),
            &FontMetrics::courier(),
        );
        canvas.finish().commands
    }

    fn rects(commands: &[Command]) -> Vec<(f32, f32)> {
        commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawRect { x, width, .. } => Some((x.to_f32(), width.to_f32())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn runs_advance_by_cell_width() {
        let line = Line::new(vec![
            Span::new("\u{4e2d}").with_foreground(Rgba::hex(0xff0000)),
            Span::new("x"),
        ]);
        let commands = paint(&line);
        let xs: Vec<f32> = commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawText { x, .. } => Some(x.to_f32()),
                _ => None,
            })
            .collect();
        assert_eq!(xs.len(), 2);
        assert!((xs[1] - xs[0] - 12.0).abs() < 1e-3);
    }

    #[test]
    fn captured_cell_width_overrides_measured_width() {
        // The terminal drew the arrow two cells wide; unicode-width says one.
        let line = Line::new(vec![
            Span::new("\u{2192}")
                .with_cell_width(2)
                .with_foreground(Rgba::hex(0x00ff00)),
            Span::new("x"),
        ]);
        assert_eq!(line.cell_width(), 3);
        let commands = paint(&line);
        let xs: Vec<f32> = commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawText { x, .. } => Some(x.to_f32()),
                _ => None,
            })
            .collect();
        assert_eq!(xs.len(), 2);
        assert!((xs[1] - xs[0] - 12.0).abs() < 1e-3);
    }

    #[test]
    fn row_background_bleeds_across_page() {
        let line = Line::new(vec![
            Span::new("a"),
            Span::new(" ").with_background(Rgba::hex(0x0000ff)),
        ]);
        let commands = paint(&line);
        let fills = rects(&commands);
        assert_eq!(fills[0], (0.0, 200.0));
        // The first run keeps the document background, so it paints over the bleed.
        assert_eq!(fills.len(), 2);
        assert!((fills[1].0 - 10.0).abs() < 1e-3);
    }

    #[test]
    fn plain_row_draws_no_fills() {
        let commands = paint(&Line::plain("hello"));
        assert!(rects(&commands).is_empty());
        assert!(commands
            .iter()
            .any(|cmd| matches!(cmd, Command::DrawText { text, .. } if text == "hello")));
    }

    #[test]
    fn dim_text_is_wrapped_in_saved_state() {
        let line = Line::new(vec![Span::new("faint").with_attributes(Attributes::DIM)]);
        let commands = paint(&line);
        assert_eq!(commands.first(), Some(&Command::SaveState));
        assert!(commands.contains(&Command::SetOpacity {
            fill: DIM_OPACITY,
            stroke: DIM_OPACITY
        }));
        assert_eq!(commands.last(), Some(&Command::RestoreState));
    }

    #[test]
    fn underline_and_strike_span_the_run() {
        let line = Line::new(vec![Span::new("ab")
            .with_attributes(Attributes::UNDERLINE | Attributes::STRIKETHROUGH)]);
        let commands = paint(&line);
        let lines: Vec<(f32, f32, f32)> = commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawLine { x1, y1, x2, .. } => {
                    Some((x1.to_f32(), x2.to_f32(), y1.to_f32()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(lines.len(), 2);
        assert!((lines[0].1 - lines[0].0 - 12.0).abs() < 1e-3);
        // Underline sits below the strikeout.
        assert!(lines[0].2 > lines[1].2);
    }

    #[test]
    fn whitespace_run_emits_no_text() {
        let commands = paint(&Line::plain("   "));
        assert!(!commands
            .iter()
            .any(|cmd| matches!(cmd, Command::DrawText { .. })));
    }
}
