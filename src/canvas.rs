use crate::font::FontVariant;
use crate::types::{Color, Pt, Size};

/// Drawing command in page space: origin at the top-left corner, y grows downward.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    // Applies both fill and stroke alpha. Values outside 0..1 are clamped.
    SetOpacity {
        fill: f32,
        stroke: f32,
    },
    SetFont {
        variant: FontVariant,
        size: Pt,
    },
    DrawRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    DrawLine {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
    },
    // Glyph `i` starts at `x + sum(cells[..i]) * cell_advance` on the baseline.
    DrawText {
        x: Pt,
        baseline: Pt,
        text: String,
        cells: Vec<u8>,
        cell_advance: Pt,
    },
}

#[derive(Debug, Clone)]
pub struct Page {
    pub size: Size,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Option<Color>,
    stroke_color: Option<Color>,
    line_width: Pt,
    font: Option<(FontVariant, Pt)>,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: None,
            stroke_color: None,
            line_width: Pt::from_f32(1.0),
            font: None,
        }
    }
}

/// Records commands for one page, dropping redundant state changes.
pub struct Canvas {
    size: Size,
    commands: Vec<Command>,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Canvas {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
        }
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.commands.push(Command::RestoreState);
        }
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == Some(color) {
            return;
        }
        self.current_state.fill_color = Some(color);
        self.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == Some(color) {
            return;
        }
        self.current_state.stroke_color = Some(color);
        self.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_opacity(&mut self, fill: f32, stroke: f32) {
        self.commands.push(Command::SetOpacity {
            fill: fill.clamp(0.0, 1.0),
            stroke: stroke.clamp(0.0, 1.0),
        });
    }

    pub fn set_font(&mut self, variant: FontVariant, size: Pt) {
        if self.current_state.font == Some((variant, size)) {
            return;
        }
        self.current_state.font = Some((variant, size));
        self.commands.push(Command::SetFont { variant, size });
    }

    pub fn draw_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        if width <= Pt::ZERO || height <= Pt::ZERO {
            return;
        }
        self.commands.push(Command::DrawRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn draw_line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt) {
        self.commands.push(Command::DrawLine { x1, y1, x2, y2 });
    }

    pub fn draw_text(&mut self, x: Pt, baseline: Pt, text: &str, cell_width: u32, cell_advance: Pt) {
        if text.is_empty() {
            return;
        }
        self.commands.push(Command::DrawText {
            x,
            baseline,
            text: text.to_string(),
            cells: glyph_cells(text, cell_width),
            cell_advance,
        });
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn finish(self) -> Page {
        Page {
            size: self.size,
            commands: self.commands,
        }
    }
}

/// Cells occupied by each char of `text`, adjusted so the total matches the
/// captured `cell_width` of the run.
pub(crate) fn glyph_cells(text: &str, cell_width: u32) -> Vec<u8> {
    use unicode_width::UnicodeWidthChar;

    let mut cells: Vec<u8> = text
        .chars()
        .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0).min(2) as u8)
        .collect();
    let measured: u32 = cells.iter().map(|&c| c as u32).sum();
    if measured == cell_width {
        return cells;
    }
    if measured < cell_width {
        // Stretch the last visible glyph; the run background already covers the gap.
        let target = cells
            .iter()
            .rposition(|&c| c > 0)
            .or(cells.len().checked_sub(1));
        if let Some(idx) = target {
            let extra = (cell_width - measured).min(u8::MAX as u32 - cells[idx] as u32);
            cells[idx] += extra as u8;
        }
        return cells;
    }
    let mut excess = measured - cell_width;
    for cell in cells.iter_mut().rev() {
        if excess == 0 {
            break;
        }
        let take = (*cell as u32).min(excess);
        *cell -= take as u8;
        excess -= take;
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundant_state_changes_are_dropped() {
        let mut canvas = Canvas::new(Size::new(100.0, 100.0));
        canvas.set_fill_color(Color::BLACK);
        canvas.set_fill_color(Color::BLACK);
        canvas.set_font(FontVariant::Regular, Pt::from_f32(10.0));
        canvas.set_font(FontVariant::Regular, Pt::from_f32(10.0));
        canvas.set_font(FontVariant::Bold, Pt::from_f32(10.0));
        assert_eq!(canvas.command_count(), 3);
    }

    #[test]
    fn restore_state_resets_dedupe() {
        let mut canvas = Canvas::new(Size::new(100.0, 100.0));
        canvas.save_state();
        canvas.set_fill_color(Color::rgb(1.0, 0.0, 0.0));
        canvas.restore_state();
        canvas.set_fill_color(Color::rgb(1.0, 0.0, 0.0));
        let page = canvas.finish();
        assert_eq!(page.commands.len(), 4);
    }

    #[test]
    fn empty_rects_and_text_are_skipped() {
        let mut canvas = Canvas::new(Size::new(100.0, 100.0));
        canvas.draw_rect(Pt::ZERO, Pt::ZERO, Pt::ZERO, Pt::from_f32(5.0));
        canvas.draw_text(Pt::ZERO, Pt::ZERO, "", 0, Pt::from_f32(6.0));
        assert_eq!(canvas.command_count(), 0);
    }

    #[test]
    fn glyph_cells_follow_display_width() {
        assert_eq!(glyph_cells("ab", 2), vec![1, 1]);
        assert_eq!(glyph_cells("\u{4e2d}x", 3), vec![2, 1]);
    }

    #[test]
    fn glyph_cells_honor_captured_width() {
        assert_eq!(glyph_cells("\u{2192}", 2), vec![2]);
        assert_eq!(glyph_cells("\u{4e2d}", 1), vec![1]);
        assert_eq!(glyph_cells("ab", 1), vec![1, 0]);
    }
}
