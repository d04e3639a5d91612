use crate::error::{FrameshotError, Result};

/// Advance of one monospace cell relative to the font size.
pub const CHAR_WIDTH_RATIO: f32 = 0.6;

pub const MIN_FONT_SIZE: f32 = 6.0;
pub const MAX_FONT_SIZE: f32 = 24.0;

pub fn line_height(font_size: f32, multiplier: f32) -> f32 {
    (font_size * multiplier).round().max(1.0)
}

pub fn char_width(font_size: f32) -> f32 {
    font_size * CHAR_WIDTH_RATIO
}

/// Font size that fits `columns` cells into `content_width`, clamped to a readable range.
pub fn fit_font_size(content_width: f32, columns: u32) -> f32 {
    let columns = columns.max(1) as f32;
    let size = content_width / (columns * CHAR_WIDTH_RATIO);
    if !size.is_finite() {
        return MIN_FONT_SIZE;
    }
    size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

/// Rows of `line_height` that fit between the vertical paddings. May be zero.
pub fn lines_per_height(height: f32, padding_y: f32, line_height: f32) -> usize {
    if line_height <= 0.0 {
        return 0;
    }
    let usable = height - 2.0 * padding_y;
    if usable <= 0.0 || !usable.is_finite() {
        return 0;
    }
    (usable / line_height).floor() as usize
}

/// Vertical sizing request for a single artifact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutSpec {
    pub font_size: f32,
    pub line_height_multiplier: f32,
    pub padding_y: f32,
    /// Fixed output height; clips instead of paginating. `None` grows to content.
    pub fixed_height: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalLayout {
    pub visible_lines: usize,
    pub height: f32,
    pub line_height: f32,
}

impl LayoutSpec {
    pub fn resolve(&self, total_lines: usize) -> VerticalLayout {
        let line_height = line_height(self.font_size, self.line_height_multiplier);
        match self.fixed_height {
            Some(height) => {
                let capacity = lines_per_height(height, self.padding_y, line_height);
                VerticalLayout {
                    visible_lines: total_lines.min(capacity),
                    height,
                    line_height,
                }
            }
            None => VerticalLayout {
                visible_lines: total_lines,
                height: 2.0 * self.padding_y + total_lines as f32 * line_height,
                line_height,
            },
        }
    }
}

/// Per-page numbers shared by both backends. Units are pixels for raster
/// output and points for PDF output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub padding_x: f32,
    pub padding_y: f32,
    pub font_size: f32,
    pub line_height: f32,
    pub char_width: f32,
}

impl PageGeometry {
    pub fn new(
        width: f32,
        height: f32,
        padding_x: f32,
        padding_y: f32,
        font_size: f32,
        line_height_multiplier: f32,
    ) -> Result<Self> {
        if !(width.is_finite() && width > 0.0) || !(height.is_finite() && height > 0.0) {
            return Err(FrameshotError::InvalidGeometry(format!(
                "canvas must be positive, got {}x{}",
                width, height
            )));
        }
        if !(font_size.is_finite() && font_size > 0.0) {
            return Err(FrameshotError::InvalidGeometry(format!(
                "font size must be positive, got {}",
                font_size
            )));
        }
        if !(line_height_multiplier.is_finite() && line_height_multiplier > 0.0) {
            return Err(FrameshotError::InvalidGeometry(format!(
                "line height multiplier must be positive, got {}",
                line_height_multiplier
            )));
        }
        Ok(Self {
            width,
            height,
            padding_x: padding_x.max(0.0),
            padding_y: padding_y.max(0.0),
            font_size,
            line_height: line_height(font_size, line_height_multiplier),
            char_width: char_width(font_size),
        })
    }

    pub fn content_width(&self) -> f32 {
        (self.width - 2.0 * self.padding_x).max(0.0)
    }

    /// Lines per page before clamping.
    pub fn capacity(&self) -> usize {
        lines_per_height(self.height, self.padding_y, self.line_height)
    }

    /// Horizontal extent of `cells` monospace cells.
    pub fn cells_width(&self, cells: u32) -> f32 {
        cells as f32 * self.char_width
    }

    /// Top edge of row `index` within the page.
    pub fn row_top(&self, index: usize) -> f32 {
        self.padding_y + index as f32 * self.line_height
    }

    /// Top of the glyph box, centering `font_size` within the row.
    pub fn text_top(&self, row_top: f32) -> f32 {
        row_top + (self.line_height - self.font_size) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_height_rounds() {
        assert_eq!(line_height(14.0, 1.4), 20.0);
        assert_eq!(line_height(13.0, 1.5), 20.0);
    }

    #[test]
    fn fit_font_size_solves_for_columns_and_clamps() {
        assert!((fit_font_size(1200.0, 100) - 20.0).abs() < 1e-4);
        assert_eq!(fit_font_size(100.0, 200), MIN_FONT_SIZE);
        assert_eq!(fit_font_size(5000.0, 10), MAX_FONT_SIZE);
        assert_eq!(fit_font_size(600.0, 0), MAX_FONT_SIZE);
    }

    #[test]
    fn fixed_height_clips_visible_lines() {
        let spec = LayoutSpec {
            font_size: 10.0,
            line_height_multiplier: 2.0,
            padding_y: 10.0,
            fixed_height: Some(100.0),
        };
        let layout = spec.resolve(50);
        assert_eq!(layout.visible_lines, 4);
        assert_eq!(layout.height, 100.0);
        assert_eq!(spec.resolve(2).visible_lines, 2);
    }

    #[test]
    fn auto_height_grows_with_content() {
        let spec = LayoutSpec {
            font_size: 10.0,
            line_height_multiplier: 2.0,
            padding_y: 10.0,
            fixed_height: None,
        };
        let layout = spec.resolve(7);
        assert_eq!(layout.visible_lines, 7);
        assert_eq!(layout.height, 160.0);
    }

    #[test]
    fn capacity_can_be_zero_when_padding_eats_the_page() {
        assert_eq!(lines_per_height(40.0, 20.0, 10.0), 0);
        assert_eq!(lines_per_height(100.0, 10.0, 0.0), 0);
    }

    #[test]
    fn rejects_non_positive_canvas() {
        assert!(matches!(
            PageGeometry::new(0.0, 100.0, 0.0, 0.0, 12.0, 1.4),
            Err(FrameshotError::InvalidGeometry(_))
        ));
        assert!(PageGeometry::new(100.0, 100.0, 0.0, 0.0, 12.0, 1.4).is_ok());
    }

    #[test]
    fn wide_cells_advance_by_cell_count() {
        let geometry = PageGeometry::new(800.0, 600.0, 10.0, 10.0, 10.0, 1.5).expect("geometry");
        assert_eq!(geometry.cells_width(2), 2.0 * geometry.char_width);
        assert_eq!(geometry.text_top(10.0), 12.5);
    }
}
