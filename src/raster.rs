use crate::backend::{PageRenderer, RowPlacement, paint_page_background, paint_row};
use crate::canvas::{Canvas, Command};
use crate::compose::{ComposedRow, compose_lines};
use crate::error::{FrameshotError, Result};
use crate::font::{self, FontFamily, FontMetrics, FontVariant};
use crate::frame::Line;
use crate::layout::PageGeometry;
use crate::options::{FontPaths, ImageFormat};
use crate::types::{Color, Theme};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder};
use taffy::prelude::*;
use tiny_skia::{FillRule, Paint, Path, PathBuilder, Pixmap, Stroke, Transform};
use ttf_parser::{GlyphId, OutlineBuilder};

// Horizontal shear applied when an italic face has to be synthesized.
const SYNTHETIC_OBLIQUE_SKEW: f32 = 0.2;
// Outline stroke width, relative to the font size, for synthesized bold.
const SYNTHETIC_BOLD_STROKE: f32 = 0.04;

/// One encoded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPage {
    pub bytes: Vec<u8>,
    pub command_count: usize,
}

/// Lays pages out with a flexbox tree and rasterizes them with tiny-skia.
pub struct RasterPageRenderer {
    family: FontFamily,
    metrics: FontMetrics,
    format: ImageFormat,
    quality: u8,
    next_page: usize,
}

impl RasterPageRenderer {
    pub(crate) fn new(family: FontFamily, format: ImageFormat, quality: u8) -> Self {
        for variant in [FontVariant::Bold, FontVariant::Italic, FontVariant::BoldItalic] {
            if family.exact(variant).is_none() {
                log::warn!("no {:?} face supplied, synthesizing it from the closest face", variant);
            }
        }
        let metrics = family.select(FontVariant::Regular).0.metrics.clone();
        Self {
            family,
            metrics,
            format,
            quality: quality.clamp(1, 100),
            next_page: 0,
        }
    }

    /// Uses the caller's fonts, or the monospace face bundled with the crate.
    pub(crate) fn from_font_paths(paths: &FontPaths, format: ImageFormat, quality: u8) -> Result<Self> {
        let family = match FontFamily::load(paths)? {
            Some(family) => family,
            None => FontFamily::bundled()?,
        };
        Ok(Self::new(family, format, quality))
    }

    /// Renders and encodes one page. Takes `&self` so pages can be rasterized in parallel.
    pub fn rasterize(
        &self,
        lines: &[Line],
        geometry: &PageGeometry,
        theme: &Theme,
        page_index: usize,
    ) -> Result<RasterPage> {
        let rows = compose_lines(lines, theme);
        let placements = layout_rows(&rows, geometry)?;

        let mut canvas = Canvas::new(crate::types::Size::new(geometry.width, geometry.height));
        paint_page_background(&mut canvas, geometry, theme);
        for (row, placement) in rows.iter().zip(&placements) {
            paint_row(&mut canvas, row, placement, geometry, theme, &self.metrics);
        }
        let page = canvas.finish();

        let width = geometry.width.round() as u32;
        let height = geometry.height.round() as u32;
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            FrameshotError::encoding(
                page_index,
                format!("cannot allocate a {}x{} pixel buffer", width, height),
            )
        })?;
        render_commands(&mut pixmap, &page.commands, Some(&self.family));

        let bytes = encode_pixmap(&pixmap, self.format, self.quality)
            .map_err(|message| FrameshotError::encoding(page_index, message))?;
        Ok(RasterPage {
            bytes,
            command_count: page.commands.len(),
        })
    }
}

impl PageRenderer for RasterPageRenderer {
    type Artifact = RasterPage;

    fn render_page(
        &mut self,
        lines: &[Line],
        geometry: &PageGeometry,
        theme: &Theme,
    ) -> Result<RasterPage> {
        let page = self.rasterize(lines, geometry, theme, self.next_page)?;
        self.next_page += 1;
        Ok(page)
    }
}

/// Builds the page tree (column of rows, each a row of fixed-width runs plus a
/// growing spacer) and reads back absolute positions.
pub(crate) fn layout_rows(rows: &[ComposedRow], geometry: &PageGeometry) -> Result<Vec<RowPlacement>> {
    let layout_err = |err: taffy::TaffyError| FrameshotError::InvalidGeometry(format!("layout failed: {err}"));

    let mut tree: TaffyTree<()> = TaffyTree::new();
    tree.disable_rounding();

    let mut row_nodes = Vec::with_capacity(rows.len());
    let mut row_children = Vec::with_capacity(rows.len());
    for row in rows {
        let mut children = Vec::with_capacity(row.runs.len() + 1);
        for run in &row.runs {
            let node = tree
                .new_leaf(Style {
                    size: Size {
                        width: length(geometry.cells_width(run.cell_width)),
                        height: length(geometry.line_height),
                    },
                    flex_shrink: 0.0,
                    ..Default::default()
                })
                .map_err(layout_err)?;
            children.push(node);
        }
        let spacer = tree
            .new_leaf(Style {
                size: Size {
                    width: auto(),
                    height: length(geometry.line_height),
                },
                flex_grow: 1.0,
                flex_shrink: 0.0,
                ..Default::default()
            })
            .map_err(layout_err)?;
        children.push(spacer);

        let node = tree
            .new_with_children(
                Style {
                    flex_direction: FlexDirection::Row,
                    size: Size {
                        width: auto(),
                        height: length(geometry.line_height),
                    },
                    flex_shrink: 0.0,
                    ..Default::default()
                },
                &children,
            )
            .map_err(layout_err)?;
        row_nodes.push(node);
        row_children.push(children);
    }

    let root = tree
        .new_with_children(
            Style {
                flex_direction: FlexDirection::Column,
                size: Size {
                    width: length(geometry.width),
                    height: length(geometry.height),
                },
                padding: Rect {
                    left: length(geometry.padding_x),
                    right: length(geometry.padding_x),
                    top: length(geometry.padding_y),
                    bottom: length(geometry.padding_y),
                },
                ..Default::default()
            },
            &row_nodes,
        )
        .map_err(layout_err)?;
    tree.compute_layout(root, Size::MAX_CONTENT).map_err(layout_err)?;

    let mut placements = Vec::with_capacity(rows.len());
    for (node, children) in row_nodes.iter().zip(&row_children) {
        let row_layout = tree.layout(*node).map_err(layout_err)?;
        let (row_x, row_y) = (row_layout.location.x, row_layout.location.y);
        let mut run_x = Vec::with_capacity(children.len().saturating_sub(1));
        let mut spacer_right = row_x;
        for (index, child) in children.iter().enumerate() {
            let layout = tree.layout(*child).map_err(layout_err)?;
            let x = row_x + layout.location.x;
            if index + 1 == children.len() {
                spacer_right = x + layout.size.width;
            } else {
                run_x.push(x);
            }
        }
        placements.push(RowPlacement {
            top: row_y,
            bleed_width: geometry.width.max(spacer_right + geometry.padding_x),
            run_x,
        });
    }
    Ok(placements)
}

#[derive(Clone, Copy)]
struct PaintState {
    fill: Color,
    stroke: Color,
    line_width: f32,
    opacity: f32,
    font: Option<(FontVariant, f32)>,
}

impl Default for PaintState {
    fn default() -> Self {
        Self {
            fill: Color::BLACK,
            stroke: Color::BLACK,
            line_width: 1.0,
            opacity: 1.0,
            font: None,
        }
    }
}

/// Executes canvas commands. Text is skipped when no font family is given.
fn render_commands(pixmap: &mut Pixmap, commands: &[Command], family: Option<&FontFamily>) {
    let mut state = PaintState::default();
    let mut stack: Vec<PaintState> = Vec::new();

    for command in commands {
        match command {
            Command::SaveState => stack.push(state),
            Command::RestoreState => {
                if let Some(saved) = stack.pop() {
                    state = saved;
                }
            }
            Command::SetFillColor(color) => state.fill = *color,
            Command::SetStrokeColor(color) => state.stroke = *color,
            Command::SetLineWidth(width) => state.line_width = width.to_f32(),
            Command::SetOpacity { fill, .. } => state.opacity = *fill,
            Command::SetFont { variant, size } => state.font = Some((*variant, size.to_f32())),
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                let rect = tiny_skia::Rect::from_xywh(
                    x.to_f32(),
                    y.to_f32(),
                    width.to_f32(),
                    height.to_f32(),
                );
                if let Some(rect) = rect {
                    let mut paint = fill_paint(state.fill, state.opacity);
                    // Adjacent fills must meet without seams.
                    paint.anti_alias = false;
                    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
                }
            }
            Command::DrawLine { x1, y1, x2, y2 } => {
                let mut builder = PathBuilder::new();
                builder.move_to(x1.to_f32(), y1.to_f32());
                builder.line_to(x2.to_f32(), y2.to_f32());
                if let Some(path) = builder.finish() {
                    let paint = fill_paint(state.stroke, state.opacity);
                    let stroke = Stroke {
                        width: state.line_width.max(0.0),
                        ..Stroke::default()
                    };
                    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
                }
            }
            Command::DrawText {
                x,
                baseline,
                text,
                cells,
                cell_advance,
            } => {
                let (Some(family), Some((variant, size))) = (family, state.font) else {
                    continue;
                };
                let glyphs = GlyphRun {
                    x: x.to_f32(),
                    baseline: baseline.to_f32(),
                    text,
                    cells,
                    cell_advance: cell_advance.to_f32(),
                    size,
                };
                draw_glyphs(pixmap, family, variant, &glyphs, fill_paint(state.fill, state.opacity));
            }
        }
    }
}

struct GlyphRun<'a> {
    x: f32,
    baseline: f32,
    text: &'a str,
    cells: &'a [u8],
    cell_advance: f32,
    size: f32,
}

fn draw_glyphs(
    pixmap: &mut Pixmap,
    family: &FontFamily,
    variant: FontVariant,
    run: &GlyphRun<'_>,
    paint: Paint<'static>,
) {
    let (font, actual) = family.select(variant);
    let Some(face) = font.face() else {
        return;
    };
    let synthetic_bold = variant.is_bold() && !actual.is_bold();
    let synthetic_italic = variant.is_italic() && !actual.is_italic();
    let scale = run.size / face.units_per_em().max(1) as f32;
    let skew = if synthetic_italic {
        SYNTHETIC_OBLIQUE_SKEW
    } else {
        0.0
    };
    let bold_stroke = synthetic_bold.then(|| Stroke {
        width: run.size * SYNTHETIC_BOLD_STROKE,
        ..Stroke::default()
    });

    let mut pen_x = run.x;
    for (ch, cells) in run.text.chars().zip(run.cells) {
        let gid = font::glyph_id(&face, ch);
        if gid != 0 && !ch.is_whitespace() {
            if let Some(path) = glyph_path(&face, gid, scale) {
                // Outlines are y-up; flip onto the baseline.
                let transform = Transform::from_row(1.0, 0.0, skew, -1.0, pen_x, run.baseline);
                pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
                if let Some(stroke) = bold_stroke.as_ref() {
                    pixmap.stroke_path(&path, &paint, stroke, transform, None);
                }
            }
        }
        pen_x += *cells as f32 * run.cell_advance;
    }
}

fn glyph_path(face: &ttf_parser::Face<'_>, gid: u16, scale: f32) -> Option<Path> {
    let mut builder = GlyphPathBuilder::new(scale);
    face.outline_glyph(GlyphId(gid), &mut builder)?;
    builder.finish()
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            scale,
        }
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(x * self.scale, y * self.scale);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(x * self.scale, y * self.scale);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder
            .quad_to(x1 * self.scale, y1 * self.scale, x * self.scale, y * self.scale);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            x1 * self.scale,
            y1 * self.scale,
            x2 * self.scale,
            y2 * self.scale,
            x * self.scale,
            y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn fill_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, opacity));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color, opacity: f32) -> tiny_skia::Color {
    let r = color.r.clamp(0.0, 1.0);
    let g = color.g.clamp(0.0, 1.0);
    let b = color.b.clamp(0.0, 1.0);
    let a = opacity.clamp(0.0, 1.0);
    tiny_skia::Color::from_rgba(r, g, b, a)
        .unwrap_or_else(|| tiny_skia::Color::from_rgba8(0, 0, 0, 255))
}

fn encode_pixmap(pixmap: &Pixmap, format: ImageFormat, quality: u8) -> std::result::Result<Vec<u8>, String> {
    let (width, height) = (pixmap.width(), pixmap.height());
    match format {
        ImageFormat::Png => pixmap
            .encode_png()
            .map_err(|err| format!("png encode failed: {err}")),
        ImageFormat::Jpeg => {
            let rgb: Vec<u8> = pixmap
                .pixels()
                .iter()
                .flat_map(|px| {
                    let c = px.demultiply();
                    [c.red(), c.green(), c.blue()]
                })
                .collect();
            let mut out = Vec::new();
            JpegEncoder::new_with_quality(&mut out, quality)
                .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
                .map_err(|err| format!("jpeg encode failed: {err}"))?;
            Ok(out)
        }
        ImageFormat::Webp => {
            let rgba: Vec<u8> = pixmap
                .pixels()
                .iter()
                .flat_map(|px| {
                    let c = px.demultiply();
                    [c.red(), c.green(), c.blue(), c.alpha()]
                })
                .collect();
            let mut out = Vec::new();
            WebPEncoder::new_lossless(&mut out)
                .write_image(&rgba, width, height, ExtendedColorType::Rgba8)
                .map_err(|err| format!("webp encode failed: {err}"))?;
            Ok(out)
        }
    }
}
