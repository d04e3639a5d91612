mod backend;
mod canvas;
mod compose;
mod error;
mod font;
mod font_loader;
mod frame;
mod layout;
mod metrics;
mod options;
mod pdf;
mod plan;
mod raster;
mod types;
mod woff;

pub use backend::{DIM_OPACITY, PageRenderer};
pub use canvas::{Canvas, Command, Page};
pub use compose::{ComposedRow, Run, compose_line, compose_lines};
pub use error::{FrameshotError, Result};
pub use font::FontVariant;
pub use font_loader::load_font_bytes;
pub use frame::{Attributes, CapturedFrame, Line, Span, trim_trailing_blank_lines};
pub use layout::{
    CHAR_WIDTH_RATIO, LayoutSpec, MAX_FONT_SIZE, MIN_FONT_SIZE, PageGeometry, VerticalLayout,
    char_width, fit_font_size, line_height, lines_per_height,
};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use options::{FontPaths, ImageFormat, ImageOptions, PaginatedImageOptions, PdfExportOptions};
pub use pdf::{PdfDocumentBuilder, PdfPageRenderer, PdfPageStats};
pub use plan::{
    PageRange, PaginationStrategy, SMART_BREAK_MIN_FILL, break_candidates, chunk_fixed,
    plan_pages, plan_smart_breaks,
};
pub use raster::{RasterPage, RasterPageRenderer};
pub use types::{Color, Pt, Rgba, Size, Theme};

use font::FontFamily;
use pdf::PdfFonts;
use std::time::Instant;

/// Encoded pages of a paginated image export, in page order.
#[derive(Debug, Clone)]
pub struct PaginatedImages {
    pub pages: Vec<Vec<u8>>,
    pub total_lines: usize,
    pub page_count: usize,
    pub metrics: DocumentMetrics,
}

#[derive(Debug, Clone)]
pub struct PdfExport {
    pub bytes: Vec<u8>,
    pub total_lines: usize,
    pub page_count: usize,
    pub metrics: DocumentMetrics,
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn image_font_size(frame: &CapturedFrame, options: &ImageOptions) -> f32 {
    options.font_size.unwrap_or_else(|| {
        let content_width = options.width as f32 - 2.0 * options.padding_x as f32;
        fit_font_size(content_width.max(0.0), frame.effective_columns())
    })
}

/// Geometry of one raster page holding `lines` rows. Without a fixed height
/// the page grows to fit them.
fn image_geometry(options: &ImageOptions, font_size: f32, lines: usize) -> Result<(PageGeometry, usize)> {
    let vertical = LayoutSpec {
        font_size,
        line_height_multiplier: options.line_height_multiplier,
        padding_y: options.padding_y as f32,
        fixed_height: options.height.map(|height| height as f32),
    }
    .resolve(lines);
    let geometry = PageGeometry::new(
        options.width as f32,
        vertical.height,
        options.padding_x as f32,
        options.padding_y as f32,
        font_size,
        options.line_height_multiplier,
    )?;
    Ok((geometry, vertical.visible_lines))
}

/// Renders the whole frame as one image. Grows to fit the content unless
/// `options.height` is set, in which case rows past the bottom are clipped.
pub fn render_single_image(frame: &CapturedFrame, options: &ImageOptions) -> Result<Vec<u8>> {
    let started = Instant::now();
    let lines = trim_trailing_blank_lines(&frame.lines)?;
    let theme = options.theme.normalized();
    let font_size = image_font_size(frame, options);
    let (geometry, visible) = image_geometry(options, font_size, lines.len())?;

    let renderer = RasterPageRenderer::from_font_paths(&options.fonts, options.format, options.quality)?;
    let page = renderer.rasterize(&lines[..visible], &geometry, &theme, 0)?;

    log::info!(
        "single image: {} of {} lines, {:?}, {} bytes in {:.2}ms",
        visible,
        lines.len(),
        options.format,
        page.bytes.len(),
        elapsed_ms(started)
    );
    Ok(page.bytes)
}

/// Splits the frame into pages of at most `max_lines_per_page` rows and
/// rasterizes them in parallel.
pub fn render_paginated_images(
    frame: &CapturedFrame,
    options: &PaginatedImageOptions,
) -> Result<PaginatedImages> {
    use rayon::prelude::*;

    let started = Instant::now();
    let image = &options.image;
    let lines = trim_trailing_blank_lines(&frame.lines)?;
    let theme = image.theme.normalized();
    let font_size = image_font_size(frame, image);

    let mut capacity = options.max_lines_per_page;
    if let Some(height) = image.height {
        let row_height = line_height(font_size, image.line_height_multiplier);
        capacity = capacity.min(lines_per_height(height as f32, image.padding_y as f32, row_height));
    }
    let ranges = chunk_fixed(lines.len(), capacity);
    let geometries = ranges
        .iter()
        .map(|range| image_geometry(image, font_size, range.len()).map(|(geometry, _)| geometry))
        .collect::<Result<Vec<_>>>()?;

    let renderer = RasterPageRenderer::from_font_paths(&image.fonts, image.format, image.quality)?;
    let mut results: Vec<(usize, Result<(RasterPage, f64)>)> = ranges
        .par_iter()
        .zip(geometries.par_iter())
        .enumerate()
        .map(|(idx, (range, geometry))| {
            let t_page = Instant::now();
            let res = renderer
                .rasterize(&lines[range.start..range.end], geometry, &theme, idx)
                .map(|page| (page, elapsed_ms(t_page)));
            (idx, res)
        })
        .collect();
    results.sort_by_key(|(idx, _)| *idx);

    let mut pages = Vec::with_capacity(results.len());
    let mut page_metrics = Vec::with_capacity(results.len());
    for ((idx, res), range) in results.into_iter().zip(&ranges) {
        let (page, render_ms) = res?;
        log::debug!(
            "image page {}: lines {}..{}, {} commands, {} bytes, {:.2}ms",
            idx + 1,
            range.start,
            range.end,
            page.command_count,
            page.bytes.len(),
            render_ms
        );
        page_metrics.push(PageMetrics {
            page_number: idx + 1,
            start_line: range.start,
            end_line: range.end,
            command_count: page.command_count,
            output_bytes: page.bytes.len(),
            render_ms,
        });
        pages.push(page.bytes);
    }

    let total_bytes: usize = pages.iter().map(Vec::len).sum();
    log::info!(
        "paginated images: {} lines, {} pages, {} bytes in {:.2}ms",
        lines.len(),
        pages.len(),
        total_bytes,
        elapsed_ms(started)
    );
    Ok(PaginatedImages {
        page_count: pages.len(),
        pages,
        total_lines: lines.len(),
        metrics: DocumentMetrics::from_pages(page_metrics, total_bytes),
    })
}

/// Lays the frame out on fixed-size pages, breaking at section boundaries
/// where possible, and writes a PDF.
pub fn render_pdf(frame: &CapturedFrame, options: &PdfExportOptions) -> Result<PdfExport> {
    let started = Instant::now();
    let lines = trim_trailing_blank_lines(&frame.lines)?;
    let theme = options.theme.normalized();
    let font_size = options.font_size.unwrap_or_else(|| {
        let content_width = options.page_width - 2.0 * options.padding_x;
        fit_font_size(content_width.max(0.0), frame.effective_columns())
    });
    let geometry = PageGeometry::new(
        options.page_width,
        options.page_height,
        options.padding_x,
        options.padding_y,
        font_size,
        options.line_height_multiplier,
    )?;
    let ranges = plan_smart_breaks(lines, geometry.capacity());

    let fonts = match FontFamily::load(&options.fonts)? {
        Some(family) => PdfFonts::Embedded(family),
        None => PdfFonts::Builtin,
    };
    let builder = PdfDocumentBuilder::new(
        Vec::new(),
        Size::new(geometry.width, geometry.height),
        fonts,
        options.compress,
        options.title.clone(),
    )?;
    let mut renderer = PdfPageRenderer::new(builder);

    let mut page_metrics = Vec::with_capacity(ranges.len());
    for (idx, range) in ranges.iter().enumerate() {
        let t_page = Instant::now();
        let stats = renderer.render_page(&lines[range.start..range.end], &geometry, &theme)?;
        let render_ms = elapsed_ms(t_page);
        log::debug!(
            "pdf page {}: lines {}..{}, {} commands, {} content bytes, {:.2}ms",
            idx + 1,
            range.start,
            range.end,
            stats.command_count,
            stats.content_bytes,
            render_ms
        );
        page_metrics.push(PageMetrics {
            page_number: idx + 1,
            start_line: range.start,
            end_line: range.end,
            command_count: stats.command_count,
            output_bytes: stats.content_bytes,
            render_ms,
        });
    }
    let bytes = renderer.finish()?;

    log::info!(
        "pdf: {} lines, {} pages, {} bytes in {:.2}ms",
        lines.len(),
        ranges.len(),
        bytes.len(),
        elapsed_ms(started)
    );
    let total_bytes = bytes.len();
    Ok(PdfExport {
        bytes,
        total_lines: lines.len(),
        page_count: ranges.len(),
        metrics: DocumentMetrics::from_pages(page_metrics, total_bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use test_log::test;

    fn frame(texts: &[&str]) -> CapturedFrame {
        CapturedFrame::new(80, texts.iter().map(|text| Line::plain(text)).collect())
    }

    fn dark_theme() -> Theme {
        Theme {
            background: Rgba::hex(0x000000),
            foreground: Rgba::hex(0xffffff),
        }
    }

    fn count_token(bytes: &[u8], token: &[u8]) -> usize {
        bytes.windows(token.len()).filter(|w| *w == token).count()
    }

    #[test]
    fn blank_frame_is_empty_content_everywhere() {
        let blank = frame(&["", "   ", ""]);
        assert!(matches!(
            render_single_image(&blank, &ImageOptions::default()),
            Err(FrameshotError::EmptyContent)
        ));
        assert!(matches!(
            render_paginated_images(&blank, &PaginatedImageOptions::default()),
            Err(FrameshotError::EmptyContent)
        ));
        assert!(matches!(
            render_pdf(&blank, &PdfExportOptions::default()),
            Err(FrameshotError::EmptyContent)
        ));
    }

    #[test]
    fn zero_width_image_is_invalid_geometry() {
        let options = ImageOptions {
            width: 0,
            ..ImageOptions::default()
        };
        let err = render_single_image(&frame(&["x"]), &options).expect_err("zero width");
        assert!(matches!(err, FrameshotError::InvalidGeometry(_)));
    }

    #[test]
    fn short_pdf_fits_one_page() {
        let export = render_pdf(&frame(&["1", "2", "3", "4", "5"]), &PdfExportOptions::default())
            .expect("pdf");
        assert_eq!(export.page_count, 1);
        assert_eq!(export.total_lines, 5);
        assert_eq!(export.metrics.pages.len(), 1);
        assert_eq!(export.metrics.total_bytes, export.bytes.len());
        let doc = lopdf::Document::load_mem(&export.bytes).expect("parse");
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn pdf_breaks_at_section_boundary() {
        // 10pt rows between 10pt paddings: five rows per page.
        let options = PdfExportOptions {
            page_width: 300.0,
            page_height: 70.0,
            font_size: Some(10.0),
            line_height_multiplier: 1.0,
            padding_x: 10.0,
            padding_y: 10.0,
            ..PdfExportOptions::default()
        };
        let export = render_pdf(&frame(&["A", "", "", "B", "C", "", "", "D", "", ""]), &options)
            .expect("pdf");
        assert_eq!(export.total_lines, 8);
        assert_eq!(export.page_count, 2);
        let ranges: Vec<(usize, usize)> = export
            .metrics
            .pages
            .iter()
            .map(|page| (page.start_line, page.end_line))
            .collect();
        assert_eq!(ranges, vec![(0, 3), (3, 8)]);
        let doc = lopdf::Document::load_mem(&export.bytes).expect("parse");
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn transparent_foreground_on_blue_row_uses_theme_foreground() {
        let line = Line::new(vec![
            Span::new("hi")
                .with_foreground(Rgba::TRANSPARENT)
                .with_background(Rgba::hex(0x0000ff)),
        ]);
        let options = PdfExportOptions {
            theme: dark_theme(),
            compress: false,
            ..PdfExportOptions::default()
        };
        let export = render_pdf(&CapturedFrame::new(80, vec![line]), &options).expect("pdf");
        assert!(count_token(&export.bytes, b"0 0 1 rg") >= 1);
        assert!(count_token(&export.bytes, b"1 1 1 rg") >= 1);
    }

    #[test]
    fn pdf_title_lands_in_info() {
        let options = PdfExportOptions {
            title: Some("build log".to_string()),
            ..PdfExportOptions::default()
        };
        let export = render_pdf(&frame(&["ok"]), &options).expect("pdf");
        assert!(count_token(&export.bytes, b"(build log)") >= 1);
    }

    #[test]
    fn styled_faces_without_regular_are_rejected() {
        let options = PdfExportOptions {
            fonts: FontPaths {
                bold: Some("bold.ttf".into()),
                ..FontPaths::default()
            },
            ..PdfExportOptions::default()
        };
        let err = render_pdf(&frame(&["x"]), &options).expect_err("config");
        assert!(matches!(err, FrameshotError::InvalidConfiguration(_)));
    }

    #[test]
    fn short_frame_is_one_image_page() {
        let options = PaginatedImageOptions {
            max_lines_per_page: 10,
            ..PaginatedImageOptions::default()
        };
        let images = render_paginated_images(&frame(&["1", "2", "3", "4", "5"]), &options)
            .expect("images");
        assert_eq!(images.page_count, 1);
        assert_eq!(images.pages.len(), 1);
        assert_eq!(images.total_lines, 5);
    }

    #[test]
    fn image_pages_keep_order_and_cover_all_lines() {
        let texts: Vec<String> = (0..25).map(|i| format!("line {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let options = PaginatedImageOptions {
            max_lines_per_page: 10,
            ..PaginatedImageOptions::default()
        };
        let images = render_paginated_images(&frame(&refs), &options).expect("images");
        assert_eq!(images.page_count, 3);
        let ranges: Vec<(usize, usize)> = images
            .metrics
            .pages
            .iter()
            .map(|page| (page.start_line, page.end_line))
            .collect();
        assert_eq!(ranges, vec![(0, 10), (10, 20), (20, 25)]);
        // The short last page grows only to its own rows.
        let last = image::load_from_memory(&images.pages[2]).expect("png");
        let first = image::load_from_memory(&images.pages[0]).expect("png");
        assert!(last.height() < first.height());
    }

    #[test]
    fn fixed_height_single_image_clips() {
        let options = ImageOptions {
            width: 400,
            height: Some(100),
            font_size: Some(10.0),
            ..ImageOptions::default()
        };
        let texts: Vec<String> = (0..50).map(|i| format!("row {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let bytes = render_single_image(&frame(&refs), &options).expect("png");
        let decoded = image::load_from_memory(&bytes).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (400, 100));
    }
}
