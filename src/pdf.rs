use crate::backend::{PageRenderer, RowPlacement, paint_page_background, paint_row};
use crate::canvas::{Canvas, Command, Page};
use crate::compose::compose_lines;
use crate::error::Result;
use crate::font::{self, FontFamily, FontMetrics, FontProgramKind, FontVariant, RegisteredFont};
use crate::frame::Line;
use crate::layout::PageGeometry;
use crate::types::{Color, Pt, Size, Theme};
use fixed::types::I32F32;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

const PDF_CATALOG_ID: usize = 1;
const PDF_PAGES_ID: usize = 2;
const PDF_RESOURCES_ID: usize = 3;

// Page tree fan-out before a new intermediate /Pages node is started.
const PDF_PAGE_NODE_MAX_KIDS: usize = 256;

// TJ adjustments smaller than this (thousandths of an em) are dropped.
const TJ_EPSILON: f32 = 0.5;

const COURIER_ADVANCE: u16 = 600;

struct PdfPageNode {
    id: usize,
    kids: Vec<usize>,
}

/// Font program behind the text of a document.
pub(crate) enum PdfFonts {
    /// Base-14 Courier family, all four variants available.
    Builtin,
    Embedded(FontFamily),
}

impl PdfFonts {
    pub(crate) fn metrics(&self) -> FontMetrics {
        match self {
            PdfFonts::Builtin => FontMetrics::courier(),
            PdfFonts::Embedded(family) => family.select(FontVariant::Regular).0.metrics.clone(),
        }
    }
}

enum FontResourceKind {
    Type1 { base_font: &'static str },
    IdentityH { glyph_map: BTreeMap<u16, String> },
}

struct FontResource {
    resource: String,
    start_id: usize,
    variant: FontVariant,
    kind: FontResourceKind,
}

impl FontResource {
    fn font_object_id(&self) -> usize {
        match self.kind {
            FontResourceKind::Type1 { .. } => self.start_id,
            FontResourceKind::IdentityH { .. } => self.start_id + 4,
        }
    }
}

/// Writes a PDF to `writer` one page at a time.
///
/// Pages are serialized as soon as they are added, so the builder must see
/// them in document order. Shared objects (fonts, graphics states, the page
/// tree) are written by [`PdfDocumentBuilder::finish`].
pub struct PdfDocumentBuilder<W: Write> {
    writer: W,
    offset: usize,
    offsets: Vec<usize>, // index by object id; 0 is the free object.
    next_id: usize,
    page_size: Size,
    compress: bool,
    title: Option<String>,
    fonts: PdfFonts,

    font_resources: BTreeMap<FontVariant, FontResource>,
    next_font_resource: usize,

    gs_resources: Vec<(String, usize)>,
    gs_name_map: HashMap<(u16, u16), String>,
    next_gs_index: usize,

    page_nodes: Vec<PdfPageNode>,
    current_node: Option<PdfPageNode>,
    page_count: usize,
    replaced_chars: usize,
}

impl<W: Write> PdfDocumentBuilder<W> {
    pub(crate) fn new(
        mut writer: W,
        page_size: Size,
        fonts: PdfFonts,
        compress: bool,
        title: Option<String>,
    ) -> io::Result<Self> {
        let mut offset = 0usize;
        write_bytes(&mut writer, b"%PDF-1.7\n", &mut offset)?;
        write_bytes(&mut writer, b"%\xE2\xE3\xCF\xD3\n", &mut offset)?;
        Ok(Self {
            writer,
            offset,
            offsets: vec![0; PDF_RESOURCES_ID + 1],
            next_id: PDF_RESOURCES_ID + 1,
            page_size,
            compress,
            title,
            fonts,
            font_resources: BTreeMap::new(),
            next_font_resource: 1,
            gs_resources: Vec::new(),
            gs_name_map: HashMap::new(),
            next_gs_index: 1,
            page_nodes: Vec::new(),
            current_node: None,
            page_count: 0,
            replaced_chars: 0,
        })
    }

    pub(crate) fn metrics(&self) -> FontMetrics {
        self.fonts.metrics()
    }

    /// Serializes `page` and appends it to the page tree. Returns the size of
    /// the uncompressed content stream.
    pub fn add_page(&mut self, page: &Page) -> io::Result<usize> {
        let parent_id = self.ensure_page_node();
        let start = self.alloc_ids(2);
        let content_id = start;
        let page_id = start + 1;
        if let Some(node) = self.current_node.as_mut() {
            node.kids.push(page_id);
        }

        let content = self.render_commands(&page.commands)?;
        let content_len = content.len();
        let body = stream_object(content.as_bytes(), None, self.compress)?;
        self.write_object(content_id, &body)?;

        let page_obj = format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R >>",
            parent_id,
            fmt_pt(self.page_size.width),
            fmt_pt(self.page_size.height),
            PDF_RESOURCES_ID,
            content_id
        );
        self.write_object(page_id, page_obj.as_bytes())?;
        self.page_count += 1;
        Ok(content_len)
    }

    /// Writes shared objects, the cross-reference table and the trailer.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(node) = self.current_node.take() {
            self.page_nodes.push(node);
        }
        if self.replaced_chars > 0 {
            log::debug!(
                "{} characters outside WinAnsi were replaced in built-in font text",
                self.replaced_chars
            );
        }

        // 1) Fonts.
        let font_resources = std::mem::take(&mut self.font_resources);
        for font_state in font_resources.values() {
            match &font_state.kind {
                FontResourceKind::Type1 { base_font } => {
                    self.write_object(font_state.start_id, font_object(base_font).as_bytes())?;
                }
                FontResourceKind::IdentityH { glyph_map } => {
                    let PdfFonts::Embedded(family) = &self.fonts else {
                        continue;
                    };
                    let (font, _) = family.select(font_state.variant);
                    let objects =
                        build_cidfont_objects(font, glyph_map, font_state.start_id, self.compress)?;
                    for (i, obj) in objects.iter().enumerate() {
                        self.write_object(font_state.start_id + i, obj)?;
                    }
                }
            }
        }

        // 2) Resources dictionary shared by every page.
        let font_entries: Vec<(String, usize)> = font_resources
            .values()
            .map(|state| (state.resource.clone(), state.font_object_id()))
            .collect();
        let mut resources = vec![format!("/Font {}", resource_dict(&font_entries))];
        if !self.gs_resources.is_empty() {
            resources.push(format!("/ExtGState {}", resource_dict(&self.gs_resources)));
        }
        self.write_object(
            PDF_RESOURCES_ID,
            format!("<< {} >>", resources.join(" ")).as_bytes(),
        )?;

        // 3) Page tree.
        let page_nodes = std::mem::take(&mut self.page_nodes);
        for node in &page_nodes {
            let body = format!(
                "<< /Type /Pages /Parent {} 0 R /Count {} /Kids [{}] >>",
                PDF_PAGES_ID,
                node.kids.len(),
                object_refs(&node.kids)
            );
            self.write_object(node.id, body.as_bytes())?;
        }
        let node_ids: Vec<usize> = page_nodes.iter().map(|node| node.id).collect();
        let root = format!(
            "<< /Type /Pages /Count {} /Kids [{}] >>",
            self.page_count,
            object_refs(&node_ids)
        );
        self.write_object(PDF_PAGES_ID, root.as_bytes())?;

        // 4) Info + catalog.
        let info_id = self.alloc_ids(1);
        let info = info_object(self.title.as_deref());
        self.write_object(info_id, info.as_bytes())?;
        let mut catalog = format!("<< /Type /Catalog /Pages {} 0 R", PDF_PAGES_ID);
        if self.title.is_some() {
            catalog.push_str(" /ViewerPreferences << /DisplayDocTitle true >>");
        }
        catalog.push_str(" >>");
        self.write_object(PDF_CATALOG_ID, catalog.as_bytes())?;

        // 5) XRef + trailer.
        let total_objects = self.next_id.saturating_sub(1);
        let xref_start = self.offset;
        write_str(
            &mut self.writer,
            &format!("xref\n0 {}\n", total_objects + 1),
            &mut self.offset,
        )?;
        write_bytes(&mut self.writer, b"0000000000 65535 f \n", &mut self.offset)?;
        for id in 1..=total_objects {
            let obj_offset = self.offsets.get(id).copied().unwrap_or(0);
            write_str(
                &mut self.writer,
                &format!("{:010} 00000 n \n", obj_offset),
                &mut self.offset,
            )?;
        }
        let trailer = format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF",
            total_objects + 1,
            PDF_CATALOG_ID,
            info_id,
            xref_start
        );
        write_str(&mut self.writer, &trailer, &mut self.offset)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn render_commands(&mut self, commands: &[Command]) -> io::Result<String> {
        let page_height = self.page_size.height;
        let mut out = String::new();
        let mut current_font: Option<(FontVariant, Pt)> = None;
        let mut font_stack: Vec<Option<(FontVariant, Pt)>> = Vec::new();

        for command in commands {
            match command {
                Command::SaveState => {
                    font_stack.push(current_font);
                    out.push_str("q\n");
                }
                Command::RestoreState => {
                    current_font = font_stack.pop().unwrap_or(current_font);
                    out.push_str("Q\n");
                }
                Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
                Command::SetStrokeColor(color) => out.push_str(&color_to_pdf_stroke(*color)),
                Command::SetLineWidth(width) => {
                    out.push_str(&format!("{} w\n", fmt_pt(*width)));
                }
                Command::SetOpacity { fill, stroke } => {
                    let key = (quantize_alpha(*fill), quantize_alpha(*stroke));
                    let name = self.ensure_extgstate(key)?;
                    out.push_str(&format!("/{} gs\n", name));
                }
                Command::SetFont { variant, size } => {
                    current_font = Some((*variant, *size));
                }
                Command::DrawRect {
                    x,
                    y,
                    width,
                    height,
                } => {
                    let draw_y = page_height - *y - *height;
                    out.push_str(&format!(
                        "{} {} {} {} re\nf\n",
                        fmt_pt(*x),
                        fmt_pt(draw_y),
                        fmt_pt(*width),
                        fmt_pt(*height)
                    ));
                }
                Command::DrawLine { x1, y1, x2, y2 } => {
                    out.push_str(&format!(
                        "{} {} m\n{} {} l\nS\n",
                        fmt_pt(*x1),
                        fmt_pt(page_height - *y1),
                        fmt_pt(*x2),
                        fmt_pt(page_height - *y2)
                    ));
                }
                Command::DrawText {
                    x,
                    baseline,
                    text,
                    cells,
                    cell_advance,
                } => {
                    let Some((variant, size)) = current_font else {
                        continue;
                    };
                    let resource = self.ensure_font(variant);
                    let tj = self.text_to_tj(variant, size, text, cells, *cell_advance);
                    out.push_str("BT\n");
                    out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(size)));
                    out.push_str(&format!(
                        "{} {} Td\n",
                        fmt_pt(*x),
                        fmt_pt(page_height - *baseline)
                    ));
                    out.push_str(&tj);
                    out.push_str("ET\n");
                }
            }
        }
        Ok(out)
    }

    /// Builds a TJ array whose kerning values place glyph `i` exactly at the
    /// start of its cell.
    fn text_to_tj(
        &mut self,
        variant: FontVariant,
        size: Pt,
        text: &str,
        cells: &[u8],
        cell_advance: Pt,
    ) -> String {
        let font_size = size.to_f32().max(f32::EPSILON);
        let cell_em = cell_advance.to_f32() / font_size * 1000.0;

        let mut glyphs: Vec<(String, f32)> = Vec::with_capacity(cells.len());
        let resolved = self.font_resources.get_mut(&resolved_variant(&self.fonts, variant));
        match (&self.fonts, resolved) {
            (PdfFonts::Embedded(family), Some(state)) => {
                let (font, _) = family.select(variant);
                let face = font.face();
                let FontResourceKind::IdentityH { glyph_map } = &mut state.kind else {
                    return String::new();
                };
                for ch in text.chars() {
                    let (gid, advance) = match face.as_ref() {
                        Some(face) => {
                            let gid = font::glyph_id(face, ch);
                            (gid, font::glyph_advance(face, gid))
                        }
                        None => (0, font.metrics.missing_width),
                    };
                    if gid != 0 {
                        glyph_map.entry(gid).or_insert_with(|| ch.to_string());
                    }
                    glyphs.push((format!("{:04X}", gid), advance as f32));
                }
            }
            _ => {
                let encoded = encode_winansi_pdf_string(text);
                self.replaced_chars += encoded.replaced;
                for code in encoded.codes {
                    glyphs.push((code, COURIER_ADVANCE as f32));
                }
            }
        }

        let hex = matches!(self.fonts, PdfFonts::Embedded(_));
        let (open, close) = if hex { ('<', '>') } else { ('(', ')') };
        let mut out = String::from("[");
        let mut segment = String::new();
        for (index, (code, advance)) in glyphs.iter().enumerate() {
            segment.push_str(code);
            let wanted = cells.get(index).copied().unwrap_or(1) as f32 * cell_em;
            let adjust = advance - wanted;
            if adjust.abs() >= TJ_EPSILON && index + 1 < glyphs.len() {
                out.push(open);
                out.push_str(&segment);
                out.push(close);
                out.push_str(&format!(" {} ", fmt(adjust)));
                segment.clear();
            }
        }
        if !segment.is_empty() {
            out.push(open);
            out.push_str(&segment);
            out.push(close);
        }
        out.push_str("] TJ\n");
        out
    }

    fn ensure_font(&mut self, variant: FontVariant) -> String {
        let key = resolved_variant(&self.fonts, variant);
        if let Some(state) = self.font_resources.get(&key) {
            return state.resource.clone();
        }
        let resource = format!("F{}", self.next_font_resource);
        self.next_font_resource += 1;
        let (kind, ids) = match &self.fonts {
            PdfFonts::Builtin => (
                FontResourceKind::Type1 {
                    base_font: key.courier_name(),
                },
                1,
            ),
            PdfFonts::Embedded(_) => (
                FontResourceKind::IdentityH {
                    glyph_map: BTreeMap::new(),
                },
                5,
            ),
        };
        let start_id = self.alloc_ids(ids);
        self.font_resources.insert(
            key,
            FontResource {
                resource: resource.clone(),
                start_id,
                variant: key,
                kind,
            },
        );
        resource
    }

    fn ensure_extgstate(&mut self, key: (u16, u16)) -> io::Result<String> {
        if let Some(name) = self.gs_name_map.get(&key) {
            return Ok(name.clone());
        }
        let (f, s) = key;
        let obj_id = self.alloc_ids(1);
        let name = format!("GS{}", self.next_gs_index);
        self.next_gs_index += 1;
        let obj = format!(
            "<< /Type /ExtGState /ca {} /CA {} >>",
            fmt(f as f32 / 1000.0),
            fmt(s as f32 / 1000.0)
        );
        self.write_object(obj_id, obj.as_bytes())?;
        self.gs_resources.push((name.clone(), obj_id));
        self.gs_name_map.insert(key, name.clone());
        Ok(name)
    }

    fn ensure_offsets_len(&mut self, required_len: usize) {
        if self.offsets.len() < required_len {
            self.offsets.resize(required_len, 0);
        }
    }

    fn alloc_ids(&mut self, count: usize) -> usize {
        let start = self.next_id;
        self.next_id = self.next_id.saturating_add(count);
        self.ensure_offsets_len(self.next_id);
        start
    }

    fn write_object(&mut self, obj_id: usize, body: &[u8]) -> io::Result<()> {
        if let Some(slot) = self.offsets.get_mut(obj_id) {
            *slot = self.offset;
        }
        write_str(&mut self.writer, &format!("{} 0 obj\n", obj_id), &mut self.offset)?;
        write_bytes(&mut self.writer, body, &mut self.offset)?;
        write_bytes(&mut self.writer, b"\nendobj\n", &mut self.offset)
    }

    fn ensure_page_node(&mut self) -> usize {
        let needs_new = self
            .current_node
            .as_ref()
            .map(|n| n.kids.len() >= PDF_PAGE_NODE_MAX_KIDS)
            .unwrap_or(true);
        if needs_new {
            if let Some(node) = self.current_node.take() {
                self.page_nodes.push(node);
            }
            let id = self.alloc_ids(1);
            self.current_node = Some(PdfPageNode {
                id,
                kids: Vec::with_capacity(PDF_PAGE_NODE_MAX_KIDS),
            });
        }
        self.current_node
            .as_ref()
            .map(|n| n.id)
            .unwrap_or(PDF_PAGES_ID)
    }
}

/// Variant whose font resource serves `requested`. Missing embedded faces
/// fall back to the regular face without synthesizing a style.
fn resolved_variant(fonts: &PdfFonts, requested: FontVariant) -> FontVariant {
    match fonts {
        PdfFonts::Builtin => requested,
        PdfFonts::Embedded(family) => family.select(requested).1,
    }
}

/// Output of [`PdfPageRenderer::render_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfPageStats {
    pub command_count: usize,
    pub content_bytes: usize,
}

/// Paints composed rows at absolute positions and streams each page into a
/// [`PdfDocumentBuilder`].
pub struct PdfPageRenderer<W: Write> {
    builder: PdfDocumentBuilder<W>,
    metrics: FontMetrics,
}

impl<W: Write> PdfPageRenderer<W> {
    pub(crate) fn new(builder: PdfDocumentBuilder<W>) -> Self {
        let metrics = builder.metrics();
        Self { builder, metrics }
    }

    pub fn finish(self) -> io::Result<W> {
        self.builder.finish()
    }
}

impl<W: Write> PageRenderer for PdfPageRenderer<W> {
    type Artifact = PdfPageStats;

    fn render_page(
        &mut self,
        lines: &[Line],
        geometry: &PageGeometry,
        theme: &Theme,
    ) -> Result<PdfPageStats> {
        let rows = compose_lines(lines, theme);
        let mut canvas = Canvas::new(Size::new(geometry.width, geometry.height));
        paint_page_background(&mut canvas, geometry, theme);
        for (index, row) in rows.iter().enumerate() {
            let placement = RowPlacement::absolute(row, index, geometry);
            paint_row(&mut canvas, row, &placement, geometry, theme, &self.metrics);
        }
        let page = canvas.finish();
        let content_bytes = self.builder.add_page(&page)?;
        Ok(PdfPageStats {
            command_count: page.commands.len(),
            content_bytes,
        })
    }
}

fn build_cidfont_objects(
    font: &RegisteredFont,
    glyph_map: &BTreeMap<u16, String>,
    start_id: usize,
    compress: bool,
) -> io::Result<Vec<Vec<u8>>> {
    let font_file_id = start_id;
    let descriptor_id = start_id + 1;
    let cid_font_id = start_id + 2;
    let to_unicode_id = start_id + 3;

    let mut objects = Vec::with_capacity(5);
    objects.push(font_file_object(&font.data, font.program_kind, compress)?);
    objects.push(font_descriptor_object(font, font_file_id).into_bytes());

    let face = font.face();
    let w_entries: Vec<String> = glyph_map
        .keys()
        .map(|gid| {
            let advance = face
                .as_ref()
                .map(|face| font::glyph_advance(face, *gid))
                .filter(|adv| *adv > 0)
                .unwrap_or(font.metrics.missing_width);
            format!("{} [{}]", gid, advance)
        })
        .collect();
    let w_array = if w_entries.is_empty() {
        String::new()
    } else {
        format!(" /W [{}]", w_entries.join(" "))
    };
    let base = sanitize_font_name(&font.name);
    let (subtype, cid_to_gid) = match font.program_kind {
        FontProgramKind::TrueType => ("CIDFontType2", " /CIDToGIDMap /Identity"),
        FontProgramKind::OpenTypeCff => ("CIDFontType0", ""),
    };
    objects.push(
        format!(
            "<< /Type /Font /Subtype /{} /BaseFont /{} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {} 0 R /DW {}{}{} >>",
            subtype, base, descriptor_id, font.metrics.missing_width, w_array, cid_to_gid
        )
        .into_bytes(),
    );
    objects.push(stream_object(
        to_unicode_cmap(glyph_map).as_bytes(),
        None,
        compress,
    )?);
    objects.push(
        format!(
            "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
            base, cid_font_id, to_unicode_id
        )
        .into_bytes(),
    );
    Ok(objects)
}

fn font_descriptor_object(font: &RegisteredFont, font_file_id: usize) -> String {
    let metrics = &font.metrics;
    let mut flags = 32;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    let font_file_entry = match font.program_kind {
        FontProgramKind::OpenTypeCff => "FontFile3",
        FontProgramKind::TrueType => "FontFile2",
    };
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV {} /MissingWidth {} /{} {} 0 R >>",
        sanitize_font_name(&font.name),
        flags,
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.stem_v,
        metrics.missing_width,
        font_file_entry,
        font_file_id
    )
}

fn font_file_object(data: &[u8], kind: FontProgramKind, compress: bool) -> io::Result<Vec<u8>> {
    let extra = match kind {
        FontProgramKind::OpenTypeCff => " /Subtype /OpenType".to_string(),
        FontProgramKind::TrueType => format!(" /Length1 {}", data.len()),
    };
    stream_object(data, Some(&extra), compress)
}

fn font_object(base_font: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        base_font
    )
}

fn resource_dict(entries: &[(String, usize)]) -> String {
    let entries: Vec<String> = entries
        .iter()
        .map(|(resource, obj_id)| format!("/{} {} 0 R", resource, obj_id))
        .collect();
    format!("<< {} >>", entries.join(" "))
}

fn object_refs(ids: &[usize]) -> String {
    ids.iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ")
}

fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        out
    }
}

fn stream_object(data: &[u8], extra_dict: Option<&str>, compress: bool) -> io::Result<Vec<u8>> {
    let compressed;
    let (payload, filter) = if compress {
        compressed = flate_compress(data)?;
        (compressed.as_slice(), " /Filter /FlateDecode")
    } else {
        (data, "")
    };
    let mut out = format!(
        "<< /Length {}{}{} >>\nstream\n",
        payload.len(),
        filter,
        extra_dict.unwrap_or("")
    )
    .into_bytes();
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\nendstream");
    Ok(out)
}

fn flate_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn info_object(title: Option<&str>) -> String {
    let mut entries = vec!["/Producer (frameshot)".to_string()];
    if let Some(title) = title {
        entries.push(format!("/Title ({})", escape_pdf_string(title)));
    }
    format!("<< {} >>", entries.join(" "))
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, data: &str, offset: &mut usize) -> io::Result<()> {
    write_bytes(writer, data.as_bytes(), offset)
}

fn escape_pdf_string(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

struct WinAnsiEncoded {
    /// One escaped code per input char.
    codes: Vec<String>,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut codes = Vec::with_capacity(input.len());
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            // cp1252 extensions
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };
        codes.push(match byte {
            b'\\' => "\\\\".to_string(),
            b'(' => "\\(".to_string(),
            b')' => "\\)".to_string(),
            b if b < 0x20 || b >= 0x7f => format!("\\{:03o}", b),
            b => (b as char).to_string(),
        });
    }
    WinAnsiEncoded { codes, replaced }
}

fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(&u16, &String)> = glyph_map.iter().collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    // bfchar sections hold at most 100 entries.
    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, text) in chunk {
            let mut uni = String::new();
            for unit in text.encode_utf16() {
                uni.push_str(&format!("{:04X}", unit));
            }
            out.push_str(&format!("<{:04X}> <{}>\n", gid, uni));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

fn quantize_alpha(value: f32) -> u16 {
    ((value * 1000.0).round() as i32).clamp(0, 1000) as u16
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        return format!("{}{}", sign, int_part);
    }
    let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
    while s.ends_with('0') {
        s.pop();
    }
    s
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn color_to_pdf_fill(color: Color) -> String {
    format!("{} {} {} rg\n", fmt(color.r), fmt(color.g), fmt(color.b))
}

fn color_to_pdf_stroke(color: Color) -> String {
    format!("{} {} {} RG\n", fmt(color.r), fmt(color.g), fmt(color.b))
}
