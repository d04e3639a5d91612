use crate::error::{FrameshotError, Result};
use crate::font_loader;
use crate::frame::Attributes;
use crate::options::FontPaths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use ttf_parser::GlyphId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontVariant {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontVariant {
    pub fn from_attributes(attributes: Attributes) -> Self {
        match (
            attributes.contains(Attributes::BOLD),
            attributes.contains(Attributes::ITALIC),
        ) {
            (true, true) => FontVariant::BoldItalic,
            (true, false) => FontVariant::Bold,
            (false, true) => FontVariant::Italic,
            (false, false) => FontVariant::Regular,
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(self, FontVariant::Bold | FontVariant::BoldItalic)
    }

    pub fn is_italic(self) -> bool {
        matches!(self, FontVariant::Italic | FontVariant::BoldItalic)
    }

    /// Built-in PDF base-14 face for this variant.
    pub(crate) fn courier_name(self) -> &'static str {
        match self {
            FontVariant::Regular => "Courier",
            FontVariant::Bold => "Courier-Bold",
            FontVariant::Italic => "Courier-Oblique",
            FontVariant::BoldItalic => "Courier-BoldOblique",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DecorationMetrics {
    pub(crate) position: i16,
    pub(crate) thickness: i16,
}

/// Face metrics scaled to a 1000-unit em.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FontMetrics {
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) stem_v: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) underline: DecorationMetrics,
    pub(crate) strikeout: DecorationMetrics,
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

impl FontMetrics {
    /// Courier AFM values shared by all four built-in variants.
    pub(crate) fn courier() -> Self {
        Self {
            ascent: 629,
            descent: -157,
            cap_height: 562,
            italic_angle: 0,
            stem_v: 51,
            bbox: (-23, -250, 715, 805),
            underline: DecorationMetrics {
                position: -100,
                thickness: 50,
            },
            strikeout: DecorationMetrics {
                position: 260,
                thickness: 50,
            },
            missing_width: 600,
            is_fixed_pitch: true,
        }
    }

    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let underline = face
            .underline_metrics()
            .map(|metrics| DecorationMetrics {
                position: scale_i16(metrics.position, scale),
                thickness: scale_i16(metrics.thickness, scale),
            })
            .unwrap_or(DecorationMetrics {
                position: -100,
                thickness: 50,
            });
        let strikeout = face
            .strikeout_metrics()
            .map(|metrics| DecorationMetrics {
                position: scale_i16(metrics.position, scale),
                thickness: scale_i16(metrics.thickness, scale),
            })
            .unwrap_or(DecorationMetrics {
                position: cap_height / 2,
                thickness: underline.thickness,
            });
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let missing_width = face
            .glyph_index(' ')
            .and_then(|gid| face.glyph_hor_advance(gid))
            .map(|adv| (adv as f32 * scale).round().clamp(0.0, u16::MAX as f32) as u16)
            .unwrap_or(600);

        Self {
            ascent,
            descent,
            cap_height,
            italic_angle,
            stem_v: 80,
            bbox,
            underline,
            strikeout,
            missing_width,
            is_fixed_pitch: face.is_monospaced(),
        }
    }

    /// Distance from the top of the glyph box to the baseline, as a share of the font size.
    pub(crate) fn baseline_ratio(&self) -> f32 {
        let height = self.ascent as i32 - self.descent as i32;
        if height <= 0 || self.ascent <= 0 {
            return 0.8;
        }
        self.ascent as f32 / height as f32
    }

    /// Offset below the baseline (positive is downward) and rule thickness.
    pub(crate) fn underline_rule(&self, font_size: f32) -> (f32, f32) {
        decoration_rule(self.underline, font_size)
    }

    pub(crate) fn strikeout_rule(&self, font_size: f32) -> (f32, f32) {
        decoration_rule(self.strikeout, font_size)
    }
}

fn decoration_rule(metrics: DecorationMetrics, font_size: f32) -> (f32, f32) {
    let offset = -(metrics.position as f32) * font_size / 1000.0;
    let thickness = (metrics.thickness as f32 * font_size / 1000.0).max(0.5);
    (offset, thickness)
}

/// A parsed font program ready for embedding or rasterizing.
#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Arc<Vec<u8>>,
    pub(crate) metrics: FontMetrics,
    pub(crate) program_kind: FontProgramKind,
}

impl RegisteredFont {
    pub(crate) fn from_path(path: &Path) -> Result<Self> {
        let data = font_loader::load_font_bytes(path)?;
        Self::from_bytes(data, path)
    }

    pub(crate) fn from_bytes(data: Arc<Vec<u8>>, source: &Path) -> Result<Self> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| FrameshotError::font_load(source, format!("invalid font data: {err}")))?;
        let name = font_name(&face, source);
        let metrics = FontMetrics::from_face(&face);
        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };
        Ok(Self {
            name,
            data,
            metrics,
            program_kind,
        })
    }

    pub(crate) fn face(&self) -> Option<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.data, 0).ok()
    }
}

/// Glyph id for `ch`, or `.notdef`.
pub(crate) fn glyph_id(face: &ttf_parser::Face<'_>, ch: char) -> u16 {
    face.glyph_index(ch).map(|gid| gid.0).unwrap_or(0)
}

/// Horizontal advance of `gid` in 1000-unit em space.
pub(crate) fn glyph_advance(face: &ttf_parser::Face<'_>, gid: u16) -> u16 {
    let advance = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0);
    let units = face.units_per_em().max(1) as i64;
    let scaled = ((advance as i64) * 1000 + (units / 2)) / units;
    scaled.clamp(0, u16::MAX as i64) as u16
}

/// Regular face plus whichever styled faces were supplied.
#[derive(Debug)]
pub(crate) struct FontFamily {
    regular: RegisteredFont,
    bold: Option<RegisteredFont>,
    italic: Option<RegisteredFont>,
    bold_italic: Option<RegisteredFont>,
}

impl FontFamily {
    /// `Ok(None)` when no font paths were requested at all.
    pub(crate) fn load(paths: &FontPaths) -> Result<Option<Self>> {
        paths.validate()?;
        let Some(regular) = paths.regular.as_deref() else {
            return Ok(None);
        };
        let load = |path: Option<&Path>| -> Result<Option<RegisteredFont>> {
            path.map(RegisteredFont::from_path).transpose()
        };
        Ok(Some(Self {
            regular: RegisteredFont::from_path(regular)?,
            bold: load(paths.bold.as_deref())?,
            italic: load(paths.italic.as_deref())?,
            bold_italic: load(paths.bold_italic.as_deref())?,
        }))
    }

    pub(crate) fn exact(&self, variant: FontVariant) -> Option<&RegisteredFont> {
        match variant {
            FontVariant::Regular => Some(&self.regular),
            FontVariant::Bold => self.bold.as_ref(),
            FontVariant::Italic => self.italic.as_ref(),
            FontVariant::BoldItalic => self.bold_italic.as_ref(),
        }
    }

    /// Closest registered face for `variant` and the variant it actually is.
    pub(crate) fn select(&self, variant: FontVariant) -> (&RegisteredFont, FontVariant) {
        let order: &[FontVariant] = match variant {
            FontVariant::Regular => &[FontVariant::Regular],
            FontVariant::Bold => &[FontVariant::Bold, FontVariant::Regular],
            FontVariant::Italic => &[FontVariant::Italic, FontVariant::Regular],
            FontVariant::BoldItalic => &[
                FontVariant::BoldItalic,
                FontVariant::Bold,
                FontVariant::Italic,
                FontVariant::Regular,
            ],
        };
        for candidate in order {
            if let Some(font) = self.exact(*candidate) {
                return (font, *candidate);
            }
        }
        (&self.regular, FontVariant::Regular)
    }
}

// DejaVu Sans Mono, Bitstream Vera license (assets/fonts/DejaVuSansMono-LICENSE.txt).
pub(crate) static BUNDLED_MONOSPACE: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono.ttf");

static BUNDLED_FAMILY_BYTES: OnceLock<Arc<Vec<u8>>> = OnceLock::new();

impl FontFamily {
    /// The monospace face compiled into the crate. Styled variants are absent.
    pub(crate) fn bundled() -> Result<Self> {
        let data = BUNDLED_FAMILY_BYTES
            .get_or_init(|| Arc::new(BUNDLED_MONOSPACE.to_vec()))
            .clone();
        Ok(Self {
            regular: RegisteredFont::from_bytes(data, Path::new("DejaVuSansMono.ttf"))?,
            bold: None,
            italic: None,
            bold_italic: None,
        })
    }
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_name(face: &ttf_parser::Face<'_>, path: &Path) -> String {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME if post.is_none() => post = Some(name),
            name_id::FAMILY if family.is_none() => family = Some(name),
            _ => {}
        }
    }
    post.or(family)
        .or_else(|| {
            path.file_stem()
                .and_then(|v| v.to_str())
                .map(|v| v.to_string())
        })
        .unwrap_or_else(|| "EmbeddedFont".to_string())
}
