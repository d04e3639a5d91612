use crate::error::{FrameshotError, Result};
use crate::types::Theme;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    // Always encoded lossless.
    Webp,
}

/// Caller-supplied font files. Styled faces are optional but require `regular`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontPaths {
    pub regular: Option<PathBuf>,
    pub bold: Option<PathBuf>,
    pub italic: Option<PathBuf>,
    pub bold_italic: Option<PathBuf>,
}

impl FontPaths {
    pub fn regular(path: impl Into<PathBuf>) -> Self {
        Self {
            regular: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regular.is_none()
            && self.bold.is_none()
            && self.italic.is_none()
            && self.bold_italic.is_none()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.regular.is_none() && !self.is_empty() {
            return Err(FrameshotError::InvalidConfiguration(
                "styled font faces require a regular face".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    /// Output width in pixels.
    pub width: u32,
    /// Fixed height in pixels. Content past it is clipped; `None` grows to fit.
    pub height: Option<u32>,
    /// Pixel font size. `None` fits the frame's columns into the content width.
    pub font_size: Option<f32>,
    pub line_height_multiplier: f32,
    pub padding_x: u32,
    pub padding_y: u32,
    pub theme: Theme,
    pub format: ImageFormat,
    /// JPEG quality, 1..=100.
    pub quality: u8,
    pub fonts: FontPaths,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            width: 1200,
            height: None,
            font_size: None,
            line_height_multiplier: 1.4,
            padding_x: 24,
            padding_y: 24,
            theme: Theme::default(),
            format: ImageFormat::Png,
            quality: 90,
            fonts: FontPaths::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginatedImageOptions {
    #[serde(flatten)]
    pub image: ImageOptions,
    pub max_lines_per_page: usize,
}

impl Default for PaginatedImageOptions {
    fn default() -> Self {
        Self {
            image: ImageOptions::default(),
            max_lines_per_page: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfExportOptions {
    /// Page size in points. Defaults to A4 landscape.
    pub page_width: f32,
    pub page_height: f32,
    pub font_size: Option<f32>,
    pub line_height_multiplier: f32,
    pub padding_x: f32,
    pub padding_y: f32,
    pub theme: Theme,
    pub fonts: FontPaths,
    pub title: Option<String>,
    pub compress: bool,
}

impl Default for PdfExportOptions {
    fn default() -> Self {
        Self {
            page_width: 841.89,
            page_height: 595.28,
            font_size: None,
            line_height_multiplier: 1.4,
            padding_x: 28.0,
            padding_y: 28.0,
            theme: Theme::default(),
            fonts: FontPaths::default(),
            title: None,
            compress: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgba;

    #[test]
    fn styled_face_without_regular_is_rejected() {
        let paths = FontPaths {
            bold: Some(PathBuf::from("bold.ttf")),
            ..FontPaths::default()
        };
        assert!(matches!(
            paths.validate(),
            Err(FrameshotError::InvalidConfiguration(_))
        ));
        assert!(FontPaths::default().validate().is_ok());
        assert!(FontPaths::regular("mono.ttf").validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let options: ImageOptions =
            serde_json::from_str(r#"{"width": 800, "format": "webp"}"#).expect("parse");
        assert_eq!(options.width, 800);
        assert_eq!(options.format, ImageFormat::Webp);
        assert_eq!(options.padding_x, 24);
        assert_eq!(options.quality, 90);
        assert!(options.height.is_none());
    }

    #[test]
    fn paginated_options_flatten_image_fields() {
        let options: PaginatedImageOptions =
            serde_json::from_str(r#"{"width": 640, "max_lines_per_page": 25}"#).expect("parse");
        assert_eq!(options.image.width, 640);
        assert_eq!(options.max_lines_per_page, 25);
        assert_eq!(options.image.line_height_multiplier, 1.4);
    }

    #[test]
    fn pdf_options_parse_theme_and_title() {
        let options: PdfExportOptions = serde_json::from_str(
            r#"{"title": "diff", "compress": false, "theme": {"background": {"r": 255, "g": 255, "b": 255}}}"#,
        )
        .expect("parse");
        assert_eq!(options.title.as_deref(), Some("diff"));
        assert!(!options.compress);
        assert_eq!(options.theme.background, Rgba::rgb(255, 255, 255));
        assert_eq!(options.theme.foreground, Theme::default().foreground);
        assert_eq!(options.page_width, 841.89);
    }
}
