use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point length used for every coordinate that reaches a drawing command.
/// Values are quantized to thousandths so both backends see identical geometry.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value as f64 * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn max(self, other: Pt) -> Pt {
        if self >= other { self } else { other }
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        Pt::from_milli_i128(milli as i128)
    }

    fn from_milli_i128(milli: i128) -> Pt {
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_i128(self.to_milli_i64() as i128 - rhs.to_milli_i64() as i128)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: Pt::from_f32(width),
            height: Pt::from_f32(height),
        }
    }
}

/// Device color handed to the drawing backends (components in 0..=1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

impl From<Rgba> for Color {
    fn from(value: Rgba) -> Self {
        Color::rgb(
            value.r as f32 / 255.0,
            value.g as f32 / 255.0,
            value.b as f32 / 255.0,
        )
    }
}

/// Cell color as captured from the terminal. `a == 0` means "inherit".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque_alpha")]
    pub a: u8,
}

fn opaque_alpha() -> u8 {
    255
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// `0xRRGGBB`.
    pub const fn hex(value: u32) -> Self {
        Self::rgb(
            ((value >> 16) & 0xff) as u8,
            ((value >> 8) & 0xff) as u8,
            (value & 0xff) as u8,
        )
    }

    /// Resolves this color against the document color it would otherwise inherit.
    /// Partially transparent colors are composited over `base`; the result is opaque.
    pub fn resolve(self, base: Rgba) -> Rgba {
        match self.a {
            0 => base,
            255 => self,
            alpha => {
                let blend = |top: u8, bottom: u8| -> u8 {
                    let top = top as u32 * alpha as u32;
                    let bottom = bottom as u32 * (255 - alpha as u32);
                    ((top + bottom + 127) / 255) as u8
                };
                Rgba::rgb(
                    blend(self.r, base.r),
                    blend(self.g, base.g),
                    blend(self.b, base.b),
                )
            }
        }
    }
}

/// Document colors supplied by the theme resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub background: Rgba,
    pub foreground: Rgba,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Rgba::hex(0x0d1117),
            foreground: Rgba::hex(0xc9d1d9),
        }
    }
}

impl Theme {
    /// Theme colors are always treated as opaque.
    pub(crate) fn normalized(self) -> Theme {
        Theme {
            background: Rgba {
                a: 255,
                ..self.background
            },
            foreground: self.foreground.resolve(Rgba {
                a: 255,
                ..self.background
            }),
        }
    }
}
