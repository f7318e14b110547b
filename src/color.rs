//! Color values with perceptual blending

use std::{fmt, str::FromStr};

use palette::{rgb::FromHexError, FromColor, Lch, Srgb};
use thiserror::Error;

/// 8-bit RGB value, as written to the hardware
pub type Rgb8 = Srgb<u8>;

/// Below this chroma (in L*a*b* units), a color is considered achromatic and its hue is
/// meaningless
const ACHROMATIC_CHROMA: f32 = 0.015;

#[derive(Debug, Error)]
pub enum ColorError {
    #[error("invalid hex color '{input}': {source}")]
    Hex {
        input: String,
        #[source]
        source: FromHexError,
    },
    #[error("color {0} is outside the displayable range")]
    OutOfRange(Color),
}

/// A color value in non-linear sRGB space, with floating-point components
///
/// Components may leave the `[0, 1]` range after arithmetic; [Color::clamped] brings them
/// back before anything is sent to the hardware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color(Srgb<f32>);

impl Color {
    pub fn new(red: f32, green: f32, blue: f32) -> Self {
        Self(Srgb::new(red, green, blue))
    }

    pub fn black() -> Self {
        Self::new(0., 0., 0.)
    }

    pub fn from_rgb8(rgb: Rgb8) -> Self {
        Self(rgb.into_format())
    }

    /// Parse a `#rrggbb` (or `#rgb`) hex color, rejecting colors that cannot be displayed
    pub fn from_hex(input: &str) -> Result<Self, ColorError> {
        let rgb = Rgb8::from_str(input.trim()).map_err(|source| ColorError::Hex {
            input: input.to_owned(),
            source,
        })?;

        Self::from_rgb8(rgb).validated()
    }

    pub fn components(&self) -> (f32, f32, f32) {
        (self.0.red, self.0.green, self.0.blue)
    }

    /// Returns true if every component lies within the displayable range
    pub fn is_valid(&self) -> bool {
        let (r, g, b) = self.components();
        [r, g, b].iter().all(|c| (0.0..=1.0).contains(c))
    }

    pub fn validated(self) -> Result<Self, ColorError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(ColorError::OutOfRange(self))
        }
    }

    pub fn clamped(self) -> Self {
        let (r, g, b) = self.components();
        let clamp = |c: f32| if c.is_nan() { 0. } else { c.max(0.).min(1.) };
        Self::new(clamp(r), clamp(g), clamp(b))
    }

    /// Convert to 8-bit RGB, clamping first
    pub fn to_rgb8(self) -> Rgb8 {
        let (r, g, b) = self.clamped().components();
        let quantize = |c: f32| (c * 255. + 0.5) as u8;
        Rgb8::new(quantize(r), quantize(g), quantize(b))
    }

    /// Blend towards `other` in the HCL (cylindrical CIE L*a*b*) space
    ///
    /// The hue follows the shortest arc between both colors. When one side is achromatic
    /// its hue is taken from the other side, so blending from grey does not sweep through
    /// unrelated hues. The result is clamped.
    pub fn blend_hcl(self, other: Self, t: f32) -> Self {
        if t <= 0. || self == other {
            return self.clamped();
        } else if t >= 1. {
            return other.clamped();
        }

        let from: Lch = Lch::from_color(self.0);
        let to: Lch = Lch::from_color(other.0);

        let mut h1 = from.hue.into_positive_degrees();
        let mut h2 = to.hue.into_positive_degrees();
        if from.chroma <= ACHROMATIC_CHROMA && to.chroma >= ACHROMATIC_CHROMA {
            h1 = h2;
        } else if to.chroma <= ACHROMATIC_CHROMA && from.chroma >= ACHROMATIC_CHROMA {
            h2 = h1;
        }

        let mixed = Lch::new(
            from.l + t * (to.l - from.l),
            from.chroma + t * (to.chroma - from.chroma),
            interpolate_angle(h1, h2, t),
        );

        Self(Srgb::from_color(mixed)).clamped()
    }
}

/// Interpolate between two angles in degrees along the shortest arc
fn interpolate_angle(a0: f32, a1: f32, t: f32) -> f32 {
    let delta = ((a1 - a0) % 360. + 540.) % 360. - 180.;
    (a0 + t * delta + 360.) % 360.
}

impl Default for Color {
    fn default() -> Self {
        Self::black()
    }
}

impl From<Rgb8> for Color {
    fn from(rgb: Rgb8) -> Self {
        Self::from_rgb8(rgb)
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            let rgb = self.to_rgb8();
            write!(f, "#{:02x}{:02x}{:02x}", rgb.red, rgb.green, rgb.blue)
        } else {
            let (r, g, b) = self.components();
            write!(f, "rgb({:.3}, {:.3}, {:.3})", r, g, b)
        }
    }
}
