mod render;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use render::{RenderError, render_png};

/// Widest and tallest area a region read may cover.
pub const MAX_REGION: u32 = 128;

/// Color of every pixel nobody has painted.
pub const BLANK: Color = Color {
    r: 0xFF,
    g: 0xFF,
    b: 0xFF,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanvasError {
    #[error("invalid color `{0}`, use #RRGGBB")]
    InvalidColor(String),

    #[error("{axis}: coordinate must be between 0 and {max}")]
    OutOfBounds { axis: char, max: u32 },

    #[error("width and height must be between 1 and {max}")]
    RegionSize { max: u32 },

    #[error("region extends past the {size}x{size} canvas")]
    RegionOutOfBounds { size: u32 },
}

/// A validated rectangle that lies entirely on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FromStr for Color {
    type Err = CanvasError;

    /// Accepts `#RRGGBB` or `RRGGBB`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CanvasError::InvalidColor(s.to_string());
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Color {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

impl TryFrom<String> for Color {
    type Error = CanvasError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Checks `(x, y)` against a `size` x `size` canvas.
pub fn validate_point(x: i64, y: i64, size: u32) -> Result<(u32, u32), CanvasError> {
    let axis = |axis: char, v: i64| {
        u32::try_from(v)
            .ok()
            .filter(|v| *v < size)
            .ok_or(CanvasError::OutOfBounds {
                axis,
                max: size.saturating_sub(1),
            })
    };
    Ok((axis('x', x)?, axis('y', y)?))
}

/// Checks a `width` x `height` area at `(x, y)` against a `size` x `size`
/// canvas.
pub fn validate_region(
    x: i64,
    y: i64,
    width: i64,
    height: i64,
    size: u32,
) -> Result<Rect, CanvasError> {
    let (x, y) = validate_point(x, y, size)?;
    let span = |v: i64| {
        u32::try_from(v)
            .ok()
            .filter(|v| (1..=MAX_REGION).contains(v))
            .ok_or(CanvasError::RegionSize { max: MAX_REGION })
    };
    let (width, height) = (span(width)?, span(height)?);
    if x.saturating_add(width) > size || y.saturating_add(height) > size {
        return Err(CanvasError::RegionOutOfBounds { size });
    }
    Ok(Rect {
        x,
        y,
        width,
        height,
    })
}
