//! Color boundaries and rendering options for AQI rasters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StyleError {
    #[error("Color boundaries are empty")]
    Empty,

    #[error("Boundary {index} value {value} is not finite")]
    NonFinite { index: usize, value: f64 },

    #[error("Boundary {index} value {value} does not exceed the previous boundary")]
    NotIncreasing { index: usize, value: f64 },

    #[error("Invalid color '{0}', expected #RRGGBB or #RRGGBBAA")]
    InvalidColor(String),

    #[error("Opacity must be within [0, 1], got {0}")]
    InvalidOpacity(f64),
}

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn transparent() -> Self {
        Self { r: 0, g: 0, b: 0, a: 0 }
    }

    /// Parse `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim_start_matches('#');
        if !digits.is_ascii() {
            return None;
        }
        match digits.len() {
            6 => hex_to_rgb(digits).map(|(r, g, b)| Color::opaque(r, g, b)),
            8 => {
                let (r, g, b) = hex_to_rgb(&digits[0..6])?;
                let a = u8::from_str_radix(digits.get(6..8)?, 16).ok()?;
                Some(Color::new(r, g, b, a))
            }
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// The same color with alpha multiplied by `opacity`.
    pub fn scale_alpha(self, opacity: f64) -> Self {
        let a = (f64::from(self.a) * opacity.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }
}

/// Parse hex color string to RGB
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some((r, g, b))
}

/// Linear color interpolation, `t` clamped to `[0, 1]`.
pub fn interpolate_color(color1: Color, color2: Color, t: f64) -> Color {
    let t = t.clamp(0.0, 1.0);
    let t_inv = 1.0 - t;
    let mix = |a: u8, b: u8| (f64::from(a) * t_inv + f64::from(b) * t).round() as u8;

    Color::new(
        mix(color1.r, color2.r),
        mix(color1.g, color2.g),
        mix(color1.b, color2.b),
        mix(color1.a, color2.a),
    )
}

/// Color stop as written in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ColorStop {
    pub value: f64,
    pub color: String,
}

/// A threshold and the color used from it upwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBoundary {
    pub value: f64,
    pub color: Color,
}

/// Thresholds with colors, strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorBoundaries {
    boundaries: Vec<ColorBoundary>,
}

/// How values between boundaries are colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Flat color of the interval containing the value.
    #[default]
    Discrete,
    /// Linear blend between the colors of the bracketing boundaries.
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RenderOptions {
    #[serde(default)]
    pub mode: RenderMode,
    /// Multiplier applied to every pixel's alpha.
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

fn default_opacity() -> f64 {
    1.0
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            mode: RenderMode::Discrete,
            opacity: default_opacity(),
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> Result<(), StyleError> {
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(StyleError::InvalidOpacity(self.opacity));
        }
        Ok(())
    }
}

impl ColorBoundaries {
    /// Validate and wrap boundaries.
    pub fn new(boundaries: Vec<ColorBoundary>) -> Result<Self, StyleError> {
        if boundaries.is_empty() {
            return Err(StyleError::Empty);
        }
        for (index, b) in boundaries.iter().enumerate() {
            if !b.value.is_finite() {
                return Err(StyleError::NonFinite {
                    index,
                    value: b.value,
                });
            }
            if index > 0 && b.value <= boundaries[index - 1].value {
                return Err(StyleError::NotIncreasing {
                    index,
                    value: b.value,
                });
            }
        }
        Ok(Self { boundaries })
    }

    /// Build from configuration stops with hex colors.
    pub fn from_stops(stops: &[ColorStop]) -> Result<Self, StyleError> {
        let boundaries = stops
            .iter()
            .map(|stop| {
                Color::from_hex(&stop.color)
                    .map(|color| ColorBoundary {
                        value: stop.value,
                        color,
                    })
                    .ok_or_else(|| StyleError::InvalidColor(stop.color.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(boundaries)
    }

    /// The US EPA AQI category colors, topped by a band for values at or
    /// above 500.
    pub fn aqi_default() -> Self {
        Self {
            boundaries: vec![
                ColorBoundary { value: 0.0, color: Color::opaque(0x00, 0xE4, 0x00) },
                ColorBoundary { value: 50.0, color: Color::opaque(0xFF, 0xFF, 0x00) },
                ColorBoundary { value: 100.0, color: Color::opaque(0xFF, 0x7E, 0x00) },
                ColorBoundary { value: 150.0, color: Color::opaque(0xFF, 0x00, 0x00) },
                ColorBoundary { value: 200.0, color: Color::opaque(0x8F, 0x3F, 0x97) },
                ColorBoundary { value: 300.0, color: Color::opaque(0x7E, 0x00, 0x23) },
                ColorBoundary { value: 500.0, color: Color::opaque(0x4C, 0x00, 0x15) },
            ],
        }
    }

    pub fn boundaries(&self) -> &[ColorBoundary] {
        &self.boundaries
    }

    /// Boundaries as configuration stops.
    pub fn to_stops(&self) -> Vec<ColorStop> {
        self.boundaries
            .iter()
            .map(|b| ColorStop {
                value: b.value,
                color: b.color.to_hex(),
            })
            .collect()
    }

    /// Color for `value`. Values below the first boundary take the first
    /// color, values at or above the last take the last color. NaN is
    /// transparent.
    pub fn color_for(&self, value: f64, mode: RenderMode) -> Color {
        if value.is_nan() {
            return Color::transparent();
        }

        let k = self.boundaries.partition_point(|b| b.value <= value);
        let Some(lower) = k.checked_sub(1).map(|i| &self.boundaries[i]) else {
            return self.boundaries[0].color;
        };

        match (mode, self.boundaries.get(k)) {
            (RenderMode::Smooth, Some(upper)) => {
                let t = (value - lower.value) / (upper.value - lower.value);
                interpolate_color(lower.color, upper.color, t)
            }
            _ => lower.color,
        }
    }
}
