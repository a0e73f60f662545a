//! Geographic bounding box of the published region.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An axis-aligned geographic bounding box in degrees (EPSG:4326).
///
/// Longitudes run west to east, latitudes south to north. A box whose
/// east edge equals its west edge (or north equals south) is degenerate:
/// it is a valid value but covers no grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Create a new bounding box from its four edges.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Parse a `"west,south,east,north"` string, the order used on the command line.
    pub fn parse(s: &str) -> Result<Self, BboxError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxError::InvalidFormat(s.to_string()));
        }

        let number = |part: &str| -> Result<f64, BboxError> {
            part.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| BboxError::InvalidNumber(part.to_string()))
        };

        Ok(Self {
            west: number(parts[0])?,
            south: number(parts[1])?,
            east: number(parts[2])?,
            north: number(parts[3])?,
        })
    }

    /// Check the edges lie on the globe and are not inverted.
    pub fn validate(&self) -> Result<(), BboxError> {
        let edges = [self.west, self.south, self.east, self.north];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(BboxError::OutOfRange(self.to_string()));
        }
        if !(-180.0..=180.0).contains(&self.west) || !(-180.0..=180.0).contains(&self.east) {
            return Err(BboxError::OutOfRange(self.to_string()));
        }
        if !(-90.0..=90.0).contains(&self.south) || !(-90.0..=90.0).contains(&self.north) {
            return Err(BboxError::OutOfRange(self.to_string()));
        }
        if self.east < self.west || self.north < self.south {
            return Err(BboxError::Inverted(self.to_string()));
        }
        Ok(())
    }

    /// Longitude extent in degrees.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Latitude extent in degrees.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// True when the box encloses no area.
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Center as `(latitude, longitude)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Check if a point is contained within this bbox (edges inclusive).
    pub fn contains_point(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.south
            && latitude <= self.north
            && longitude >= self.west
            && longitude <= self.east
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.west < other.east
            && self.east > other.west
            && self.south < other.north
            && self.north > other.south
    }

    /// Grow the box by the given margins on every side.
    pub fn expand(&self, lat_margin: f64, lon_margin: f64) -> BoundingBox {
        BoundingBox {
            west: self.west - lon_margin,
            south: self.south - lat_margin,
            east: self.east + lon_margin,
            north: self.north + lat_margin,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6},{:.6},{:.6},{:.6}",
            self.west, self.south, self.east, self.north
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxError {
    #[error("Invalid bounding box format: {0}. Expected 'west,south,east,north'")]
    InvalidFormat(String),

    #[error("Invalid number in bounding box: {0}")]
    InvalidNumber(String),

    #[error("Bounding box outside geographic range: {0}")]
    OutOfRange(String),

    #[error("Bounding box edges are inverted: {0}")]
    Inverted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = BoundingBox::parse("23.70,37.80,23.80,37.90").unwrap();
        assert_eq!(bbox.west, 23.70);
        assert_eq!(bbox.south, 37.80);
        assert_eq!(bbox.east, 23.80);
        assert_eq!(bbox.north, 37.90);
    }

    #[test]
    fn test_degenerate() {
        assert!(BoundingBox::new(10.0, 5.0, 10.0, 6.0).is_degenerate());
        assert!(BoundingBox::new(10.0, 5.0, 11.0, 5.0).is_degenerate());
        assert!(!BoundingBox::new(10.0, 5.0, 11.0, 6.0).is_degenerate());
    }

    #[test]
    fn test_validate_rejects_inverted() {
        let bbox = BoundingBox::new(20.0, 40.0, 19.0, 41.0);
        assert!(matches!(bbox.validate(), Err(BboxError::Inverted(_))));
    }
}
