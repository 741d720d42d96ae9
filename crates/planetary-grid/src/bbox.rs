//! Geographic bounding boxes.

use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};

/// Geographic bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum longitude (west edge).
    pub min_lon: f64,
    /// Minimum latitude (south edge).
    pub min_lat: f64,
    /// Maximum longitude (east edge).
    pub max_lon: f64,
    /// Maximum latitude (north edge).
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// The whole globe.
    pub fn global() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Parse a "min_lon,min_lat,max_lon,max_lat" string.
    pub fn from_csv(s: &str) -> GridResult<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(GridError::invalid_region(format!(
                "bbox '{}' must have 4 comma-separated values",
                s
            )));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| GridError::invalid_region(format!("invalid number in bbox: {}", part)))?;
        }

        let bbox = Self::new(values[0], values[1], values[2], values[3]);
        if !bbox.is_valid() {
            return Err(GridError::invalid_region(format!("degenerate bbox: {}", s)));
        }
        Ok(bbox)
    }

    /// True when all edges are finite and min < max on both axes.
    pub fn is_valid(&self) -> bool {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lon < self.max_lon
            && self.min_lat < self.max_lat
    }

    /// Width in degrees.
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height in degrees.
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Center point (lon, lat).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// Check whether two boxes overlap. Touching edges count as overlap.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// Overlapping part of two boxes, if any.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BoundingBox::new(
            self.min_lon.max(other.min_lon),
            self.min_lat.max(other.min_lat),
            self.max_lon.min(other.max_lon),
            self.max_lat.min(other.max_lat),
        ))
    }

    /// Check whether a point lies inside the box (edges inclusive).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Clamp to the valid geographic range.
    pub fn clamp_to_globe(&self) -> Self {
        Self::new(
            self.min_lon.max(-180.0),
            self.min_lat.max(-90.0),
            self.max_lon.min(180.0),
            self.max_lat.min(90.0),
        )
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::global()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_csv() {
        let bbox = BoundingBox::from_csv("-10.5, 20, 30, 40.25").unwrap();
        assert_eq!(bbox.min_lon, -10.5);
        assert_eq!(bbox.min_lat, 20.0);
        assert_eq!(bbox.max_lon, 30.0);
        assert_eq!(bbox.max_lat, 40.25);
    }

    #[test]
    fn test_from_csv_rejects_bad_input() {
        assert!(BoundingBox::from_csv("1,2,3").is_err());
        assert!(BoundingBox::from_csv("a,2,3,4").is_err());
        assert!(BoundingBox::from_csv("10,0,5,1").is_err());
    }

    #[test]
    fn test_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);

        assert_eq!(
            a.intersection(&b),
            Some(BoundingBox::new(5.0, 5.0, 10.0, 10.0))
        );
        assert!(a.intersection(&c).is_none());
    }

    #[test]
    fn test_touching_edges_intersect() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        assert!(a.intersects(&b));
    }

    #[test]
    fn test_clamp_to_globe() {
        let bbox = BoundingBox::new(-200.0, -95.0, 190.0, 91.0).clamp_to_globe();
        assert_eq!(bbox, BoundingBox::global());
    }
}
