//! Region-of-interest geometry.
//!
//! A [`Region`] is a polygon in lon/lat degrees used to limit which
//! observations are binned and which cells are rendered. Regions are
//! written and read as WKT `POLYGON` text so they can live in YAML
//! configuration files.

use std::fmt;

use geo::{BoundingRect, Coord, Intersects, LineString, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{GridError, GridResult};

/// A polygonal region of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region {
    polygon: Polygon<f64>,
    bbox: BoundingBox,
}

impl Region {
    /// Build a region from a closed or open exterior ring of (lon, lat) pairs.
    pub fn from_ring(ring: Vec<(f64, f64)>) -> GridResult<Self> {
        Self::from_polygon(Polygon::new(LineString::from(ring), vec![]))
    }

    /// Build a rectangular region.
    pub fn from_bbox(bbox: &BoundingBox) -> GridResult<Self> {
        if !bbox.is_valid() {
            return Err(GridError::invalid_region(format!(
                "degenerate bounding box {:?}",
                bbox
            )));
        }
        Self::from_ring(vec![
            (bbox.min_lon, bbox.min_lat),
            (bbox.max_lon, bbox.min_lat),
            (bbox.max_lon, bbox.max_lat),
            (bbox.min_lon, bbox.max_lat),
            (bbox.min_lon, bbox.min_lat),
        ])
    }

    /// Wrap an existing polygon.
    pub fn from_polygon(polygon: Polygon<f64>) -> GridResult<Self> {
        if polygon.exterior().0.len() < 4 {
            return Err(GridError::invalid_region(
                "polygon needs at least three distinct vertices",
            ));
        }
        if polygon
            .exterior()
            .coords()
            .any(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(GridError::invalid_region("polygon has non-finite vertices"));
        }

        let rect = polygon
            .bounding_rect()
            .ok_or_else(|| GridError::invalid_region("polygon has no extent"))?;
        let bbox = BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y);
        if !bbox.is_valid() {
            return Err(GridError::invalid_region("polygon has zero area extent"));
        }

        Ok(Self { polygon, bbox })
    }

    /// Parse WKT `POLYGON((lon lat, lon lat, ...), (hole...))`.
    pub fn from_wkt(wkt: &str) -> GridResult<Self> {
        let trimmed = wkt.trim();
        let upper = trimmed.to_ascii_uppercase();
        let body = upper
            .strip_prefix("POLYGON")
            .map(str::trim)
            .ok_or_else(|| GridError::invalid_region(format!("expected WKT POLYGON, got '{}'", wkt)))?;

        if body.matches('(').count() != body.matches(')').count() {
            return Err(GridError::invalid_region(format!(
                "unbalanced parentheses in '{}'",
                wkt
            )));
        }

        let inner = body
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| GridError::invalid_region(format!("unbalanced parentheses in '{}'", wkt)))?;

        let mut rings = Vec::new();
        for ring_text in inner.split(')') {
            let ring_text = ring_text.trim().trim_start_matches(',').trim();
            if ring_text.is_empty() {
                continue;
            }
            let ring_text = ring_text
                .strip_prefix('(')
                .ok_or_else(|| GridError::invalid_region(format!("malformed ring in '{}'", wkt)))?;
            rings.push(parse_ring(ring_text)?);
        }

        let mut rings = rings.into_iter();
        let exterior = rings
            .next()
            .ok_or_else(|| GridError::invalid_region("polygon has no rings"))?;
        Self::from_polygon(Polygon::new(exterior, rings.collect()))
    }

    /// Bounding box of the polygon.
    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// Underlying polygon.
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Point-in-polygon test, boundary inclusive.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.bbox.contains(lon, lat) && self.polygon.intersects(&Point::new(lon, lat))
    }

    /// Check whether the polygon overlaps a box, edges inclusive.
    pub fn intersects_box(&self, bbox: &BoundingBox) -> bool {
        if !self.bbox.intersects(bbox) {
            return false;
        }
        let rect = Rect::new(
            Coord {
                x: bbox.min_lon,
                y: bbox.min_lat,
            },
            Coord {
                x: bbox.max_lon,
                y: bbox.max_lat,
            },
        );
        self.polygon.intersects(&rect)
    }

    /// Render as WKT.
    pub fn to_wkt(&self) -> String {
        let mut out = String::from("POLYGON(");
        let rings = std::iter::once(self.polygon.exterior()).chain(self.polygon.interiors());
        for (i, ring) in rings.enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push('(');
            let coords: Vec<String> = ring.coords().map(|c| format!("{} {}", c.x, c.y)).collect();
            out.push_str(&coords.join(","));
            out.push(')');
        }
        out.push(')');
        out
    }
}

fn parse_ring(text: &str) -> GridResult<LineString<f64>> {
    let mut coords = Vec::new();
    for pair in text.split(',') {
        let mut parts = pair.split_whitespace();
        let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(GridError::invalid_region(format!(
                "expected 'lon lat' pair, got '{}'",
                pair.trim()
            )));
        };
        let x: f64 = x
            .parse()
            .map_err(|_| GridError::invalid_region(format!("invalid longitude '{}'", x)))?;
        let y: f64 = y
            .parse()
            .map_err(|_| GridError::invalid_region(format!("invalid latitude '{}'", y)))?;
        coords.push((x, y));
    }
    Ok(LineString::from(coords))
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wkt())
    }
}

impl TryFrom<String> for Region {
    type Error = GridError;

    fn try_from(value: String) -> GridResult<Self> {
        Self::from_wkt(&value)
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.to_wkt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wkt() {
        let region = Region::from_wkt("POLYGON((0 0, 10 0, 10 5, 0 5, 0 0))").unwrap();
        let bbox = region.bounding_box();
        assert_eq!(bbox, BoundingBox::new(0.0, 0.0, 10.0, 5.0));
    }

    #[test]
    fn test_parse_wkt_lowercase_with_spaces() {
        let region = Region::from_wkt("  polygon ( (0 0, 4 0, 4 4, 0 0) ) ").unwrap();
        assert!(region.contains(1.0, 3.0));
    }

    #[test]
    fn test_parse_wkt_with_hole() {
        let region = Region::from_wkt(
            "POLYGON((0 0, 10 0, 10 10, 0 10, 0 0),(4 4, 6 4, 6 6, 4 6, 4 4))",
        )
        .unwrap();
        assert!(region.contains(1.0, 1.0));
        assert!(!region.contains(5.0, 5.0));
    }

    #[test]
    fn test_parse_wkt_errors() {
        assert!(Region::from_wkt("POINT(1 2)").is_err());
        assert!(Region::from_wkt("POLYGON((0 0, 1 1))").is_err());
        assert!(Region::from_wkt("POLYGON((0 0, x 1, 1 1, 0 0))").is_err());
        assert!(Region::from_wkt("POLYGON((0 0, 1 0, 1 1, 0 0)").is_err());
    }

    #[test]
    fn test_contains_boundary_inclusive() {
        let region = Region::from_bbox(&BoundingBox::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        assert!(region.contains(0.0, 5.0));
        assert!(region.contains(10.0, 10.0));
        assert!(!region.contains(10.5, 5.0));
    }

    #[test]
    fn test_intersects_box() {
        // Triangle occupying the lower-left half of a 10x10 square.
        let region = Region::from_ring(vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (0.0, 0.0)]).unwrap();
        assert!(region.intersects_box(&BoundingBox::new(1.0, 1.0, 2.0, 2.0)));
        // Upper-right corner is inside the bbox but outside the triangle.
        assert!(!region.intersects_box(&BoundingBox::new(8.0, 8.0, 9.0, 9.0)));
    }

    #[test]
    fn test_wkt_serde_roundtrip() {
        let region = Region::from_bbox(&BoundingBox::new(-5.0, 40.0, 5.0, 50.0)).unwrap();
        let json = serde_json::to_string(&region).unwrap();
        let back: Region = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bounding_box(), region.bounding_box());
    }
}
