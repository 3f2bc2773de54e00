use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::core::constants::TILE_SIZE;

const MAX_LATITUDE: f64 = 85.0511287798;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Creates a coordinate from a `[lat, lng]` pair.
    pub fn from_array(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }

    /// Reads a coordinate out of a loosely typed literal.
    ///
    /// Accepts `{"lat": .., "lng": ..}`, `{"latitude": .., "longitude": ..}`
    /// and `[lat, lng]`. Anything else yields `None` so permissive setters
    /// can ignore it.
    pub fn from_literal(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Array(items) if items.len() == 2 => {
                Some(Self::new(items[0].as_f64()?, items[1].as_f64()?))
            }
            serde_json::Value::Object(map) => {
                let lat = map.get("lat").or_else(|| map.get("latitude"))?.as_f64()?;
                let lng = map.get("lng").or_else(|| map.get("longitude"))?.as_f64()?;
                Some(Self::new(lat, lng))
            }
            _ => None,
        }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Clamps latitude to the Web Mercator range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Projects onto the Web Mercator world plane at zoom 0, where the whole
    /// world spans one `TILE_SIZE` square with the origin in the north-west.
    pub fn to_world_point(&self) -> Point {
        let sin_lat = Self::clamp_lat(self.lat).to_radians().sin();
        let x = TILE_SIZE * (0.5 + self.lng / 360.0);
        let y = TILE_SIZE * (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI));
        Point::new(x, y)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self::new(lat, lng)
    }
}

impl From<[f64; 2]> for LatLng {
    fn from(pair: [f64; 2]) -> Self {
        Self::from_array(pair)
    }
}

/// Represents a point in screen or projected coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

/// Represents a bounding box of geographical coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Smallest bounds containing every point, `None` for an empty slice.
    pub fn from_points(points: &[LatLng]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self::new(*first, *first);
        for point in rest {
            bounds.extend(point);
        }
        Some(bounds)
    }

    /// Extends the bounds to include a point
    pub fn extend(&mut self, point: &LatLng) {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lat_lng_creation() {
        let coord = LatLng::new(40.7128, -74.0060);
        assert_eq!(coord.lat, 40.7128);
        assert_eq!(coord.lng, -74.0060);
        assert!(coord.is_valid());
    }

    #[test]
    fn test_lat_lng_from_literal_shapes() {
        let expected = LatLng::new(10.0, 20.0);
        assert_eq!(LatLng::from_literal(&json!({"lat": 10.0, "lng": 20.0})), Some(expected));
        assert_eq!(
            LatLng::from_literal(&json!({"latitude": 10, "longitude": 20})),
            Some(expected)
        );
        assert_eq!(LatLng::from_literal(&json!([10.0, 20.0])), Some(expected));
        assert_eq!(LatLng::from_array([10.0, 20.0]), expected);
        assert_eq!(LatLng::from((10.0, 20.0)), expected);
    }

    #[test]
    fn test_lat_lng_from_literal_rejects_garbage() {
        assert_eq!(LatLng::from_literal(&json!("10,20")), None);
        assert_eq!(LatLng::from_literal(&json!([10.0])), None);
        assert_eq!(LatLng::from_literal(&json!({"lat": "north", "lng": 1.0})), None);
    }

    #[test]
    fn test_world_point_origin() {
        let origin = LatLng::new(0.0, 0.0).to_world_point();
        assert!((origin.x - TILE_SIZE / 2.0).abs() < 1e-9);
        assert!((origin.y - TILE_SIZE / 2.0).abs() < 1e-9);

        let east = LatLng::new(0.0, 90.0).to_world_point();
        assert!((east.x - TILE_SIZE * 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_from_points() {
        let bounds = LatLngBounds::from_points(&[
            LatLng::new(40.0, -75.0),
            LatLng::new(41.0, -73.0),
            LatLng::new(40.5, -74.0),
        ])
        .expect("non-empty");

        assert_eq!(bounds.south_west, LatLng::new(40.0, -75.0));
        assert_eq!(bounds.north_east, LatLng::new(41.0, -73.0));
        assert_eq!(bounds.center(), LatLng::new(40.5, -74.0));
        assert!(LatLngBounds::from_points(&[]).is_none());
    }
}
