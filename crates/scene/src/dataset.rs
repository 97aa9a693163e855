use foundation::bounds::{LatLng, LatLngBounds};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::point::Point;

/// Keys that describe the location itself and never show up as filterable
/// attributes.
pub const COORDINATE_KEYS: [&str; 4] = ["lat", "lng", "latitude", "longitude"];

/// Immutable-after-load collection of points.
///
/// The point order is shuffled once at construction so that any "first N"
/// view of the dataset is an unbiased sample. Indices into `points()` are
/// stable for the lifetime of the dataset.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    name: Option<String>,
    points: Vec<Point>,
    schema: Vec<String>,
}

impl Dataset {
    /// Shuffle `points` (Fisher–Yates) and discover the attribute schema.
    pub fn load<R: Rng + ?Sized>(name: Option<String>, mut points: Vec<Point>, rng: &mut R) -> Self {
        points.shuffle(rng);
        Self::from_ordered(name, points)
    }

    /// Build a dataset keeping the given order.
    pub fn from_ordered(name: Option<String>, points: Vec<Point>) -> Self {
        let schema = discover_schema(&points);
        Self {
            name,
            points,
            schema,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Attribute keys in first-seen order.
    ///
    /// Coordinate keys and keys that are null on every point are omitted.
    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    /// Bounding box of every point, `None` when empty.
    pub fn bounds(&self) -> Option<LatLngBounds> {
        LatLngBounds::enclosing(self.points.iter().map(|p| LatLng::new(p.lat, p.lng)))
    }
}

fn discover_schema(points: &[Point]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut schema = Vec::new();
    for p in points {
        for (key, value) in &p.attrs {
            if value.is_null() || COORDINATE_KEYS.contains(&key.as_str()) {
                continue;
            }
            if seen.insert(key.as_str()) {
                schema.push(key.clone());
            }
        }
    }
    schema
}
