/// Geographic coordinate in degrees.
///
/// `lng` is not required to lie in `[-180, 180]`; map surfaces that have been
/// panned across the antimeridian report unwrapped longitudes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        LatLng { lat, lng }
    }

    /// Squared euclidean distance in (lat, lng) degree space.
    ///
    /// Not a geodesic distance: it ignores meridian convergence and the
    /// antimeridian seam.
    #[inline]
    pub fn distance_sq(self, other: LatLng) -> f64 {
        let dlat = self.lat - other.lat;
        let dlng = self.lng - other.lng;
        dlat * dlat + dlng * dlng
    }

    /// Same point with the longitude folded into `[-180, 180)`.
    pub fn wrapped(self) -> LatLng {
        LatLng::new(self.lat, wrap_lng(self.lng))
    }
}

/// Fold a longitude into `[-180, 180)`.
pub fn wrap_lng(lng: f64) -> f64 {
    if (-180.0..180.0).contains(&lng) {
        return lng;
    }
    (lng + 180.0).rem_euclid(360.0) - 180.0
}

/// Longitude offsets a point is tested at so copies on either side of the
/// antimeridian are found.
pub const LNG_WRAP_OFFSETS: [f64; 3] = [0.0, 360.0, -360.0];

/// Visible map bounds in degrees (south/west/north/east, inclusive).
///
/// Convention:
/// - `west <= east` always holds after construction. A box given with
///   `east < west` crosses the antimeridian and is stored as
///   `[west, east + 360]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LatLngBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl LatLngBounds {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        let (south, north) = if south <= north {
            (south, north)
        } else {
            (north, south)
        };
        let east = if east < west { east + 360.0 } else { east };
        LatLngBounds {
            south,
            west,
            north,
            east,
        }
    }

    /// The whole globe, without wrapped copies.
    pub fn world() -> Self {
        LatLngBounds::new(-90.0, -180.0, 90.0, 180.0)
    }

    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.south && p.lat <= self.north && p.lng >= self.west && p.lng <= self.east
    }

    /// Smallest box containing every coordinate, or `None` for an empty input.
    pub fn enclosing(points: impl IntoIterator<Item = LatLng>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut b = LatLngBounds {
            south: first.lat,
            west: first.lng,
            north: first.lat,
            east: first.lng,
        };
        for p in iter {
            b.south = b.south.min(p.lat);
            b.north = b.north.max(p.lat);
            b.west = b.west.min(p.lng);
            b.east = b.east.max(p.lng);
        }
        Some(b)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new((self.south + self.north) * 0.5, (self.west + self.east) * 0.5)
    }
}
