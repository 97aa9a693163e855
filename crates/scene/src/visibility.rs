use foundation::bounds::{LNG_WRAP_OFFSETS, LatLng, LatLngBounds};

use crate::dataset::Dataset;

/// Longitude of the first wrapped copy of `p` inside `bounds`.
///
/// Copies are tested at `lng`, `lng + 360` and `lng - 360`, in that order.
pub fn visible_lng(bounds: &LatLngBounds, p: LatLng) -> Option<f64> {
    LNG_WRAP_OFFSETS
        .iter()
        .map(|off| p.lng + off)
        .find(|&lng| bounds.contains(LatLng::new(p.lat, lng)))
}

pub fn visible(bounds: &LatLngBounds, p: LatLng) -> bool {
    visible_lng(bounds, p).is_some()
}

/// A point that survived culling, positioned at its visible longitude copy.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Culled {
    pub index: usize,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone)]
pub struct CullQuery {
    pub limit: usize,
}

impl Default for CullQuery {
    fn default() -> Self {
        Self { limit: usize::MAX }
    }
}

/// Cull dataset indices against the visible map bounds.
///
/// Ordering contract:
/// - Output keeps the order of `indices` (FilteredView order when fed from a
///   view) and stops after `query.limit` hits.
///
/// Indices outside the dataset are ignored.
pub fn cull(
    dataset: &Dataset,
    indices: impl IntoIterator<Item = usize>,
    bounds: &LatLngBounds,
    query: &CullQuery,
) -> Vec<Culled> {
    let mut out = Vec::new();
    if query.limit == 0 {
        return out;
    }

    for index in indices {
        let Some(p) = dataset.get(index) else {
            continue;
        };
        let Some(lng) = visible_lng(bounds, p.lat_lng()) else {
            continue;
        };
        out.push(Culled {
            index,
            lat: p.lat,
            lng,
        });
        if out.len() >= query.limit {
            break;
        }
    }

    out
}
