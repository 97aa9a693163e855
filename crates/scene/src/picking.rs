use foundation::bounds::{LNG_WRAP_OFFSETS, LatLng};
use foundation::math::precision::stable_total_cmp_f64;
use foundation::math::{Vec2, WebMercator};

use crate::spatial::{KdTree, Nearest};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PickOptions {
    /// Squared-degree distance below which the nearest point is in range.
    pub range_threshold: f64,
    /// Marker hit radius in pixels at `reference_zoom`.
    pub marker_size_px: f64,
    pub reference_zoom: f64,
}

impl Default for PickOptions {
    fn default() -> Self {
        Self {
            range_threshold: 0.1,
            marker_size_px: 6.0,
            reference_zoom: 9.0,
        }
    }
}

impl PickOptions {
    /// Hit radius at `zoom`: `marker_size_px * 2^(reference_zoom - zoom)`.
    pub fn marker_radius_px(&self, zoom: f64) -> f64 {
        self.marker_size_px * 2f64.powf(self.reference_zoom - zoom)
    }
}

/// Result of resolving a pointer position to the nearest indexed point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ProximalNode {
    pub index: usize,
    /// The candidate at the longitude copy closest to the pointer.
    pub coord: LatLng,
    pub distance_sq: f64,
    pub pixel_distance: f64,
    pub in_range: bool,
    pub on_marker: bool,
}

/// Nearest indexed point to `pointer`, across the antimeridian seam.
///
/// The pointer may carry an unwrapped longitude. The returned coordinate is
/// the candidate shifted onto the pointer's side of the seam.
///
/// Ordering contract:
/// - Equal distances resolve to the lower dataset index.
pub fn nearest_wrapped(index: &KdTree, pointer: LatLng) -> Option<Nearest> {
    let wrapped = pointer.wrapped();
    let shift = pointer.lng - wrapped.lng;

    let mut best: Option<(Nearest, f64)> = None;
    for off in LNG_WRAP_OFFSETS {
        let Some(hit) = index.nearest(LatLng::new(wrapped.lat, wrapped.lng + off)) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((b, _)) => stable_total_cmp_f64(hit.distance_sq, b.distance_sq)
                .then_with(|| hit.index.cmp(&b.index))
                .is_lt(),
        };
        if better {
            best = Some((hit, off));
        }
    }

    let (hit, off) = best?;
    Some(Nearest {
        coord: LatLng::new(hit.coord.lat, hit.coord.lng - off + shift),
        ..hit
    })
}

/// Resolve a pointer event against the spatial index.
///
/// `project` maps a geographic coordinate to screen pixels at the current
/// view; it is only consulted for the on-marker test. Returns `None` when the
/// index is empty.
pub fn resolve<F>(
    index: &KdTree,
    pointer: LatLng,
    zoom: f64,
    mut project: F,
    opts: PickOptions,
) -> Option<ProximalNode>
where
    F: FnMut(LatLng) -> Vec2,
{
    let hit = nearest_wrapped(index, pointer)?;
    let pixel_distance = project(pointer).distance(project(hit.coord));

    Some(ProximalNode {
        index: hit.index,
        coord: hit.coord,
        distance_sq: hit.distance_sq,
        pixel_distance,
        in_range: hit.distance_sq < opts.range_threshold,
        on_marker: pixel_distance < opts.marker_radius_px(zoom),
    })
}

/// `resolve` with a Web Mercator projection at `zoom`.
pub fn resolve_web_mercator(
    index: &KdTree,
    pointer: LatLng,
    zoom: f64,
    opts: PickOptions,
) -> Option<ProximalNode> {
    let proj = WebMercator::new(zoom);
    resolve(index, pointer, zoom, |p| proj.project(p), opts)
}
