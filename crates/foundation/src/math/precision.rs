//! Float ordering policies.
//!
//! Distances, priorities and coordinates are sorted through these helpers so
//! ties and NaNs order the same way on every run.

use core::cmp::Ordering;

/// Fold `-0.0` into `0.0` and every NaN into one canonical NaN.
pub fn canonical_f64(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    }
}

/// Total order over canonicalized floats. Use it for every float sort key.
pub fn stable_total_cmp_f64(a: f64, b: f64) -> Ordering {
    canonical_f64(a).total_cmp(&canonical_f64(b))
}
