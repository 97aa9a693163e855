use std::collections::BTreeMap;

use foundation::math::precision::stable_total_cmp_f64;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::dataset::Dataset;

pub const DEFAULT_CELL_SIZE_DEG: f64 = 1.0;

/// Discretised grid cell: `floor(lng / size)`, `floor(lat / size)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub x: i32,
    pub y: i32,
}

impl CellKey {
    pub fn of(lat: f64, lng: f64, cell_size_deg: f64) -> Self {
        Self {
            x: (lng / cell_size_deg).floor() as i32,
            y: (lat / cell_size_deg).floor() as i32,
        }
    }
}

/// A sampled point with its render priority (`1 / points in its cell`).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PrioritizedPoint {
    pub index: usize,
    pub cell: CellKey,
    pub priority: f64,
}

/// Fixed-size geographic partition of dataset indices.
///
/// Ordering contract:
/// - Cells iterate in ascending `CellKey` order; members keep the order they
///   were inserted in (dataset order for `build`).
#[derive(Debug, Clone)]
pub struct DensityGrid {
    cell_size_deg: f64,
    cells: BTreeMap<CellKey, Vec<usize>>,
    len: usize,
}

impl DensityGrid {
    /// Partition every point of `dataset`.
    pub fn build(dataset: &Dataset, cell_size_deg: f64) -> Self {
        Self::from_indices(dataset, 0..dataset.len(), cell_size_deg)
    }

    /// Partition the given dataset indices. Out-of-range indices are skipped.
    pub fn from_indices(
        dataset: &Dataset,
        indices: impl IntoIterator<Item = usize>,
        cell_size_deg: f64,
    ) -> Self {
        let mut cells: BTreeMap<CellKey, Vec<usize>> = BTreeMap::new();
        let mut len = 0;
        for index in indices {
            let Some(p) = dataset.get(index) else {
                continue;
            };
            cells
                .entry(CellKey::of(p.lat, p.lng, cell_size_deg))
                .or_default()
                .push(index);
            len += 1;
        }
        Self {
            cell_size_deg,
            cells,
            len,
        }
    }

    /// A grid with the same cells holding only the members `keep` accepts.
    /// Cells left empty are dropped.
    pub fn restricted(&self, mut keep: impl FnMut(usize) -> bool) -> Self {
        let mut cells = BTreeMap::new();
        let mut len = 0;
        for (key, members) in &self.cells {
            let kept: Vec<usize> = members.iter().copied().filter(|&i| keep(i)).collect();
            if kept.is_empty() {
                continue;
            }
            len += kept.len();
            cells.insert(*key, kept);
        }
        Self {
            cell_size_deg: self.cell_size_deg,
            cells,
            len,
        }
    }

    pub fn cell_size_deg(&self) -> f64 {
        self.cell_size_deg
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, key: CellKey) -> &[usize] {
        self.cells.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellKey, &[usize])> + '_ {
        self.cells.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Mean cell occupancy, `floor(len / cell_count)`. Never 0 for a
    /// non-empty grid since no cell is empty.
    pub fn avg_points_per_cell(&self) -> usize {
        self.len.checked_div(self.cells.len()).unwrap_or(0)
    }

    /// Per-cell sample quota for a render cap.
    ///
    /// The largest `q >= 1` with `sum(min(cell_len, q)) <= cap`, bounded by
    /// `avg_points_per_cell`. On a grid of equally dense cells this is
    /// `floor(cap / cell_count)`; sparse cells that fill below the quota
    /// leave their share to denser ones, up to the mean occupancy.
    pub fn cell_quota(&self, cap: usize) -> usize {
        let max_cell = self
            .cells
            .values()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .min(self.avg_points_per_cell());
        if max_cell == 0 {
            return 0;
        }
        let fill = |q: usize| -> usize { self.cells.values().map(|m| m.len().min(q)).sum() };

        let (mut lo, mut hi) = (1usize, max_cell);
        if fill(hi) <= cap {
            return hi;
        }
        // Invariant: fill(hi) > cap; answer in [lo, hi).
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if fill(mid) <= cap {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Coverage-preserving downsample to at most `cap` points.
    ///
    /// Each cell contributes up to `cell_quota(cap)` randomly chosen members,
    /// never more than `avg_points_per_cell`, all with priority
    /// `1 / cell_len`. The result is sorted by descending
    /// priority, so points from sparse cells come before points from dense
    /// ones, and truncated to `cap`. Membership depends on `rng`.
    pub fn sample<R: Rng + ?Sized>(&self, cap: usize, rng: &mut R) -> Vec<PrioritizedPoint> {
        if self.is_empty() || cap == 0 {
            return Vec::new();
        }
        let quota = self.cell_quota(cap);

        let mut cells: Vec<(&CellKey, &Vec<usize>)> = self.cells.iter().collect();
        // Visit order decides ties between equally dense cells.
        cells.shuffle(rng);

        let mut out: Vec<PrioritizedPoint> = Vec::with_capacity(cap.min(self.len));
        let mut scratch: Vec<usize> = Vec::new();
        for (key, members) in cells {
            let priority = 1.0 / members.len() as f64;
            scratch.clear();
            scratch.extend_from_slice(members);
            let (chosen, _rest) = scratch.partial_shuffle(rng, quota);
            out.extend(chosen.iter().map(|&index| PrioritizedPoint {
                index,
                cell: *key,
                priority,
            }));
        }

        out.sort_by(|a, b| stable_total_cmp_f64(b.priority, a.priority));
        out.truncate(cap);
        out
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{CellKey, DensityGrid};
    use crate::dataset::Dataset;
    use crate::point::Point;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn per_cell_counts(sample: &[super::PrioritizedPoint]) -> BTreeMap<CellKey, usize> {
        let mut counts = BTreeMap::new();
        for p in sample {
            *counts.entry(p.cell).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn cell_keys_floor_negative_coordinates() {
        assert_eq!(CellKey::of(0.5, 0.5, 1.0), CellKey { x: 0, y: 0 });
        assert_eq!(CellKey::of(-0.5, -0.5, 1.0), CellKey { x: -1, y: -1 });
        assert_eq!(CellKey::of(45.0, -179.9, 1.0), CellKey { x: -180, y: 45 });
        assert_eq!(CellKey::of(10.0, 25.0, 10.0), CellKey { x: 2, y: 1 });
    }

    #[test]
    fn empty_grid_samples_nothing() {
        let grid = DensityGrid::build(&Dataset::default(), 1.0);
        assert!(grid.is_empty());
        assert_eq!(grid.cell_count(), 0);
        assert_eq!(grid.cell_quota(100), 0);
        assert!(grid.sample(100, &mut StdRng::seed_from_u64(1)).is_empty());
    }

    #[test]
    fn isolated_point_ranks_first() {
        let mut points: Vec<Point> = (0..500)
            .map(|i| Point::new(10.0 + (i % 50) as f64 * 0.01, 20.0 + (i / 50) as f64 * 0.01))
            .collect();
        points.push(Point::new(-40.5, 100.5));
        let ds = Dataset::from_ordered(None, points);
        let grid = DensityGrid::build(&ds, 1.0);
        assert_eq!(grid.cell_count(), 2);

        for seed in 0..10 {
            let sample = grid.sample(20, &mut StdRng::seed_from_u64(seed));
            assert_eq!(sample.len(), 20);
            assert_eq!(sample[0].index, 500);
            assert_eq!(sample[0].priority, 1.0);
            assert!(sample[1..].iter().all(|p| p.priority == 1.0 / 500.0));
        }
    }

    #[test]
    fn quota_spreads_budget_across_cells() {
        // One dense cell, three sparse ones.
        let mut points = Vec::new();
        for i in 0..1000 {
            points.push(Point::new(0.5, 0.5 + (i as f64) * 1e-4));
        }
        for c in 1..4 {
            for _ in 0..5 {
                points.push(Point::new(0.5, c as f64 + 0.5));
            }
        }
        let ds = Dataset::from_ordered(None, points);
        let grid = DensityGrid::build(&ds, 1.0);

        // 3 sparse cells keep all 15 points; the dense cell receives the rest.
        assert_eq!(grid.cell_quota(100), 85);
        let sample = grid.sample(100, &mut StdRng::seed_from_u64(3));
        assert_eq!(sample.len(), 100);
        let counts = per_cell_counts(&sample);
        assert_eq!(counts[&CellKey { x: 0, y: 0 }], 85);
        assert_eq!(counts[&CellKey { x: 1, y: 0 }], 5);
    }

    #[test]
    fn cap_near_total_never_exceeds_mean_occupancy() {
        // One cell of 100 points and three single-point cells.
        let mut points: Vec<Point> = (0..100)
            .map(|i| Point::new(0.5, 0.5 + (i as f64) * 1e-3))
            .collect();
        for c in 1..4 {
            points.push(Point::new(0.5, c as f64 + 0.5));
        }
        let ds = Dataset::from_ordered(None, points);
        let grid = DensityGrid::build(&ds, 1.0);
        assert_eq!(grid.avg_points_per_cell(), 25);
        assert_eq!(grid.cell_quota(102), 25);

        for seed in 0..5 {
            let sample = grid.sample(102, &mut StdRng::seed_from_u64(seed));
            let counts = per_cell_counts(&sample);
            assert_eq!(counts[&CellKey { x: 0, y: 0 }], 25);
            for c in 1..4 {
                assert_eq!(counts[&CellKey { x: c, y: 0 }], 1);
            }
            assert_eq!(sample.len(), 28);
        }
    }

    #[test]
    fn more_cells_than_cap_truncates_to_cap() {
        let points = (0..50).map(|i| Point::new(0.5, i as f64 + 0.5)).collect();
        let ds = Dataset::from_ordered(None, points);
        let grid = DensityGrid::build(&ds, 1.0);
        let sample = grid.sample(10, &mut StdRng::seed_from_u64(9));
        assert_eq!(sample.len(), 10);
        assert!(sample.iter().all(|p| p.priority == 1.0));
    }

    #[test]
    fn restricted_grid_drops_empty_cells() {
        let ds = Dataset::from_ordered(
            None,
            vec![Point::new(0.5, 0.5), Point::new(0.6, 0.6), Point::new(5.5, 5.5)],
        );
        let grid = DensityGrid::build(&ds, 1.0);
        let only_first = grid.restricted(|i| i == 0);
        assert_eq!(only_first.len(), 1);
        assert_eq!(only_first.cell_count(), 1);
        assert_eq!(only_first.cell(CellKey { x: 0, y: 0 }), &[0]);
        assert_eq!(only_first.cell(CellKey { x: 5, y: 5 }), &[] as &[usize]);
    }

    #[test]
    fn even_distribution_covers_every_cell() {
        let mut rng = StdRng::seed_from_u64(42);
        let points: Vec<Point> = (0..100_000)
            .map(|_| Point::new(rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)))
            .collect();
        let ds = Dataset::from_ordered(None, points);
        let grid = DensityGrid::build(&ds, 1.0);
        assert_eq!(grid.cell_count(), 100);

        let cap = 1000;
        let quota = grid.cell_quota(cap);
        let sample = grid.sample(cap, &mut rng);
        assert!(sample.len() <= cap);

        let avg = grid.len() / grid.cell_count();
        assert_eq!(quota, 10);
        let counts = per_cell_counts(&sample);
        for (key, members) in grid.cells() {
            let got = counts.get(&key).copied().unwrap_or(0);
            assert!(got <= avg, "cell {key:?} sampled {got} > mean occupancy {avg}");
            assert!(got <= quota, "cell {key:?} sampled {got} > quota {quota}");
            if members.len() >= quota {
                assert!(got >= 1, "cell {key:?} starved");
            }
        }
    }

    #[test]
    fn sampled_indices_are_distinct_members_of_their_cell() {
        let mut rng = StdRng::seed_from_u64(5);
        let points: Vec<Point> = (0..2_000)
            .map(|_| Point::new(rng.gen_range(-3.0..3.0), rng.gen_range(-3.0..3.0)))
            .collect();
        let ds = Dataset::from_ordered(None, points);
        let grid = DensityGrid::build(&ds, 1.0);
        let sample = grid.sample(300, &mut rng);

        let mut seen = std::collections::HashSet::new();
        for p in &sample {
            assert!(seen.insert(p.index));
            assert!(grid.cell(p.cell).contains(&p.index));
        }
        assert!(sample.windows(2).all(|w| w[0].priority >= w[1].priority));
    }
}
