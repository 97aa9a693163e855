/// Point budget for a single render pass.
///
/// The budget is a count of points handed to the rasterizer, not time, so a
/// render decision is a pure function of the visible set size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderBudget {
    cap: usize,
}

/// What a render pass does with its visible set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RenderPlan {
    /// Everything visible fits; hand it over in view order.
    Direct,
    /// Downsample to `cap` points, dropping `overflow` of them.
    Sample { cap: usize, overflow: usize },
}

impl RenderBudget {
    pub const DEFAULT_CAP: usize = 30_000;

    pub fn new(cap: usize) -> Self {
        Self { cap }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn fits(&self, points: usize) -> bool {
        points <= self.cap
    }

    pub fn plan(&self, visible: usize) -> RenderPlan {
        if self.fits(visible) {
            RenderPlan::Direct
        } else {
            RenderPlan::Sample {
                cap: self.cap,
                overflow: visible - self.cap,
            }
        }
    }
}

impl Default for RenderBudget {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::{RenderBudget, RenderPlan};

    #[test]
    fn plans_direct_up_to_cap() {
        let b = RenderBudget::new(3);
        assert_eq!(b.plan(0), RenderPlan::Direct);
        assert_eq!(b.plan(3), RenderPlan::Direct);
        assert_eq!(b.plan(5), RenderPlan::Sample { cap: 3, overflow: 2 });
    }

    #[test]
    fn zero_cap_samples_everything_away() {
        let b = RenderBudget::new(0);
        assert!(b.fits(0));
        assert_eq!(b.plan(1), RenderPlan::Sample { cap: 0, overflow: 1 });
    }

    #[test]
    fn default_cap_fits_the_map_view() {
        let b = RenderBudget::default();
        assert_eq!(b.cap(), 30_000);
        assert_eq!(b.plan(30_000), RenderPlan::Direct);
        assert_eq!(b.plan(30_001), RenderPlan::Sample { cap: 30_000, overflow: 1 });
    }
}
