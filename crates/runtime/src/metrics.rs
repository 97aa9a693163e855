use std::collections::BTreeMap;

/// Monotonic engine event counts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Counter {
    Loads,
    FilterPasses,
    IndexRebuilds,
    RenderPasses,
    SampledRenders,
    Resolves,
}

impl Counter {
    pub fn name(self) -> &'static str {
        match self {
            Counter::Loads => "loads",
            Counter::FilterPasses => "filter_passes",
            Counter::IndexRebuilds => "index_rebuilds",
            Counter::RenderPasses => "render_passes",
            Counter::SampledRenders => "sampled_renders",
            Counter::Resolves => "resolves",
        }
    }
}

/// Last-written engine sizes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Gauge {
    DatasetPoints,
    FilteredPoints,
    GridCells,
    LastVisiblePoints,
    LastRenderPoints,
}

impl Gauge {
    pub fn name(self) -> &'static str {
        match self {
            Gauge::DatasetPoints => "dataset_points",
            Gauge::FilteredPoints => "filtered_points",
            Gauge::GridCells => "grid_cells",
            Gauge::LastVisiblePoints => "last_visible_points",
            Gauge::LastRenderPoints => "last_render_points",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Histogram {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

impl Histogram {
    pub fn record(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }
}

/// Deterministic engine metrics.
///
/// No wall-clock readings: the values depend only on the operations the
/// engine ran, so two runs over the same inputs report the same snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    counters: BTreeMap<Counter, u64>,
    gauges: BTreeMap<Gauge, u64>,
    render_sizes: Histogram,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub counters: Vec<(&'static str, u64)>,
    pub gauges: Vec<(&'static str, u64)>,
    pub render_sizes: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, c: Counter) -> u64 {
        self.counters.get(&c).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, c: Counter) {
        *self.counters.entry(c).or_insert(0) += 1;
    }

    pub fn gauge(&self, g: Gauge) -> Option<u64> {
        self.gauges.get(&g).copied()
    }

    pub fn set_gauge(&mut self, g: Gauge, value: usize) {
        self.gauges.insert(g, value as u64);
    }

    pub fn record_render(&mut self, points: usize) {
        self.render_sizes.record(points as u64);
        self.set_gauge(Gauge::LastRenderPoints, points);
    }

    pub fn render_sizes(&self) -> Histogram {
        self.render_sizes
    }

    /// Snapshot in declaration order of the counter and gauge kinds.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.iter().map(|(k, v)| (k.name(), *v)).collect(),
            gauges: self.gauges.iter().map(|(k, v)| (k.name(), *v)).collect(),
            render_sizes: self.render_sizes,
        }
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, v) in self.counters.iter().chain(self.gauges.iter()) {
            writeln!(f, "{name}={v}")?;
        }
        if let Some(mean) = self.render_sizes.mean() {
            write!(
                f,
                "render_sizes count={} min={} max={} mean={mean:.1}",
                self.render_sizes.count, self.render_sizes.min, self.render_sizes.max
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Counter, Gauge, Histogram, Metrics};

    #[test]
    fn counters_accumulate() {
        let mut m = Metrics::new();
        m.inc(Counter::Loads);
        m.inc(Counter::Loads);
        assert_eq!(m.counter(Counter::Loads), 2);
        assert_eq!(m.counter(Counter::Resolves), 0);
    }

    #[test]
    fn gauges_overwrite() {
        let mut m = Metrics::new();
        assert_eq!(m.gauge(Gauge::FilteredPoints), None);
        m.set_gauge(Gauge::FilteredPoints, 10);
        m.set_gauge(Gauge::FilteredPoints, 11);
        assert_eq!(m.gauge(Gauge::FilteredPoints), Some(11));
    }

    #[test]
    fn histogram_tracks_min_max_sum_count() {
        let mut h = Histogram::default();
        assert_eq!(h.mean(), None);
        h.record(5);
        h.record(2);
        h.record(8);
        assert_eq!((h.count, h.sum, h.min, h.max), (3, 15, 2, 8));
        assert_eq!(h.mean(), Some(5.0));
    }

    #[test]
    fn snapshot_follows_kind_order() {
        let mut m = Metrics::new();
        m.inc(Counter::Resolves);
        m.inc(Counter::Loads);
        m.set_gauge(Gauge::LastVisiblePoints, 4);
        m.set_gauge(Gauge::DatasetPoints, 9);
        m.record_render(3);

        let snap = m.snapshot();
        assert_eq!(snap.counters, vec![("loads", 1), ("resolves", 1)]);
        assert_eq!(
            snap.gauges,
            vec![
                ("dataset_points", 9),
                ("last_visible_points", 4),
                ("last_render_points", 3)
            ]
        );
        let text = snap.to_string();
        assert!(text.starts_with("loads=1\nresolves=1\n"));
        assert!(text.ends_with("render_sizes count=1 min=3 max=3 mean=3.0"));
    }
}
