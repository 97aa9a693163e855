use std::collections::HashMap;

use foundation::bounds::{LatLng, LatLngBounds};
use rand::SeedableRng;
use rand::rngs::StdRng;
use runtime::{Counter, Gauge, Metrics, MetricsSnapshot, RenderPlan};
use scene::grid::DensityGrid;
use scene::link::street_view_url;
use scene::picking::{ProximalNode, resolve_web_mercator};
use scene::spatial::KdTree;
use scene::visibility::{CullQuery, cull};
use scene::{Dataset, FilterChain, FilteredView, Point, apply_filters};
use tracing::{debug, info};

use crate::config::PointLayerConfig;
use crate::layer::{Layer, LayerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    /// The operation needs a loaded dataset.
    NotLoaded,
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerError::NotLoaded => write!(f, "no dataset loaded"),
        }
    }
}

impl std::error::Error for LayerError {}

/// A point ready for the rasterizer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderPoint {
    pub index: usize,
    pub lat: f64,
    /// Longitude of the copy that is inside the viewport.
    pub lng: f64,
    /// Sampling priority; `None` when the visible set fit the budget.
    pub priority: Option<f64>,
}

/// Everything derived from one dataset load.
#[derive(Debug)]
struct Loaded {
    dataset: Dataset,
    grid: DensityGrid,
    filters: FilterChain,
    view: FilteredView,
    index: KdTree,
}

/// Interactive point layer.
///
/// State machine:
/// - Unloaded until the first `load`.
/// - `load` and `reload` swap in a new dataset atomically; every derived
///   structure is rebuilt and the filter chain is cleared.
/// - Filter changes rebuild the view and spatial index wholesale.
#[derive(Debug)]
pub struct PointLayer {
    id: LayerId,
    config: PointLayerConfig,
    rng: StdRng,
    loaded: Option<Loaded>,
    metrics: Metrics,
}

impl PointLayer {
    pub fn new(id: LayerId, config: PointLayerConfig) -> Self {
        let rng = match config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            id,
            config,
            rng,
            loaded: None,
            metrics: Metrics::new(),
        }
    }

    pub fn config(&self) -> &PointLayerConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Load a dataset, replacing any previous one.
    pub fn load(&mut self, name: Option<String>, points: Vec<Point>) {
        let dataset = Dataset::load(name, points, &mut self.rng);
        let grid = DensityGrid::build(&dataset, self.config.cell_size_deg);
        let view = FilteredView::all(dataset.len());
        let index = KdTree::from_view(&dataset, &view);

        info!(
            layer = self.id.0,
            name = dataset.name().unwrap_or("<unnamed>"),
            points = dataset.len(),
            attributes = dataset.schema().len(),
            grid_cells = grid.cell_count(),
            replaced = self.loaded.is_some(),
            "loaded dataset"
        );

        self.metrics.inc(Counter::Loads);
        self.metrics.inc(Counter::IndexRebuilds);
        self.metrics.set_gauge(Gauge::DatasetPoints, dataset.len());
        self.metrics.set_gauge(Gauge::FilteredPoints, view.len());
        self.metrics.set_gauge(Gauge::GridCells, grid.cell_count());

        self.loaded = Some(Loaded {
            dataset,
            grid,
            filters: FilterChain::new(),
            view,
            index,
        });
    }

    /// Replace the loaded dataset.
    pub fn reload(&mut self, name: Option<String>, points: Vec<Point>) -> Result<(), LayerError> {
        if self.loaded.is_none() {
            return Err(LayerError::NotLoaded);
        }
        self.load(name, points);
        Ok(())
    }

    pub fn dataset(&self) -> Result<&Dataset, LayerError> {
        Ok(&self.state()?.dataset)
    }

    pub fn filters(&self) -> Result<&FilterChain, LayerError> {
        Ok(&self.state()?.filters)
    }

    pub fn view(&self) -> Result<&FilteredView, LayerError> {
        Ok(&self.state()?.view)
    }

    pub fn point(&self, index: usize) -> Option<&Point> {
        self.loaded.as_ref()?.dataset.get(index)
    }

    /// Replace the filter chain and rebuild the view and spatial index.
    pub fn set_filters(&mut self, filters: FilterChain) -> Result<&FilteredView, LayerError> {
        let state = self.loaded.as_mut().ok_or(LayerError::NotLoaded)?;

        let view = apply_filters(&state.dataset, &filters);
        let index = KdTree::from_view(&state.dataset, &view);
        debug!(
            layer = self.id.0,
            predicates = filters.len(),
            filtered = view.len(),
            total = state.dataset.len(),
            "applied filters"
        );

        self.metrics.inc(Counter::FilterPasses);
        self.metrics.inc(Counter::IndexRebuilds);
        self.metrics.set_gauge(Gauge::FilteredPoints, view.len());

        state.filters = filters;
        state.view = view;
        state.index = index;
        Ok(&state.view)
    }

    /// Points to draw for the current viewport.
    ///
    /// The filtered view is culled to `bounds` first. If the visible set fits
    /// the render cap it is returned in view order; otherwise it is
    /// density-sampled down to the cap, sparse cells first.
    pub fn render(&mut self, bounds: &LatLngBounds) -> Result<Vec<RenderPoint>, LayerError> {
        let state = self.loaded.as_ref().ok_or(LayerError::NotLoaded)?;
        let visible = cull(
            &state.dataset,
            state.view.indices(),
            bounds,
            &CullQuery::default(),
        );

        let out: Vec<RenderPoint> = match self.config.budget().plan(visible.len()) {
            RenderPlan::Direct => visible
                .iter()
                .map(|c| RenderPoint {
                    index: c.index,
                    lat: c.lat,
                    lng: c.lng,
                    priority: None,
                })
                .collect(),
            RenderPlan::Sample { cap, overflow } => {
                let copies: HashMap<usize, (f64, f64)> =
                    visible.iter().map(|c| (c.index, (c.lat, c.lng))).collect();
                let grid = state.grid.restricted(|i| copies.contains_key(&i));
                let sampled = grid.sample(cap, &mut self.rng);
                debug!(
                    layer = self.id.0,
                    visible = visible.len(),
                    cap,
                    overflow,
                    cells = grid.cell_count(),
                    "sampled render set"
                );
                self.metrics.inc(Counter::SampledRenders);
                sampled
                    .into_iter()
                    .filter_map(|p| {
                        let (lat, lng) = copies.get(&p.index).copied()?;
                        Some(RenderPoint {
                            index: p.index,
                            lat,
                            lng,
                            priority: Some(p.priority),
                        })
                    })
                    .collect()
            }
        };

        self.metrics.inc(Counter::RenderPasses);
        self.metrics.set_gauge(Gauge::LastVisiblePoints, visible.len());
        self.metrics.record_render(out.len());
        Ok(out)
    }

    /// Resolve a pointer position at `zoom` against the filtered points.
    ///
    /// `Ok(None)` when nothing passes the filters.
    pub fn resolve(
        &mut self,
        pointer: LatLng,
        zoom: f64,
    ) -> Result<Option<ProximalNode>, LayerError> {
        let state = self.loaded.as_ref().ok_or(LayerError::NotLoaded)?;
        let node = resolve_web_mercator(&state.index, pointer, zoom, self.config.pick_options());
        self.metrics.inc(Counter::Resolves);
        Ok(node)
    }

    /// Panorama deep link for a dataset index.
    pub fn deep_link(&self, index: usize) -> Result<Option<String>, LayerError> {
        let state = self.state()?;
        Ok(state.dataset.get(index).and_then(street_view_url))
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn state(&self) -> Result<&Loaded, LayerError> {
        self.loaded.as_ref().ok_or(LayerError::NotLoaded)
    }
}

impl Layer for PointLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    fn is_ready(&self) -> bool {
        self.is_loaded()
    }
}

#[cfg(test)]
mod tests {
    use super::{LayerError, PointLayer};
    use crate::config::PointLayerConfig;
    use crate::layer::{Layer, LayerId};
    use foundation::bounds::{LatLng, LatLngBounds};
    use formats::Payload;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use runtime::Gauge;
    use scene::{FilterChain, FilterPredicate, Point};

    fn seeded(config: PointLayerConfig) -> PointLayer {
        PointLayer::new(
            LayerId(1),
            PointLayerConfig {
                shuffle_seed: Some(3),
                ..config
            },
        )
    }

    fn scenario_points() -> Vec<Point> {
        vec![
            Point::new(10.0, 20.0).with_attr("country", "X"),
            Point::new(10.001, 20.001).with_attr("country", "Y"),
        ]
    }

    #[test]
    fn unloaded_layer_refuses_work() {
        let mut layer = seeded(PointLayerConfig::default());
        assert!(!layer.is_ready());
        assert_eq!(layer.dataset().err(), Some(LayerError::NotLoaded));
        assert_eq!(layer.set_filters(FilterChain::new()).err(), Some(LayerError::NotLoaded));
        assert_eq!(layer.render(&LatLngBounds::world()).err(), Some(LayerError::NotLoaded));
        assert_eq!(
            layer.resolve(LatLng::new(0.0, 0.0), 5.0).err(),
            Some(LayerError::NotLoaded)
        );
        assert_eq!(layer.reload(None, Vec::new()), Err(LayerError::NotLoaded));
        assert!(!layer.is_loaded());
    }

    #[test]
    fn filter_then_resolve_scenario() {
        let mut layer = seeded(PointLayerConfig::default());
        layer.load(Some("demo".into()), scenario_points());
        assert!(layer.is_ready());

        // Unfiltered: the exact hit is the X point.
        let node = layer
            .resolve(LatLng::new(10.0, 20.0), 12.0)
            .expect("loaded")
            .expect("candidate");
        assert_eq!(node.distance_sq, 0.0);
        assert!(node.in_range && node.on_marker);
        assert_eq!(layer.point(node.index).and_then(|p| p.text("country")), Some("X"));

        let x: FilterPredicate = "country = \"X\"".parse().expect("predicate");
        let view = layer.set_filters(FilterChain::new().with(x)).expect("loaded");
        assert_eq!(view.len(), 1);

        // Filtering to nothing leaves an empty, valid index.
        let none = FilterChain::new().with(FilterPredicate::new("country", "=", "Z"));
        assert_eq!(layer.set_filters(none).expect("loaded").len(), 0);
        assert_eq!(layer.resolve(LatLng::new(10.0, 20.0), 12.0), Ok(None));
    }

    #[test]
    fn reload_discards_filters_and_derived_state() {
        let mut layer = seeded(PointLayerConfig::default());
        layer.load(None, scenario_points());
        let chain = FilterChain::new().with(FilterPredicate::new("country", "=", "X"));
        layer.set_filters(chain).expect("loaded");
        assert_eq!(layer.view().expect("loaded").len(), 1);

        layer
            .reload(Some("next".into()), vec![Point::new(0.0, 0.0); 3])
            .expect("reload");
        assert!(layer.filters().expect("loaded").is_empty());
        assert_eq!(layer.view().expect("loaded").len(), 3);
        assert_eq!(layer.dataset().expect("loaded").name(), Some("next"));

        let m = layer.metrics();
        assert!(m.counters.contains(&("loads", 2)));
        assert!(m.gauges.contains(&("dataset_points", 3)));
    }

    #[test]
    fn render_under_cap_keeps_view_order() {
        let mut layer = seeded(PointLayerConfig::default());
        let points = (0..50).map(|i| Point::new(0.0, i as f64 - 25.0)).collect();
        layer.load(None, points);

        let bounds = LatLngBounds::new(-1.0, -10.0, 1.0, 10.0);
        let out = layer.render(&bounds).expect("loaded");
        assert_eq!(out.len(), 21);
        assert!(out.windows(2).all(|w| w[0].index < w[1].index));
        assert!(out.iter().all(|p| p.priority.is_none()));
    }

    #[test]
    fn render_over_cap_samples_only_visible_points() {
        let mut layer = seeded(PointLayerConfig {
            render_cap: 100,
            ..PointLayerConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(8);
        let mut points: Vec<Point> = (0..5_000)
            .map(|_| Point::new(rng.gen_range(0.0..5.0), rng.gen_range(0.0..5.0)))
            .collect();
        // A lone point in its own cell, inside the viewport.
        points.push(Point::new(-3.5, -3.5).with_attr("lonely", 1.0));
        layer.load(None, points);

        let bounds = LatLngBounds::new(-4.0, -4.0, 3.0, 3.0);
        let out = layer.render(&bounds).expect("loaded");
        assert!(out.len() <= 100);
        assert!(!out.is_empty());
        assert!(out.iter().all(|p| bounds.contains(LatLng::new(p.lat, p.lng))));

        let lonely = layer
            .point(out[0].index)
            .and_then(|p| p.number("lonely"));
        assert_eq!(lonely, Some(1.0));
        assert_eq!(out[0].priority, Some(1.0));

        let m = layer.metrics();
        assert!(m.counters.contains(&("sampled_renders", 1)));
        assert!(m.gauges.iter().any(|&(k, v)| k == Gauge::LastRenderPoints.name() && v == out.len() as u64));
    }

    #[test]
    fn render_wraps_across_the_antimeridian() {
        let mut layer = seeded(PointLayerConfig::default());
        layer.load(None, vec![Point::new(0.0, 179.9), Point::new(0.0, -179.9)]);
        let out = layer
            .render(&LatLngBounds::new(-10.0, 170.0, 10.0, -170.0))
            .expect("loaded");
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.lng > 170.0 && p.lng < 190.0));
    }

    #[test]
    fn deep_link_for_loaded_points() {
        let payload = Payload::from_json_str(
            r#"{"customCoordinates": [{"lat": 1, "lng": 2, "panoId": "p1", "heading": 10, "pitch": 5}]}"#,
        )
        .expect("payload");
        let mut layer = seeded(PointLayerConfig::default());
        layer.load(payload.name, payload.points);
        let url = layer.deep_link(0).expect("loaded").expect("link");
        assert!(url.contains("@1,2,3a,90y,10h,85t/"));
        assert_eq!(layer.deep_link(5), Ok(None));
    }
}
