//! Shared plumbing for the `svmap` binary.

use std::path::{Path, PathBuf};

use formats::{Payload, Tooltip};
use foundation::{LatLng, LatLngBounds};
use layers::{LayerId, PointLayer, PointLayerConfig};
use scene::{FilterChain, FilterPredicate};
use serde::Serialize;
use streaming::{Progress, TaggerLine};
use tracing::{debug, info, warn};

/// Config values given on the command line. They win over the file and the
/// environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub render_cap: Option<usize>,
    pub seed: Option<u64>,
}

/// File, then `SVMAP_*` environment, then command-line flags.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<PointLayerConfig, String> {
    let base = match path {
        Some(p) => PointLayerConfig::from_json_file(p).map_err(|e| e.to_string())?,
        None => PointLayerConfig::default(),
    };
    let mut config = base.with_env_overrides();
    if let Some(cap) = overrides.render_cap {
        config.render_cap = cap;
    }
    if let Some(seed) = overrides.seed {
        config.shuffle_seed = Some(seed);
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Parse `S,W,N,E` in degrees.
pub fn parse_bounds(s: &str) -> Result<LatLngBounds, String> {
    let parts: Vec<_> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!("bounds must be south,west,north,east, got {s:?}"));
    }
    let mut v = [0.0f64; 4];
    for (slot, part) in v.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("invalid bounds component {part:?}"))?;
    }
    let [south, west, north, east] = v;
    if south > north {
        return Err(format!("south ({south}) is above north ({north})"));
    }
    Ok(LatLngBounds::new(south, west, north, east))
}

pub fn parse_filters(exprs: &[String]) -> Result<FilterChain, String> {
    exprs
        .iter()
        .map(|e| {
            e.parse::<FilterPredicate>()
                .map_err(|err| format!("filter {e:?}: {err}"))
        })
        .collect()
}

/// A layer loaded from a payload file.
#[derive(Debug)]
pub struct OpenLayer {
    pub layer: PointLayer,
    pub content_hash: String,
}

pub fn open_layer(path: &Path, config: PointLayerConfig) -> Result<OpenLayer, String> {
    let payload = Payload::from_json_file(path).map_err(|e| e.to_string())?;
    let name = payload.display_name(Some(path));
    let content_hash = payload.content_hash().to_string();
    let mut layer = PointLayer::new(LayerId(0), config);
    layer.load(name, payload.points);
    Ok(OpenLayer {
        layer,
        content_hash,
    })
}

/// Replace the layer's dataset with the payload at `path`.
pub fn reload_layer(open: &mut OpenLayer, path: &Path) -> Result<(), String> {
    let payload = Payload::from_json_file(path).map_err(|e| e.to_string())?;
    let name = payload.display_name(Some(path));
    open.content_hash = payload.content_hash().to_string();
    open.layer
        .reload(name, payload.points)
        .map_err(|e| e.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestReport {
    pub index: usize,
    pub lat: f64,
    pub lng: f64,
    pub distance_sq: f64,
    pub pixel_distance: f64,
    pub in_range: bool,
    pub on_marker: bool,
    pub tooltip: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Resolve `pointer` and collect what a hover would show.
pub fn nearest_report(
    layer: &mut PointLayer,
    pointer: LatLng,
    zoom: f64,
) -> Result<Option<NearestReport>, String> {
    let Some(node) = layer.resolve(pointer, zoom).map_err(|e| e.to_string())? else {
        return Ok(None);
    };
    let Some(point) = layer.point(node.index) else {
        return Ok(None);
    };
    let tooltip = Tooltip::for_point(point);
    let link = layer.deep_link(node.index).map_err(|e| e.to_string())?;
    Ok(Some(NearestReport {
        index: node.index,
        lat: node.coord.lat,
        lng: node.coord.lng,
        distance_sq: node.distance_sq,
        pixel_distance: node.pixel_distance,
        in_range: node.in_range,
        on_marker: node.on_marker,
        tooltip: tooltip.headline.into_iter().chain(tooltip.lines).collect(),
        link,
    }))
}

/// Folds tagger output into a final outcome.
///
/// The first error wins; a later `Saved to` does not clear it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSession {
    pub last_progress: Option<Progress>,
    pub saved: Option<PathBuf>,
    pub failure: Option<String>,
}

impl TagSession {
    pub fn observe(&mut self, line: TaggerLine) {
        match line {
            TaggerLine::Progress(p) => {
                let changed = self
                    .last_progress
                    .as_ref()
                    .is_none_or(|prev| prev.percent != p.percent || prev.description != p.description);
                if changed {
                    info!(
                        percent = p.percent,
                        description = p.description.as_deref().unwrap_or(""),
                        done = p.done,
                        total = p.total,
                        "tagging"
                    );
                }
                self.last_progress = Some(p);
            }
            TaggerLine::Error { message } => {
                warn!(%message, "tagger reported an error");
                self.failure.get_or_insert(message);
            }
            TaggerLine::Saved { path } => {
                info!(path = %path.display(), "tagger saved payload");
                self.saved = Some(path);
            }
            TaggerLine::Other { text } => debug!(%text, "tagger"),
        }
    }

    /// Path of the tagged payload, or why there is none.
    pub fn finish(self, exited_ok: bool) -> Result<PathBuf, String> {
        if let Some(message) = self.failure {
            return Err(format!("tagger failed: {message}"));
        }
        if !exited_ok {
            return Err("tagger exited unsuccessfully".to_string());
        }
        self.saved
            .ok_or_else(|| "tagger finished without saving a payload".to_string())
    }
}
