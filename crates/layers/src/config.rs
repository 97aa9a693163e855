use std::path::{Path, PathBuf};
use std::str::FromStr;

use runtime::RenderBudget;
use scene::grid::DEFAULT_CELL_SIZE_DEG;
use scene::picking::PickOptions;
use serde::{Deserialize, Serialize};

pub const ENV_RENDER_CAP: &str = "SVMAP_RENDER_CAP";
pub const ENV_CELL_SIZE: &str = "SVMAP_CELL_SIZE";
pub const ENV_MARKER_SIZE: &str = "SVMAP_MARKER_SIZE";
pub const ENV_REFERENCE_ZOOM: &str = "SVMAP_REFERENCE_ZOOM";
pub const ENV_RANGE_THRESHOLD: &str = "SVMAP_RANGE_THRESHOLD";
pub const ENV_SEED: &str = "SVMAP_SEED";

/// Tuning for a `PointLayer`. Every field has a default, so a config file
/// only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointLayerConfig {
    /// Maximum points handed to the rasterizer per render pass.
    pub render_cap: usize,
    pub cell_size_deg: f64,
    pub marker_size_px: f64,
    pub reference_zoom: f64,
    /// Squared-degree distance for a pointer to count as in range.
    pub range_threshold: f64,
    /// Fixed seed for the load shuffle and sampling; entropy when unset.
    pub shuffle_seed: Option<u64>,
}

impl Default for PointLayerConfig {
    fn default() -> Self {
        let pick = PickOptions::default();
        Self {
            render_cap: RenderBudget::DEFAULT_CAP,
            cell_size_deg: DEFAULT_CELL_SIZE_DEG,
            marker_size_px: pick.marker_size_px,
            reference_zoom: pick.reference_zoom,
            range_threshold: pick.range_threshold,
            shuffle_seed: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json(serde_json::Error),
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Json(e) => write!(f, "config parse error: {e}"),
            ConfigError::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl PointLayerConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).map_err(ConfigError::Json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&text)
    }

    /// Apply `SVMAP_*` environment overrides. Unparseable values are ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_overrides_from(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            render_cap: env_or(&lookup, ENV_RENDER_CAP, self.render_cap),
            cell_size_deg: env_or(&lookup, ENV_CELL_SIZE, self.cell_size_deg),
            marker_size_px: env_or(&lookup, ENV_MARKER_SIZE, self.marker_size_px),
            reference_zoom: env_or(&lookup, ENV_REFERENCE_ZOOM, self.reference_zoom),
            range_threshold: env_or(&lookup, ENV_RANGE_THRESHOLD, self.range_threshold),
            shuffle_seed: lookup(ENV_SEED)
                .and_then(|v| v.trim().parse().ok())
                .or(self.shuffle_seed),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cell_size_deg.is_finite() && self.cell_size_deg > 0.0) {
            return Err(ConfigError::Invalid {
                field: "cell_size_deg",
                reason: format!("must be a positive number, got {}", self.cell_size_deg),
            });
        }
        for (field, v) in [
            ("marker_size_px", self.marker_size_px),
            ("reference_zoom", self.reference_zoom),
            ("range_threshold", self.range_threshold),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be a non-negative number, got {v}"),
                });
            }
        }
        Ok(())
    }

    pub fn pick_options(&self) -> PickOptions {
        PickOptions {
            range_threshold: self.range_threshold,
            marker_size_px: self.marker_size_px,
            reference_zoom: self.reference_zoom,
        }
    }

    pub fn budget(&self) -> RenderBudget {
        RenderBudget::new(self.render_cap)
    }
}

fn env_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ENV_CELL_SIZE, ENV_RENDER_CAP, ENV_SEED, PointLayerConfig};
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_the_map_view() {
        let c = PointLayerConfig::default();
        assert_eq!(c.render_cap, 30_000);
        assert_eq!(c.cell_size_deg, 1.0);
        assert_eq!(c.marker_size_px, 6.0);
        assert_eq!(c.reference_zoom, 9.0);
        assert_eq!(c.range_threshold, 0.1);
        assert_eq!(c.shuffle_seed, None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = PointLayerConfig::from_json_str(r#"{"render_cap": 500, "shuffle_seed": 7}"#)
            .expect("config");
        assert_eq!(
            c,
            PointLayerConfig {
                render_cap: 500,
                shuffle_seed: Some(7),
                ..PointLayerConfig::default()
            }
        );
    }

    #[test]
    fn rejects_bad_values() {
        let err = PointLayerConfig::from_json_str(r#"{"cell_size_deg": 0}"#).expect_err("zero");
        assert!(matches!(err, ConfigError::Invalid { field: "cell_size_deg", .. }));
        let err = PointLayerConfig::from_json_str(r#"{"range_threshold": -1}"#).expect_err("neg");
        assert!(matches!(err, ConfigError::Invalid { field: "range_threshold", .. }));
        assert!(matches!(
            PointLayerConfig::from_json_str("[]"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn env_overrides_win_and_bad_values_are_ignored() {
        let lookup = |key: &str| match key {
            k if k == ENV_RENDER_CAP => Some(" 1200 ".to_string()),
            k if k == ENV_CELL_SIZE => Some("wide".to_string()),
            k if k == ENV_SEED => Some("42".to_string()),
            _ => None,
        };
        let c = PointLayerConfig::default().with_overrides_from(lookup);
        assert_eq!(c.render_cap, 1200);
        assert_eq!(c.cell_size_deg, 1.0);
        assert_eq!(c.shuffle_seed, Some(42));
    }

    #[test]
    fn derives_pick_options_and_budget() {
        let c = PointLayerConfig {
            marker_size_px: 4.0,
            render_cap: 10,
            ..PointLayerConfig::default()
        };
        assert_eq!(c.pick_options().marker_size_px, 4.0);
        assert_eq!(c.budget().cap(), 10);
    }
}
