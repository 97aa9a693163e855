use chrono::DateTime;
use scene::{AttrValue, Point};

use crate::attr_label::format_attr;

/// Keys that are either shown in the headline or not worth showing.
pub const REDUNDANT_TOOLTIP_KEYS: [&str; 11] = [
    "lat",
    "lng",
    "latitude",
    "longitude",
    "links",
    "panoId",
    "country",
    "state",
    "locality",
    "countryCode",
    "stateCode",
];

const ARROWS: [char; 8] = ['↑', '↗', '→', '↘', '↓', '↙', '←', '↖'];

/// Nearest of the eight compass arrows to a heading in degrees.
pub fn octodirectional_arrow(angle_deg: f64) -> char {
    let norm = angle_deg.rem_euclid(360.0);
    ARROWS[(norm / 45.0).round() as usize % 8]
}

/// Hover text for a point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tooltip {
    /// `locality, state, country`, skipping missing parts.
    pub headline: Option<String>,
    pub lines: Vec<String>,
}

impl Tooltip {
    pub fn for_point(point: &Point) -> Self {
        let place: Vec<&str> = ["locality", "state", "country"]
            .iter()
            .filter_map(|k| point.attr(k))
            .map(|v| match v {
                AttrValue::Text(s) => s.as_str(),
                _ => "",
            })
            .filter(|s| !s.is_empty())
            .collect();
        let headline = (!place.is_empty()).then(|| place.join(", "));

        let has_timestamp = point.number("timestamp").is_some_and(|t| t != 0.0);
        let mut lines = Vec::new();
        for (key, value) in &point.attrs {
            if value.is_null() || REDUNDANT_TOOLTIP_KEYS.contains(&key.as_str()) {
                continue;
            }
            if key == "imageDate" && has_timestamp {
                continue;
            }
            let label = format_attr(key);
            let line = match (key.as_str(), value.as_number()) {
                ("elevation", Some(v)) => format!("{label}: {v:.2}m"),
                ("heading" | "drivingDirection", Some(v)) => {
                    format!("{label}: {v:.2}° {}", octodirectional_arrow(v))
                }
                ("pitch", Some(v)) => format!("{label}: {v:.2}°"),
                ("timestamp", Some(v)) => match format_timestamp(v) {
                    Some(when) => format!("{label}: {when}"),
                    None => format!("{label}: {value}"),
                },
                _ => format!("{label}: {value}"),
            };
            lines.push(line);
        }

        Self { headline, lines }
    }

    pub fn is_empty(&self) -> bool {
        self.headline.is_none() && self.lines.is_empty()
    }
}

impl std::fmt::Display for Tooltip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for line in self.headline.iter().chain(self.lines.iter()) {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{line}")?;
            first = false;
        }
        Ok(())
    }
}

/// `Jun 8, 2019, 01:20:00 PM UTC` for epoch seconds.
pub fn format_timestamp(epoch_secs: f64) -> Option<String> {
    if !epoch_secs.is_finite() {
        return None;
    }
    let when = DateTime::from_timestamp(epoch_secs.floor() as i64, 0)?;
    Some(when.format("%b %-d, %Y, %I:%M:%S %p UTC").to_string())
}

#[cfg(test)]
mod tests {
    use super::{Tooltip, format_timestamp, octodirectional_arrow};
    use pretty_assertions::assert_eq;
    use scene::Point;

    #[test]
    fn arrows_snap_to_nearest_octant() {
        assert_eq!(octodirectional_arrow(0.0), '↑');
        assert_eq!(octodirectional_arrow(22.4), '↑');
        assert_eq!(octodirectional_arrow(22.5), '↗');
        assert_eq!(octodirectional_arrow(90.0), '→');
        assert_eq!(octodirectional_arrow(350.0), '↑');
        assert_eq!(octodirectional_arrow(-90.0), '←');
        assert_eq!(octodirectional_arrow(405.0), '↗');
    }

    #[test]
    fn formats_epoch_seconds_in_utc() {
        assert_eq!(
            format_timestamp(1_560_000_000.0).as_deref(),
            Some("Jun 8, 2019, 01:20:00 PM UTC")
        );
        assert_eq!(format_timestamp(f64::NAN), None);
    }

    #[test]
    fn composes_headline_and_typed_lines() {
        let p = Point::new(48.85, 2.29)
            .with_attr("country", "France")
            .with_attr("locality", "Paris")
            .with_attr("countryCode", "FR")
            .with_attr("panoId", "abc")
            .with_attr("elevation", 35.456)
            .with_attr("heading", 90.0)
            .with_attr("pitch", -2.5)
            .with_attr("imageDate", "2019-06")
            .with_attr("timestamp", 1_560_000_000.0)
            .with_attr("camera_gen", "gen4");

        let t = Tooltip::for_point(&p);
        assert_eq!(t.headline.as_deref(), Some("Paris, France"));
        assert_eq!(
            t.lines,
            vec![
                "Camera gen: gen4".to_string(),
                "Elevation: 35.46m".to_string(),
                "Heading: 90.00° →".to_string(),
                "Pitch: -2.50°".to_string(),
                "Timestamp: Jun 8, 2019, 01:20:00 PM UTC".to_string(),
            ]
        );
        assert!(t.to_string().starts_with("Paris, France\nCamera gen: gen4\n"));
    }

    #[test]
    fn image_date_shows_without_timestamp() {
        let p = Point::new(0.0, 0.0).with_attr("imageDate", "2019-06");
        let t = Tooltip::for_point(&p);
        assert_eq!(t.headline, None);
        assert_eq!(t.lines, vec!["Image date: 2019-06".to_string()]);
    }

    #[test]
    fn bare_point_has_empty_tooltip() {
        let t = Tooltip::for_point(&Point::new(1.0, 2.0).with_attr("panoId", "x"));
        assert!(t.is_empty());
        assert_eq!(t.to_string(), "");
    }
}
