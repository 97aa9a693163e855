use std::fs;
use std::path::{Path, PathBuf};

use scene::{AttrValue, Dataset, Point};
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Field of the root object holding the point records.
pub const COORDINATES_FIELD: &str = "customCoordinates";

/// A validated point payload, ready to be loaded into an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub name: Option<String>,
    pub points: Vec<Point>,
    content_hash: String,
}

#[derive(Debug)]
pub enum PayloadError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json(serde_json::Error),
    UnexpectedRoot,
    MissingCoordinates,
    InvalidRecord {
        index: usize,
        reason: String,
    },
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            PayloadError::Json(e) => write!(f, "JSON parse error: {e}"),
            PayloadError::UnexpectedRoot => {
                write!(f, "expected an object or an array of points")
            }
            PayloadError::MissingCoordinates => {
                write!(f, "object has no `{COORDINATES_FIELD}` array")
            }
            PayloadError::InvalidRecord { index, reason } => {
                write!(f, "invalid point at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for PayloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PayloadError::Io { source, .. } => Some(source),
            PayloadError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl Payload {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PayloadError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| PayloadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_bytes(&bytes)
    }

    pub fn from_json_str(payload: &str) -> Result<Self, PayloadError> {
        Self::from_json_bytes(payload.as_bytes())
    }

    /// Parse and validate a payload. Nothing is returned unless every record
    /// is well formed.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(bytes).map_err(PayloadError::Json)?;
        let (name, records) = match value {
            Value::Array(records) => (None, records),
            Value::Object(mut obj) => {
                let name = match obj.remove("name") {
                    Some(Value::String(s)) => Some(s),
                    _ => None,
                };
                match obj.remove(COORDINATES_FIELD) {
                    Some(Value::Array(records)) => (name, records),
                    _ => return Err(PayloadError::MissingCoordinates),
                }
            }
            _ => return Err(PayloadError::UnexpectedRoot),
        };

        let points = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| point_from_record(index, record))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            points,
            content_hash: content_hash(bytes),
        })
    }

    /// blake3 hex digest of the raw payload bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Payload name, else the stem of the file it came from.
    pub fn display_name(&self, source: Option<&Path>) -> Option<String> {
        self.name.clone().or_else(|| {
            source
                .and_then(Path::file_stem)
                .map(|s| s.to_string_lossy().into_owned())
        })
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn point_from_record(index: usize, record: Value) -> Result<Point, PayloadError> {
    let Value::Object(obj) = record else {
        return Err(PayloadError::InvalidRecord {
            index,
            reason: "point must be an object".to_string(),
        });
    };

    let lat = coordinate(&obj, "lat").map_err(|reason| PayloadError::InvalidRecord { index, reason })?;
    let lng = coordinate(&obj, "lng").map_err(|reason| PayloadError::InvalidRecord { index, reason })?;

    let mut point = Point::new(lat, lng);
    for (key, value) in obj {
        if key == "lat" || key == "lng" {
            continue;
        }
        let attr = match value {
            Value::Null => AttrValue::Null,
            Value::Number(n) => match n.as_f64() {
                Some(v) => AttrValue::Number(v),
                None => continue,
            },
            Value::String(s) => AttrValue::Text(s),
            Value::Bool(b) => AttrValue::Text(b.to_string()),
            // Nested structures (links, extra, tags) are not filterable.
            Value::Array(_) | Value::Object(_) => continue,
        };
        point.attrs.insert(key, attr);
    }
    Ok(point)
}

fn coordinate(obj: &Map<String, Value>, key: &str) -> Result<f64, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(format!("missing {key}")),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("{key} out of range")),
        Some(_) => Err(format!("{key} must be a number")),
    }
}

/// JSON form of a point, the shape it was read from.
pub fn point_to_json(point: &Point) -> Value {
    let mut obj = Map::new();
    obj.insert("lat".to_string(), number(point.lat));
    obj.insert("lng".to_string(), number(point.lng));
    for (key, value) in &point.attrs {
        let v = match value {
            AttrValue::Number(n) => number(*n),
            AttrValue::Text(s) => Value::String(s.clone()),
            AttrValue::Null => Value::Null,
        };
        obj.insert(key.clone(), v);
    }
    Value::Object(obj)
}

fn number(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

/// Payload document for a subset of points.
pub fn payload_json<'a>(name: Option<&str>, points: impl IntoIterator<Item = &'a Point>) -> Value {
    let mut obj = Map::new();
    if let Some(name) = name {
        obj.insert("name".to_string(), Value::String(name.to_string()));
    }
    obj.insert(
        COORDINATES_FIELD.to_string(),
        Value::Array(points.into_iter().map(point_to_json).collect()),
    );
    Value::Object(obj)
}

/// Summary of a loaded dataset.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PayloadSummary {
    pub name: Option<String>,
    pub points: usize,
    pub schema: Vec<String>,
    /// `[south, west, north, east]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[f64; 4]>,
    pub content_hash: String,
}

impl PayloadSummary {
    pub fn new(dataset: &Dataset, content_hash: impl Into<String>) -> Self {
        Self {
            name: dataset.name().map(str::to_string),
            points: dataset.len(),
            schema: dataset.schema().to_vec(),
            bounds: dataset.bounds().map(|b| [b.south, b.west, b.north, b.east]),
            content_hash: content_hash.into(),
        }
    }
}
