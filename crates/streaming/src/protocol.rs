//! Line protocol spoken by the external metadata tagger.
//!
//! The tagger reports on stdout and stderr with free-form text lines:
//! - progress bars such as `Tagging country:  45%|####  | 450/1000 [...]`
//! - `Saved to <path>` once the tagged payload has been written
//! - `...Error: <message>` / `...Exception: <message>` on failure
//!
//! Progress bars redraw with `\r`, so a single read can hold several updates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Prefix of the completion line.
pub const SAVED_PREFIX: &str = "Saved to ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub percent: u32,
    /// Text before the first `:` of the line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl Progress {
    /// `done / total`, when both counts are present and `total > 0`.
    pub fn fraction(&self) -> Option<f64> {
        match (self.done, self.total) {
            (Some(done), Some(total)) if total > 0 => Some(done as f64 / total as f64),
            _ => None,
        }
    }
}

/// One classified line of tagger output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaggerLine {
    Progress(Progress),
    Error { message: String },
    Saved { path: PathBuf },
    Other { text: String },
}

impl TaggerLine {
    /// Classify a single line. Progress wins over error text, which wins over
    /// the completion marker.
    pub fn parse(line: &str) -> Self {
        if let Some(percent) = number_before(line, '%') {
            return TaggerLine::Progress(Progress {
                percent: u32::try_from(percent).unwrap_or(u32::MAX),
                description: line.split_once(':').map(|(d, _)| d.trim().to_string()),
                done: number_before(line, '/'),
                total: number_after(line, '/'),
            });
        }

        if let Some(message) = error_message(line) {
            return TaggerLine::Error { message };
        }

        if let Some(rest) = line.strip_prefix(SAVED_PREFIX) {
            return TaggerLine::Saved {
                path: PathBuf::from(rest.trim()),
            };
        }

        TaggerLine::Other {
            text: line.to_string(),
        }
    }

    /// Split a raw output chunk at `\n` and `\r` and classify each non-blank
    /// piece in order.
    pub fn parse_chunk(chunk: &str) -> Vec<TaggerLine> {
        chunk
            .split(['\n', '\r'])
            .filter(|l| !l.trim().is_empty())
            .map(TaggerLine::parse)
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaggerLine::Error { .. } | TaggerLine::Saved { .. })
    }
}

/// First run of ASCII digits immediately followed by `marker`.
fn number_before(line: &str, marker: char) -> Option<u64> {
    let bytes = line.as_bytes();
    let mut start = None;
    for (i, &b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            start.get_or_insert(i);
            continue;
        }
        if let Some(s) = start.take()
            && b as char == marker
        {
            return line[s..i].parse().ok();
        }
    }
    None
}

/// First run of ASCII digits immediately preceded by `marker`.
fn number_after(line: &str, marker: char) -> Option<u64> {
    let mut rest = line;
    while let Some(pos) = rest.find(marker) {
        rest = &rest[pos + marker.len_utf8()..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            return rest[..digits].parse().ok();
        }
    }
    None
}

fn error_message(line: &str) -> Option<String> {
    ["Error:", "Exception:"]
        .iter()
        .filter_map(|tag| line.find(tag).map(|pos| (pos, tag.len())))
        .min_by_key(|(pos, _)| *pos)
        .map(|(pos, len)| line[pos + len..].trim().to_string())
        .filter(|m| !m.is_empty())
}

/// Invocation of the tagger's `tag` subcommand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRequest {
    pub program: String,
    pub script: PathBuf,
    pub file: PathBuf,
    #[serde(default)]
    pub options: Vec<String>,
}

impl TagRequest {
    pub const DEFAULT_PROGRAM: &'static str = "python";
    pub const DEFAULT_SCRIPT: &'static str = "metatag.py";

    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            program: Self::DEFAULT_PROGRAM.to_string(),
            script: PathBuf::from(Self::DEFAULT_SCRIPT),
            file: file.into(),
            options: Vec::new(),
        }
    }

    /// Arguments after the program: `script tag file options...`.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.options.len() + 3);
        args.push(self.script.to_string_lossy().into_owned());
        args.push("tag".to_string());
        args.push(self.file.to_string_lossy().into_owned());
        args.extend(self.options.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::{Progress, TagRequest, TaggerLine};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn parses_progress_bar() {
        let line = "Tagging country:  45%|####      | 450/1000 [00:10<00:12, 40.00it/s]";
        assert_eq!(
            TaggerLine::parse(line),
            TaggerLine::Progress(Progress {
                percent: 45,
                description: Some("Tagging country".to_string()),
                done: Some(450),
                total: Some(1000),
            })
        );
    }

    #[test]
    fn progress_without_counts_has_no_fraction() {
        let TaggerLine::Progress(p) = TaggerLine::parse("100%") else {
            panic!("expected progress");
        };
        assert_eq!(p.percent, 100);
        assert_eq!(p.description, None);
        assert_eq!(p.fraction(), None);

        let TaggerLine::Progress(p) = TaggerLine::parse("x: 50% 5/10") else {
            panic!("expected progress");
        };
        assert_eq!(p.fraction(), Some(0.5));
    }

    #[test]
    fn parses_errors_and_completion() {
        assert_eq!(
            TaggerLine::parse("Traceback ValueError: bad file"),
            TaggerLine::Error {
                message: "bad file".to_string()
            }
        );
        assert_eq!(
            TaggerLine::parse("requests.Exception:  timeout "),
            TaggerLine::Error {
                message: "timeout".to_string()
            }
        );
        assert_eq!(
            TaggerLine::parse("Saved to out/tagged.json  "),
            TaggerLine::Saved {
                path: PathBuf::from("out/tagged.json")
            }
        );
        assert_eq!(
            TaggerLine::parse("Loading cache"),
            TaggerLine::Other {
                text: "Loading cache".to_string()
            }
        );
    }

    #[test]
    fn chunk_splits_carriage_return_redraws() {
        let chunk = "a: 10%| 1/10\ra: 20%| 2/10\r\nSaved to x.json\n";
        let lines = TaggerLine::parse_chunk(chunk);
        assert_eq!(lines.len(), 3);
        assert!(matches!(&lines[1], TaggerLine::Progress(p) if p.percent == 20));
        assert!(lines[2].is_terminal());
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(TaggerLine::Saved {
            path: PathBuf::from("a.json"),
        })
        .expect("json");
        assert_eq!(json, serde_json::json!({"type": "saved", "path": "a.json"}));
    }

    #[test]
    fn tag_request_argv() {
        let mut req = TagRequest::new("data/locs.json");
        req.options = vec!["-a".into(), "--elevation".into()];
        assert_eq!(req.program, "python");
        assert_eq!(
            req.args(),
            vec!["metatag.py", "tag", "data/locs.json", "-a", "--elevation"]
        );
    }
}
