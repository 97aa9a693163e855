use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::dataset::Dataset;
use crate::point::{AttrValue, Point, parse_number};
use crate::selection::SelectionSet;

/// Attributes holding calendar dates as text (`YYYY-MM` or a full date).
pub const DATE_ATTRIBUTES: [&str; 1] = ["imageDate"];

/// Attribute holding capture time as epoch seconds.
pub const TIMESTAMP_ATTRIBUTE: &str = "timestamp";

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl FilterOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" | "==" => Some(FilterOp::Eq),
            "!=" => Some(FilterOp::Ne),
            ">" => Some(FilterOp::Gt),
            "<" => Some(FilterOp::Lt),
            ">=" => Some(FilterOp::Ge),
            "<=" => Some(FilterOp::Le),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Ge => ">=",
            FilterOp::Le => "<=",
        }
    }

    /// Numeric comparison; any NaN operand compares false for every operator.
    fn compare_f64(self, a: f64, b: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        match self {
            FilterOp::Eq => a == b,
            FilterOp::Ne => a != b,
            FilterOp::Gt => a > b,
            FilterOp::Lt => a < b,
            FilterOp::Ge => a >= b,
            FilterOp::Le => a <= b,
        }
    }

    fn compare_ord<T: Ord>(self, a: T, b: T) -> bool {
        match self {
            FilterOp::Eq => a == b,
            FilterOp::Ne => a != b,
            FilterOp::Gt => a > b,
            FilterOp::Lt => a < b,
            FilterOp::Ge => a >= b,
            FilterOp::Le => a <= b,
        }
    }
}

/// One attribute comparison.
///
/// `op` is `None` when the operator symbol was not recognised; such a
/// predicate passes every point.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub attribute: String,
    pub op: Option<FilterOp>,
    pub value: String,
}

impl FilterPredicate {
    pub fn new(attribute: impl Into<String>, op: &str, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            op: FilterOp::from_symbol(op),
            value: value.into(),
        }
    }

    /// An empty attribute or value makes the predicate a no-op.
    pub fn is_noop(&self) -> bool {
        self.attribute.is_empty() || self.value.trim().is_empty() || self.op.is_none()
    }

    pub fn matches(&self, point: &Point) -> bool {
        CompiledPredicate::compile(self).matches(point)
    }
}

impl std::fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = self.op.map(FilterOp::symbol).unwrap_or("?");
        write!(f, "{} {op} {}", self.attribute, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterParseError {
    MissingOperator(String),
    UnknownOperator(String),
}

impl std::fmt::Display for FilterParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterParseError::MissingOperator(s) => {
                write!(f, "expected `<attribute> <operator> <value>`, got {s:?}")
            }
            FilterParseError::UnknownOperator(op) => write!(f, "unknown operator {op:?}"),
        }
    }
}

impl std::error::Error for FilterParseError {}

impl std::str::FromStr for FilterPredicate {
    type Err = FilterParseError;

    /// Parses `<attribute> <operator> <value>`; the value is the rest of the
    /// line and may be wrapped in double quotes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((attribute, rest)) = s.split_once(char::is_whitespace) else {
            return Err(FilterParseError::MissingOperator(s.to_string()));
        };
        let rest = rest.trim_start();
        let (op, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if FilterOp::from_symbol(op).is_none() {
            return Err(FilterParseError::UnknownOperator(op.to_string()));
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Ok(FilterPredicate::new(attribute, op, value))
    }
}

/// Ordered conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    predicates: Vec<FilterPredicate>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: FilterPredicate) {
        self.predicates.push(predicate);
    }

    pub fn with(mut self, predicate: FilterPredicate) -> Self {
        self.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[FilterPredicate] {
        &self.predicates
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl FromIterator<FilterPredicate> for FilterChain {
    fn from_iter<I: IntoIterator<Item = FilterPredicate>>(iter: I) -> Self {
        Self {
            predicates: iter.into_iter().collect(),
        }
    }
}

/// Subset of a dataset that passes a filter chain.
///
/// Ordering contract:
/// - `indices` yields dataset indices in ascending order, i.e. the subset
///   keeps dataset order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredView {
    selection: SelectionSet,
}

impl FilteredView {
    /// Every point of a dataset with `len` points.
    pub fn all(len: usize) -> Self {
        Self {
            selection: SelectionSet::full(len),
        }
    }

    pub fn len(&self) -> usize {
        self.selection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selection.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.selection.contains(index)
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.selection.iter()
    }

    pub fn points<'a>(
        &'a self,
        dataset: &'a Dataset,
    ) -> impl Iterator<Item = (usize, &'a Point)> + 'a {
        self.indices()
            .filter_map(move |i| dataset.get(i).map(|p| (i, p)))
    }
}

/// Evaluate `chain` against every point of `dataset`.
pub fn apply_filters(dataset: &Dataset, chain: &FilterChain) -> FilteredView {
    let mut selection = SelectionSet::full(dataset.len());
    let points = dataset.points();

    for predicate in chain.predicates() {
        if predicate.is_noop() {
            continue;
        }
        let compiled = CompiledPredicate::compile(predicate);
        selection.retain(|i| compiled.matches(&points[i]));
        if selection.is_empty() {
            break;
        }
    }

    FilteredView { selection }
}

/// A predicate with its filter value parsed once for the whole pass.
#[derive(Debug, Clone)]
struct CompiledPredicate<'a> {
    attribute: &'a str,
    test: Test,
}

#[derive(Debug, Clone)]
enum Test {
    Pass,
    Calendar(FilterOp, NaiveDateTime),
    TimeOfDay(FilterOp, f64),
    /// Epoch seconds; `None` when the filter value was not a usable instant.
    Instant(FilterOp, Option<f64>),
    Numeric(FilterOp, f64),
    /// Lower-cased filter text.
    Text(FilterOp, String),
}

impl<'a> CompiledPredicate<'a> {
    fn compile(predicate: &'a FilterPredicate) -> Self {
        let attribute = predicate.attribute.as_str();
        let value = predicate.value.trim();
        let test = match predicate.op {
            Some(op) if !attribute.is_empty() && !value.is_empty() => {
                compile_test(attribute, op, value)
            }
            _ => Test::Pass,
        };
        Self { attribute, test }
    }

    fn matches(&self, point: &Point) -> bool {
        if let Test::Pass = self.test {
            return true;
        }
        let Some(actual) = point.attr(self.attribute).filter(|v| !v.is_null()) else {
            return false;
        };

        match &self.test {
            Test::Pass => true,
            Test::Calendar(op, expected) => actual
                .as_text()
                .and_then(parse_calendar)
                .is_some_and(|d| op.compare_ord(d, *expected)),
            Test::TimeOfDay(op, expected) => actual
                .coerce_number()
                .is_some_and(|ts| op.compare_f64(time_of_day(ts), *expected)),
            Test::Instant(op, expected) => match expected {
                Some(expected) => actual
                    .coerce_number()
                    .is_some_and(|ts| op.compare_f64(ts, *expected)),
                None => false,
            },
            Test::Numeric(op, expected) => actual
                .coerce_number()
                .is_some_and(|v| op.compare_f64(v, *expected)),
            Test::Text(op, expected) => match op {
                FilterOp::Eq => text_eq(actual, expected),
                FilterOp::Ne => !text_eq(actual, expected),
                _ => false,
            },
        }
    }
}

fn compile_test(attribute: &str, op: FilterOp, value: &str) -> Test {
    if DATE_ATTRIBUTES.contains(&attribute)
        && let Some(date) = parse_calendar(value)
    {
        return Test::Calendar(op, date);
    }

    if attribute == TIMESTAMP_ATTRIBUTE {
        if let Some(secs) = parse_time_of_day(value) {
            return Test::TimeOfDay(op, secs);
        }
        let instant = parse_calendar(value)
            .map(|d| d.and_utc().timestamp() as f64)
            .or_else(|| parse_number(value));
        return Test::Instant(op, instant);
    }

    match parse_number(value) {
        Some(n) => Test::Numeric(op, n),
        None => Test::Text(op, value.to_lowercase()),
    }
}

fn text_eq(actual: &AttrValue, expected_lower: &str) -> bool {
    match actual {
        AttrValue::Text(s) => s.trim().to_lowercase() == expected_lower,
        AttrValue::Number(n) => n.to_string() == expected_lower,
        AttrValue::Null => false,
    }
}

/// Seconds since midnight (UTC) of an epoch timestamp.
fn time_of_day(epoch_secs: f64) -> f64 {
    epoch_secs.rem_euclid(SECONDS_PER_DAY).floor()
}

/// Parses `H:MM` or `H:MM:SS` into seconds since midnight.
pub fn parse_time_of_day(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }
    let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    let hours = parts[0];
    if !all_digits(hours) || hours.len() > 2 {
        return None;
    }
    if parts[1..].iter().any(|p| p.len() != 2 || !all_digits(p)) {
        return None;
    }

    let h: f64 = hours.parse().ok()?;
    let m: f64 = parts[1].parse().ok()?;
    let sec: f64 = match parts.get(2) {
        Some(p) => p.parse().ok()?,
        None => 0.0,
    };
    Some(h * 3600.0 + m * 60.0 + sec)
}

/// Parses `YYYY-MM` (day 1) or a full date / date-time into a naive UTC
/// date-time.
pub fn parse_calendar(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if is_year_month(s) {
        let year: i32 = s[..4].parse().ok()?;
        let month: u32 = s[5..].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0);
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.naive_utc())
}

fn is_year_month(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 7
        && b[4] == b'-'
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[5..].iter().all(u8::is_ascii_digit)
}
