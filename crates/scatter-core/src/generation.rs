use crate::error::{Error, Result};
use rusqlite::types::Value;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// One logical run of the tool. `end_time` stays empty while the run is open
/// or when it was interrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub id: i64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub command: String,
}

impl Generation {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Which records a [`GenerationRange`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludeRule {
    /// Records alive at some point inside the range.
    #[default]
    Alive,
    /// Records born or retired inside the range.
    Changed,
}

/// Half-open span of generation ids, either end open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerationRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub rule: IncludeRule,
}

impl GenerationRange {
    pub const ALL: GenerationRange = GenerationRange {
        start: None,
        end: None,
        rule: IncludeRule::Alive,
    };

    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self {
            start,
            end,
            rule: IncludeRule::Alive,
        }
    }

    /// Records touched by exactly one generation.
    pub fn changed_in(generation: i64) -> Self {
        Self::new(Some(generation), Some(generation + 1)).with_rule(IncludeRule::Changed)
    }

    pub fn with_rule(mut self, rule: IncludeRule) -> Self {
        self.rule = rule;
        self
    }

    /// Parse `A:B`, `A:`, `:B`, `:`, `A` or the empty string. Negative bounds
    /// stay unresolved; see [`GenerationRange::parse_within`].
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_impl(text, None)
    }

    /// Parse and resolve against the store's known span: negative bounds
    /// count back from the span's end, and the result is clipped to the span.
    pub fn parse_within(text: &str, span: &GenerationRange) -> Result<Self> {
        Self::parse_impl(text, Some(span))
    }

    fn parse_impl(text: &str, span: Option<&GenerationRange>) -> Result<Self> {
        let text = text.trim().replace('^', "-");

        let (mut start, mut end, single) = if text.is_empty() {
            (None, None, false)
        } else if let Some((a, b)) = text.split_once(':') {
            (parse_bound(a, &text)?, parse_bound(b, &text)?, false)
        } else {
            let n = parse_bound(&text, &text)?;
            (n, n.map(|n| n + 1), true)
        };

        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err(Error::InvalidRange(format!("{}:{}", s, e)));
            }
        }

        let Some(span) = span else {
            return Ok(Self::new(start, end));
        };

        let span_end = span.end.unwrap_or(0);
        let resolve = |n: i64| if n < 0 { span_end + n } else { n };
        if single {
            start = start.map(resolve);
            end = start.map(|s| s + 1);
        } else {
            start = start.map(resolve);
            end = end.map(resolve);
        }

        let mut range = Self::new(start, end);
        range.clip_to(span);
        Ok(range)
    }

    /// Intersect with `bound`; open ends take the bound's value.
    pub fn clip_to(&mut self, bound: &GenerationRange) {
        self.start = match (self.start, bound.start) {
            (Some(s), Some(b)) => Some(s.max(b)),
            (s, b) => s.or(b),
        };
        self.end = match (self.end, bound.end) {
            (Some(e), Some(b)) => Some(e.min(b)),
            (e, b) => e.or(b),
        };
    }

    pub fn contains(&self, generation: i64) -> bool {
        self.start.map_or(true, |s| generation >= s) && self.end.map_or(true, |e| generation < e)
    }

    /// The generation ids covered, when both ends are known.
    pub fn ids(&self) -> Option<Range<i64>> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some(s..e.max(s)),
            _ => None,
        }
    }

    /// SQL condition over the `birth`/`death` columns of the `f` alias.
    pub(crate) fn sql_condition(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let condition = match self.rule {
            IncludeRule::Alive => {
                let mut parts = Vec::new();
                if let Some(start) = self.start {
                    parts.push("(f.death IS NULL OR f.death >= ?)".to_string());
                    params.push(Value::Integer(start));
                }
                if let Some(end) = self.end {
                    parts.push("f.birth < ?".to_string());
                    params.push(Value::Integer(end));
                }
                if parts.is_empty() {
                    "1".to_string()
                } else {
                    parts.join(" AND ")
                }
            }
            IncludeRule::Changed => {
                if self.start.is_none() && self.end.is_none() {
                    return ("1".to_string(), params);
                }
                let mut birth = Vec::new();
                let mut death = vec!["f.death IS NOT NULL".to_string()];
                if let Some(start) = self.start {
                    birth.push("f.birth >= ?".to_string());
                    params.push(Value::Integer(start));
                }
                if let Some(end) = self.end {
                    birth.push("f.birth < ?".to_string());
                    params.push(Value::Integer(end));
                }
                if let Some(start) = self.start {
                    death.push("f.death >= ?".to_string());
                    params.push(Value::Integer(start));
                }
                if let Some(end) = self.end {
                    death.push("f.death < ?".to_string());
                    params.push(Value::Integer(end));
                }
                format!("(({}) OR ({}))", birth.join(" AND "), death.join(" AND "))
            }
        };
        (condition, params)
    }
}

impl FromStr for GenerationRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for GenerationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{}", start)?;
        }
        f.write_str(":")?;
        if let Some(end) = self.end {
            write!(f, "{}", end)?;
        }
        Ok(())
    }
}

fn parse_bound(part: &str, text: &str) -> Result<Option<i64>> {
    if part.is_empty() {
        return Ok(None);
    }
    let digits = part.strip_prefix('-').unwrap_or(part);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidRange(format!("invalid generation string: {}", text)));
    }
    part.parse::<i64>()
        .map(Some)
        .map_err(|e| Error::InvalidRange(format!("{}: {}", text, e)))
}

/// Current wall clock in ns since the epoch.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
