//! PEP 508 requirement strings, PEP 503 names and lockfile upload times.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

fn separator_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-_.]+").expect("valid regex"))
}

fn requirement_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?:\[[^\]]*\])?\s*(.*)$")
            .expect("valid regex")
    })
}

/// PEP 503: case-insensitive, runs of `-`, `_` and `.` collapse to a single `-`.
pub fn normalize_name(name: &str) -> String {
    separator_run()
        .replace_all(name.trim(), "-")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Normalized per PEP 503.
    pub name: String,
    pub specifier: Option<String>,
}

impl Requirement {
    /// Extras and environment markers are dropped.
    pub fn parse(spec: &str) -> Option<Self> {
        let without_marker = spec.split(';').next().unwrap_or(spec);
        let captures = requirement_pattern().captures(without_marker)?;
        let name = normalize_name(captures.get(1)?.as_str());

        let rest = captures.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        let rest = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest)
            .trim();

        Some(Self {
            name,
            specifier: (!rest.is_empty()).then(|| rest.to_string()),
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // offset-less timestamps are recorded in UTC
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// TOML lockfiles store `upload-time` either as a native datetime or a string.
pub fn upload_time(value: &toml::Value) -> Option<DateTime<Utc>> {
    match value {
        toml::Value::Datetime(dt) => parse_timestamp(&dt.to_string()),
        toml::Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Earliest `upload-time` across a package's sdist and wheels.
pub fn earliest_upload_time<'a>(
    artifacts: impl IntoIterator<Item = &'a toml::Value>,
) -> Option<DateTime<Utc>> {
    artifacts
        .into_iter()
        .filter_map(|artifact| artifact.get("upload-time"))
        .filter_map(upload_time)
        .min()
}
