//! Lockfile schema dispatch.
//!
//! Adapters extract a handful of header fields, then walk an ordered table of
//! `(condition, parser)` pairs. The first matching condition wins; a lockfile
//! no condition accepts is rejected with `UnsupportedSchema`.

use crate::error::LockfileParsingError;
use crate::plugin::ParsedDependencies;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Int(i64),
    Str(String),
}

impl std::fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderValue::Int(n) => write!(f, "{}", n),
            HeaderValue::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockfileHeader {
    fields: BTreeMap<&'static str, HeaderValue>,
}

impl LockfileHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_int(mut self, key: &'static str, value: Option<i64>) -> Self {
        if let Some(value) = value {
            self.fields.insert(key, HeaderValue::Int(value));
        }
        self
    }

    pub fn with_str(mut self, key: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.fields.insert(key, HeaderValue::Str(value.to_string()));
        }
        self
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.fields.get(key) {
            Some(HeaderValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(HeaderValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for LockfileHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.fields.is_empty() {
            return f.write_str("no schema fields");
        }
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{} = {}", k, v))
            .collect();
        f.write_str(&fields.join(", "))
    }
}

pub struct SchemaRule<D> {
    /// Human-readable form of `matches`, used in logs.
    pub condition: &'static str,
    pub matches: fn(&LockfileHeader) -> bool,
    pub parse: fn(&D) -> Result<ParsedDependencies, LockfileParsingError>,
}

pub fn select_rule<'a, D>(
    rules: &'a [SchemaRule<D>],
    header: &LockfileHeader,
    path: &Path,
) -> Result<&'a SchemaRule<D>, LockfileParsingError> {
    let rule = rules
        .iter()
        .find(|rule| (rule.matches)(header))
        .ok_or_else(|| LockfileParsingError::UnsupportedSchema {
            path: path.to_path_buf(),
            header: header.to_string(),
        })?;
    tracing::debug!(path = %path.display(), condition = rule.condition, "selected lockfile schema");
    Ok(rule)
}

/// Runs the first matching rule against `document`.
pub fn dispatch<D>(
    rules: &[SchemaRule<D>],
    header: &LockfileHeader,
    path: &Path,
    document: &D,
) -> Result<ParsedDependencies, LockfileParsingError> {
    let rule = select_rule(rules, header, path)?;
    (rule.parse)(document)
}

pub fn read_file(path: &Path) -> Result<String, LockfileParsingError> {
    std::fs::read_to_string(path).map_err(|source| LockfileParsingError::Read {
        path: path.to_path_buf(),
        source,
    })
}
