use crate::requirement::normalize_name;
use driftwatch_core::error::LockfileParsingError;
use driftwatch_core::lockfile;
use driftwatch_core::plugin::{EcosystemMatch, ParsedDependencies, Parser};
use driftwatch_core::types::{Dependency, DependencyCategory, PackageManager};
use regex::Regex;
use std::sync::OnceLock;

fn pin_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-zA-Z0-9._\-\[\]]+)==([^\s;]+)").expect("valid regex"))
}

fn extras_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[.*\]").expect("valid regex"))
}

/// Editable installs, pip options, VCS and URL requirements carry no registry pin.
fn is_unpinnable(line: &str) -> bool {
    line.starts_with('-')
        || line.contains("://")
        || line.contains(" @ ")
        || ["git+", "hg+", "svn+", "bzr+"].iter().any(|vcs| line.starts_with(vcs))
}

/// Joins `\` continuations and drops comments.
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for raw in content.lines() {
        let line = match raw.find(" #") {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        if line.trim_start().starts_with('#') {
            continue;
        }
        match line.trim_end().strip_suffix('\\') {
            Some(head) => current.push_str(head),
            None => {
                current.push_str(line);
                lines.push(current.trim().to_string());
                current.clear();
            }
        }
    }
    if !current.trim().is_empty() {
        lines.push(current.trim().to_string());
    }
    lines
}

pub fn parse_requirements(content: &str) -> Vec<Dependency> {
    let mut dependencies: Vec<Dependency> = Vec::new();
    for line in logical_lines(content) {
        if line.is_empty() || is_unpinnable(&line) {
            continue;
        }
        let Some(captures) = pin_pattern().captures(&line) else {
            tracing::debug!(line = %line, "skipping unpinned requirement");
            continue;
        };
        let version = &captures[2];
        if version.starts_with('=') {
            // arbitrary equality (`===`) is not a PEP 440 version
            continue;
        }

        let name = normalize_name(&extras_pattern().replace_all(&captures[1], ""));
        if dependencies.iter().any(|d| d.name == name) {
            tracing::warn!(package = %name, "duplicate pin in requirements.txt, keeping the first");
            continue;
        }
        dependencies.push(
            Dependency::new(name, version)
                .with_range(Some(format!("=={}", version)))
                .with_category(DependencyCategory::Runtime),
        );
    }
    dependencies
}

pub struct RequirementsParser;

impl RequirementsParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RequirementsParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for RequirementsParser {
    fn package_manager(&self) -> PackageManager {
        PackageManager::PipRequirements
    }

    fn parse(&self, found: &EcosystemMatch) -> Result<ParsedDependencies, LockfileParsingError> {
        let content = lockfile::read_file(&found.lockfile)?;
        Ok(ParsedDependencies {
            project_name: found
                .root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            production: parse_requirements(&content),
            development: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exact_pins_are_kept() {
        let content = r#"
# production pins
Django==4.2.11
requests[security]==2.31.0 ; python_version >= "3.8"
Flask_Login==0.6.3  # auth
numpy>=1.26
-e ./local-lib
--index-url https://pypi.example.org/simple
git+https://github.com/acme/tool.git#egg=tool
tool @ https://files.example.org/tool-1.0.tar.gz
legacy===1.0-custom
"#;
        let deps = parse_requirements(content);
        let pins: Vec<(&str, &str)> = deps
            .iter()
            .map(|d| (d.name.as_str(), d.installed_version.as_str()))
            .collect();
        assert_eq!(
            pins,
            vec![("django", "4.2.11"), ("requests", "2.31.0"), ("flask-login", "0.6.3")]
        );
        assert_eq!(deps[0].declared_range.as_deref(), Some("==4.2.11"));
        assert!(deps.iter().all(|d| d.is_production()));
    }

    #[test]
    fn test_continuations_and_hashes() {
        let content = "urllib3==2.2.1 \\\n    --hash=sha256:abc \\\n    --hash=sha256:def\nidna==3.6\n";
        let deps = parse_requirements(content);
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name, "urllib3");
        assert_eq!(deps[0].installed_version, "2.2.1");
    }

    #[test]
    fn test_duplicate_pins_keep_first() {
        let deps = parse_requirements("six==1.16.0\nSix==1.15.0\n");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].installed_version, "1.16.0");
    }
}
