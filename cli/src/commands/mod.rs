use clap::Parser;
use driftwatch_core::types::{PackageManager, DETECTION_ORDER};
use driftwatch_core::DriftConfig;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Check {
    #[arg(short, long, help = "Project root to analyse")]
    path: Option<PathBuf>,
    #[arg(short, long, help = "Output in JSON format")]
    json: bool,
    #[arg(short, long, help = "YAML configuration file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Analyse this package manager instead of detecting one (npm, uv, pylock, pip)")]
    package_manager: Option<PackageManager>,
    #[arg(long, help = "Skip development dependencies")]
    no_dev: bool,
    #[arg(long, help = "Walk the full release history; requires GITHUB_TOKEN")]
    full_scan: bool,
    #[arg(long, help = "Reuse identical HTTP responses within this run")]
    cache: bool,
}

impl Check {
    fn config(&self) -> anyhow::Result<DriftConfig> {
        let mut config = match &self.config {
            Some(path) => DriftConfig::load(path)?,
            None => DriftConfig::default(),
        };
        config = config.with_github_token(std::env::var("GITHUB_TOKEN").ok());
        if self.no_dev {
            config.include_development = false;
        }
        if self.full_scan {
            config.github.require_token = true;
        }
        if self.cache {
            config.cache.enabled = true;
        }
        config.validate()?;
        Ok(config)
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let path = self.path.clone().unwrap_or_else(|| PathBuf::from("."));

        if !path.exists() {
            anyhow::bail!("Path does not exist: {}", path.display());
        }

        let config = self.config()?;
        if self.full_scan && !config.github.is_authenticated() {
            anyhow::bail!("--full-scan needs a GitHub token in GITHUB_TOKEN");
        }
        let analysis = super::scan::run_analysis(&path, &config, self.package_manager).await?;

        if self.json {
            println!("{}", super::display::print_json(&analysis)?);
        } else {
            super::display::print_report(&analysis);
        }

        Ok(())
    }
}

#[derive(Parser)]
pub struct Ecosystems;

impl Ecosystems {
    pub fn run(&self) {
        println!("Supported ecosystems (detection order):");
        for manager in DETECTION_ORDER {
            let pair = if manager.manifest_file() == manager.lockfile_file() {
                manager.manifest_file().to_string()
            } else {
                format!("{} + {}", manager.manifest_file(), manager.lockfile_file())
            };
            let status = if super::scan::is_enabled(manager) {
                ""
            } else {
                " (not compiled in)"
            };
            println!(
                "  - {:<5} {:<7} {}{}",
                manager.ecosystem().to_string(),
                manager.as_str(),
                pair,
                status
            );
        }
    }
}
