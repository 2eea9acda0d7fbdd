use anyhow::Result;
use driftwatch_core::types::{Ecosystem, PackageManager};
use driftwatch_core::{
    AnalysisRequest, DriftConfig, HttpClient, PluginRegistry, ProjectAnalysis, Reconciler,
    ResponseCache,
};
use std::path::Path;

#[cfg(feature = "npm")]
use driftwatch_plugin_npm::NpmPlugin;
#[cfg(feature = "pypi")]
use driftwatch_plugin_pypi::PyPiPlugin;

pub fn is_enabled(manager: PackageManager) -> bool {
    match manager.ecosystem() {
        Ecosystem::Npm => cfg!(feature = "npm"),
        Ecosystem::PyPI => cfg!(feature = "pypi"),
    }
}

fn build_plugins(config: &DriftConfig, http: &HttpClient) -> PluginRegistry {
    let mut registry = PluginRegistry::new();

    #[cfg(feature = "npm")]
    {
        registry.register_plugin(
            NpmPlugin::new(http.clone()).with_registry_url(config.registries.npm_url.as_str()),
        );
    }

    #[cfg(feature = "pypi")]
    {
        registry.register_plugin(
            PyPiPlugin::new(http.clone()).with_registry_url(config.registries.pypi_url.as_str()),
        );
    }

    registry
}

pub async fn run_analysis(
    path: &Path,
    config: &DriftConfig,
    package_manager: Option<PackageManager>,
) -> Result<ProjectAnalysis> {
    let mut http = HttpClient::new(&config.http)?;
    if config.cache.enabled {
        http = http.with_cache(ResponseCache::new());
    }

    let reconciler = Reconciler::from_config(build_plugins(config, &http), config, &http);

    let token = reconciler.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling analysis");
            token.cancel();
        }
    });

    let request = AnalysisRequest::new(path).with_package_manager(package_manager);
    let result = reconciler.analyze(request).await;
    interrupt.abort();

    Ok(result?)
}
