use colored::{ColoredString, Colorize};
use driftwatch_core::types::{Coverage, DriftCategory, DriftVerdict, PartialReason};
use driftwatch_core::ProjectAnalysis;

fn category_label(category: DriftCategory) -> ColoredString {
    let label = format!("{:<7}", category.as_str());
    match category {
        DriftCategory::Major => label.red().bold(),
        DriftCategory::Minor => label.yellow(),
        DriftCategory::Patch => label.cyan(),
        DriftCategory::Latest => label.green(),
        DriftCategory::Unknown => label.dimmed(),
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn print_verdict(verdict: &DriftVerdict) {
    let installed = verdict
        .installed
        .as_ref()
        .map(|v| v.raw.clone())
        .unwrap_or_else(|| verdict.dependency.installed_version.clone());
    let latest = or_dash(verdict.latest.as_ref().map(|v| v.raw.clone()));
    let marker = if verdict.is_partial() { "*" } else { " " };

    println!(
        "  {} {}{:<32} {:>12} -> {:<12} distance {:>4}  lag {:>6}",
        category_label(verdict.category),
        marker.yellow(),
        verdict.name(),
        installed,
        latest,
        or_dash(verdict.release_distance),
        or_dash(verdict.time_lag_days.map(|d| format!("{}d", d))),
    );

    if !verdict.advisories.is_empty() {
        let ids: Vec<&str> = verdict.advisories.iter().map(String::as_str).collect();
        println!("      {} {}", "advisories:".red(), ids.join(", "));
    }
    if let Some(history) = &verdict.source_history {
        let coverage = match history.coverage {
            Coverage::Complete => "complete",
            Coverage::Partial(PartialReason::PageCeiling) => "partial, page ceiling reached",
            Coverage::Partial(PartialReason::Unauthenticated) => "partial, unauthenticated",
            Coverage::Partial(PartialReason::RateLimited) => "partial, rate limited",
        };
        println!(
            "      history: {} ({} pages, {})",
            history.repository, history.pages_fetched, coverage
        );
    }
    for warning in &verdict.warnings {
        println!("      {} {}", "!".yellow(), warning);
    }
}

fn print_section(title: &str, verdicts: &[DriftVerdict]) {
    if verdicts.is_empty() {
        return;
    }
    println!("{} ({}):", title.bold(), verdicts.len());
    for verdict in verdicts {
        print_verdict(verdict);
    }
    println!();
}

pub fn print_report(analysis: &ProjectAnalysis) {
    let summary = &analysis.summary;

    println!("\n{}", "=".repeat(60));
    println!("Driftwatch Report");
    println!("{}", "=".repeat(60));
    println!("Project: {}", analysis.project.name);
    println!("Path: {}", analysis.project.root.display());
    println!(
        "Package manager: {} ({})",
        analysis.project.package_manager, analysis.project.ecosystem
    );
    println!("Duration: {}ms", analysis.elapsed_ms);
    println!();

    println!("Summary:");
    println!("  Dependencies: {}", summary.dependencies);
    println!(
        "  Major: {}  Minor: {}  Patch: {}  Latest: {}  Unknown: {}",
        summary.major.to_string().red(),
        summary.minor.to_string().yellow(),
        summary.patch.to_string().cyan(),
        summary.latest.to_string().green(),
        summary.unknown
    );
    println!(
        "  Advisories: {} across {} dependencies",
        summary.advisories, summary.with_advisories
    );
    if summary.advisories_unchecked > 0 {
        println!("    Unchecked: {}", summary.advisories_unchecked);
    }
    println!();

    print_section("Production", &analysis.production);
    print_section("Development", &analysis.development);

    if summary.partial > 0 {
        println!("{} partial result (see warnings)", "*".yellow());
        println!();
    }

    if !analysis.warnings.is_empty() {
        println!("Warnings:");
        for warning in &analysis.warnings {
            println!("  - {}", warning);
        }
        println!();
    }

    if analysis.has_advisories() {
        println!("{}", "Known advisories affect installed versions!".red().bold());
    }
    if analysis.has_drift() {
        println!("{} dependencies behind their latest release", summary.outdated());
    }
}

pub fn print_json(analysis: &ProjectAnalysis) -> anyhow::Result<String> {
    Ok(analysis.to_json()?)
}
