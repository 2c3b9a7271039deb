use crate::core::models::{BuildReport, BundleReport};
use colored::*;
use std::time::Duration;

pub struct BuildUI;

impl BuildUI {
    pub fn show_banner(mode: &str) {
        println!(
            "\n  {} {} {}",
            "TYPACK".bright_cyan().bold(),
            env!("CARGO_PKG_VERSION").bright_white(),
            format!("({})", mode).bright_black()
        );
        println!();
    }

    /// Bundle tree with sizes looked up by bundle name
    pub fn show_completion(
        report: &BuildReport,
        out_dir: &str,
        size_of: impl Fn(&str) -> Option<usize>,
        build_time: Duration,
    ) {
        for bundle in &report.bundles {
            Self::show_bundle(bundle, out_dir, &size_of, 0);
        }

        for warning in &report.warnings {
            println!("  {} {}", "⚠".bright_yellow(), warning.yellow());
        }

        println!();
        println!(
            "  {} {} assets, built in {}",
            "✓".bright_green(),
            report.total_assets.to_string().bright_cyan().bold(),
            format!("{:.0}ms", build_time.as_secs_f64() * 1000.0).bright_white().bold()
        );
    }

    fn show_bundle(
        bundle: &BundleReport,
        out_dir: &str,
        size_of: &impl Fn(&str) -> Option<usize>,
        depth: usize,
    ) {
        let indent = "  ".repeat(depth + 1);
        let branch = if depth == 0 { "" } else { "└─ " };
        let size = size_of(&bundle.name)
            .map(format_size)
            .unwrap_or_default();

        println!(
            "{}{}{}{} {} {}",
            indent,
            branch.bright_black(),
            format!("{}/", out_dir).bright_black(),
            bundle.name.bright_cyan(),
            format!("[{}]", bundle.bundle_type).bright_magenta(),
            format!("({})", size).bright_black()
        );
        for asset in &bundle.assets {
            println!("{}   {} {}", indent, "·".bright_black(), asset);
        }
        for child in &bundle.child_bundles {
            Self::show_bundle(child, out_dir, size_of, depth + 1);
        }
    }
}

pub fn format_size(size: usize) -> String {
    let size_kb = size as f64 / 1024.0;
    if size_kb < 1.0 {
        format!("{} B", size)
    } else {
        format!("{:.2} kB", size_kb)
    }
}
