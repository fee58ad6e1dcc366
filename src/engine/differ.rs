//! Diff computation and display

use colored::Colorize;
use serde::Serialize;

use crate::resource::{Resource, ResourceDiff, ResourceState};

/// A resource whose current state could not be read
#[derive(Debug, Clone, Serialize)]
pub struct DiffError {
    pub resource_id: String,
    pub error: String,
}

/// Compute diffs for all resources, collecting read failures separately
pub fn compute_diffs(resources: &[Box<dyn Resource>]) -> (Vec<ResourceDiff>, Vec<DiffError>) {
    let mut diffs = Vec::new();
    let mut errors = Vec::new();

    for resource in resources {
        match ResourceDiff::from_resource(resource.as_ref()) {
            Ok(Some(diff)) => diffs.push(diff),
            Ok(None) => log::debug!("{} is in sync", resource.id()),
            Err(e) => errors.push(DiffError {
                resource_id: resource.id(),
                error: format!("{e:#}"),
            }),
        }
    }

    (diffs, errors)
}

/// Display a list of diffs in a user-friendly format
pub fn display_diff(diffs: &[ResourceDiff], errors: &[DiffError]) {
    if diffs.is_empty() && errors.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Authorized Keys Diff".bold()
    );
    println!("│");

    for diff in diffs {
        let symbol = match (&diff.current, &diff.desired) {
            (ResourceState::Absent, ResourceState::Present { .. }) => "+".green(),
            (ResourceState::Present { .. }, ResourceState::Absent) => "-".red(),
            (ResourceState::Modified { .. }, _) | (_, ResourceState::Modified { .. }) => {
                "~".yellow()
            }
            _ => "?".dimmed(),
        };

        let root_indicator = if diff.requires_root {
            " [root]".red().to_string()
        } else {
            String::new()
        };

        let state_desc = match (&diff.current, &diff.desired) {
            (ResourceState::Absent, ResourceState::Present { details }) => format!(
                "(not authorized){}",
                details
                    .as_ref()
                    .map(|d| format!(" → {d}"))
                    .unwrap_or_default()
            ),
            (ResourceState::Modified { from, to }, _) => format!("{from} → {to}"),
            (ResourceState::Present { details }, ResourceState::Absent) => format!(
                "(will revoke{})",
                details
                    .as_ref()
                    .map(|d| format!(", {d}"))
                    .unwrap_or_default()
            ),
            _ => String::new(),
        };

        println!(
            "│   {} {:<30} {}{}",
            symbol,
            diff.resource_id,
            state_desc.dimmed(),
            root_indicator
        );
    }

    for error in errors {
        println!(
            "│   {} {:<30} {}",
            "!".red().bold(),
            error.resource_id,
            error.error.red()
        );
    }
    println!("│");

    let root_count = diffs.iter().filter(|d| d.requires_root).count();
    let regular_count = diffs.len() - root_count;

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} unprivileged, {} require root)",
        diffs.len().to_string().bold(),
        regular_count.to_string().green(),
        root_count.to_string().red()
    );
    if !errors.is_empty() {
        println!(
            "│          {} key(s) could not be inspected",
            errors.len().to_string().red()
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}

/// Display the privilege boundary warning
pub fn display_privilege_boundary(privileged_diffs: &[ResourceDiff], is_root: bool) {
    if privileged_diffs.is_empty() {
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Privilege Boundary".yellow().bold()
    );
    println!("│");
    println!(
        "│  {}  The following {} change(s) write files of other accounts:",
        "⚠".yellow(),
        privileged_diffs.len()
    );
    println!("│");

    for diff in privileged_diffs.iter().take(10) {
        println!("│  • {}", diff.description);
    }

    if privileged_diffs.len() > 10 {
        println!("│  • ... and {} more", privileged_diffs.len() - 10);
    }

    println!("│");
    if is_root {
        println!("│  Each file is written as its owner.");
    } else {
        println!("│  Not running as root: these will be skipped.");
    }
    println!("│");
    println!("└─────────────────────────────────────────────────────────────┘");
}
