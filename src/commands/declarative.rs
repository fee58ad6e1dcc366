//! Declarative commands for keysync
//!
//! - `status` - Show which configured keys are in sync
//! - `diff` - Preview what apply would change
//! - `apply` - Make every target file match the config

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use crate::Context;
use crate::config::{self, KeysConfig};
use crate::engine::differ::{DiffError, compute_diffs, display_diff};
use crate::engine::{self, ExecuteOptions, ExecutionPlan};
use crate::paths;
use crate::resource::{AuthorizedKey, ResourceDiff};
use crate::ui;

// ============================================================================
// Plan Building
// ============================================================================

fn load_config(ctx: &Context) -> Result<(PathBuf, KeysConfig)> {
    let path = paths::config_file(ctx.config.as_deref())?;
    log::debug!("Loading keys from {}", path.display());
    let config = KeysConfig::load(&path)?;
    Ok((path, config))
}

/// Build the plan for every configured key matching `target`
fn build_plan(config: &KeysConfig, target: Option<&str>) -> Result<ExecutionPlan> {
    let mut plan = ExecutionPlan::new();
    for entry in &config.keys {
        let resource = AuthorizedKey::from_entry(entry, config::account_home)?;
        plan.add_resource(Box::new(resource));
    }

    let plan = plan.filter_by_target(target);
    if let Some(t) = target
        && plan.is_empty()
    {
        bail!("No configured key matches '{t}'");
    }
    Ok(plan)
}

// ============================================================================
// Status Command
// ============================================================================

#[derive(Debug, Serialize)]
struct StatusReport {
    config: PathBuf,
    in_sync: Vec<String>,
    drift: Vec<ResourceDiff>,
    errors: Vec<DiffError>,
}

pub fn status(ctx: &Context, target: Option<&str>, json: bool) -> Result<()> {
    let (path, config) = load_config(ctx)?;
    let plan = build_plan(&config, target)?;

    let mut report = StatusReport {
        config: path,
        in_sync: Vec::new(),
        drift: Vec::new(),
        errors: Vec::new(),
    };
    for batch in [&plan.unprivileged, &plan.privileged] {
        let (diffs, errors) = compute_diffs(batch);
        for resource in batch {
            let id = resource.id();
            if !diffs.iter().any(|d| d.resource_id == id)
                && !errors.iter().any(|e| e.resource_id == id)
            {
                report.in_sync.push(id);
            }
        }
        report.drift.extend(diffs);
        report.errors.extend(errors);
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize status")?
        );
    } else {
        show_status(ctx, &report);
    }

    if !report.errors.is_empty() {
        bail!("{} key(s) could not be inspected", report.errors.len());
    }
    Ok(())
}

fn show_status(ctx: &Context, report: &StatusReport) {
    ui::header("Keysync Status");
    if !ctx.quiet {
        ui::kv("Config", &report.config.display().to_string());
    }

    ui::section("Authorized Keys");

    for id in &report.in_sync {
        println!("  {} {}", "✓".green(), id.bold());
    }

    for diff in &report.drift {
        println!("  {} {}", "⚠".yellow(), diff.resource_id.bold());
        if !ctx.quiet {
            ui::dim(&format!("    {}", diff.description));
            if diff.requires_root {
                ui::dim("    Requires root");
            }
        }
    }

    for error in &report.errors {
        println!(
            "  {} {} - {}",
            "✗".red(),
            error.resource_id.bold(),
            error.error.dimmed()
        );
    }

    println!();
    if report.drift.is_empty() && report.errors.is_empty() {
        ui::success(&format!("{} key(s) in sync", report.in_sync.len()));
    } else {
        ui::info(&format!(
            "{} in sync, {} drifted, {} unreadable",
            report.in_sync.len(),
            report.drift.len(),
            report.errors.len()
        ));
    }
}

// ============================================================================
// Diff Command
// ============================================================================

pub fn diff(ctx: &Context, target: Option<&str>) -> Result<()> {
    let (_, config) = load_config(ctx)?;
    let plan = build_plan(&config, target)?;

    let (mut diffs, mut errors) = compute_diffs(&plan.unprivileged);
    let (privileged_diffs, privileged_errors) = compute_diffs(&plan.privileged);
    diffs.extend(privileged_diffs);
    errors.extend(privileged_errors);

    display_diff(&diffs, &errors);

    if !errors.is_empty() {
        bail!("{} key(s) could not be inspected", errors.len());
    }
    Ok(())
}

// ============================================================================
// Apply Command
// ============================================================================

pub fn apply(ctx: &Context, target: Option<&str>, dry_run: bool, yes: bool) -> Result<()> {
    ui::header("Applying Authorized Keys");

    if dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let (_, config) = load_config(ctx)?;
    let plan = build_plan(&config, target)?;

    if !ctx.quiet {
        println!();
        println!(
            "  {} keys to reconcile ({} as yourself, {} as other accounts)",
            plan.total_resources().to_string().bold(),
            plan.unprivileged.len().to_string().green(),
            plan.privileged.len().to_string().yellow()
        );
    }

    let opts = ExecuteOptions {
        dry_run,
        yes,
        verbose: ctx.verbose > 0,
    };

    let summary = engine::execute(plan, opts)?;

    if !summary.is_success() {
        bail!("{} key(s) failed to apply", summary.failed);
    }

    Ok(())
}
