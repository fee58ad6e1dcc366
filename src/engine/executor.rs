//! Execution engine - applies a plan with confirmation and privilege batching
//!
//! Resources are applied one at a time: effective ids are process-wide, so
//! two owners can never be assumed concurrently.

use anyhow::Result;
use authkeys::PrivilegeContext;
use colored::Colorize;

use crate::resource::{ApplyContext, ApplyResult, Resource};
use crate::ui;

use super::differ::{compute_diffs, display_diff, display_privilege_boundary};
use super::planner::ExecutionPlan;

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Verbose output
    pub verbose: bool,
}

/// Summary of execution results
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// The privilege context used for real runs
#[cfg(unix)]
fn system_privilege() -> &'static dyn PrivilegeContext {
    &authkeys::SwitchUser
}

#[cfg(not(unix))]
fn system_privilege() -> &'static dyn PrivilegeContext {
    &authkeys::CurrentUser
}

#[cfg(unix)]
fn running_as_root() -> bool {
    authkeys::is_root()
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}

/// Execute the plan, prompting unless `--yes`
pub fn execute(plan: ExecutionPlan, opts: ExecuteOptions) -> Result<ExecuteSummary> {
    execute_with(
        plan,
        opts,
        system_privilege(),
        running_as_root(),
        confirm_proceed,
    )
}

/// Execute the plan with an explicit privilege context and confirmation hook
pub fn execute_with<C>(
    plan: ExecutionPlan,
    opts: ExecuteOptions,
    privilege: &dyn PrivilegeContext,
    is_root: bool,
    mut confirm: C,
) -> Result<ExecuteSummary>
where
    C: FnMut() -> Result<bool>,
{
    // 1. Compute diffs for all resources
    let (unprivileged_diffs, unprivileged_errors) = compute_diffs(&plan.unprivileged);
    let (privileged_diffs, privileged_errors) = compute_diffs(&plan.privileged);

    let all_diffs: Vec<_> = unprivileged_diffs
        .iter()
        .chain(privileged_diffs.iter())
        .cloned()
        .collect();
    let all_errors: Vec<_> = unprivileged_errors
        .into_iter()
        .chain(privileged_errors)
        .collect();

    // 2. Display what will change
    display_diff(&all_diffs, &all_errors);

    if all_diffs.is_empty() {
        return Ok(ExecuteSummary {
            failed: all_errors.len(),
            ..Default::default()
        });
    }

    if opts.dry_run {
        display_privilege_boundary(&privileged_diffs, is_root);
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(ExecuteSummary {
            skipped: all_diffs.len(),
            failed: all_errors.len(),
            ..Default::default()
        });
    }

    // 3. Confirm (unless --yes)
    if !opts.yes && !confirm()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: all_diffs.len(),
            ..Default::default()
        });
    }

    let mut summary = ExecuteSummary::default();

    // 4. Keys owned by the invoking account
    if !plan.unprivileged.is_empty() {
        println!();
        println!(
            "  {} Applying {} key(s)...",
            "→".cyan(),
            plan.unprivileged.len()
        );
        apply_batch(&plan.unprivileged, opts.verbose, privilege, &mut summary);
    }

    // 5. Keys written as other accounts
    if plan.has_privileged() {
        display_privilege_boundary(&privileged_diffs, is_root);

        if is_root {
            println!();
            println!(
                "  {} Applying {} key(s) as their owners...",
                "→".cyan(),
                plan.privileged.len()
            );
            apply_batch(&plan.privileged, opts.verbose, privilege, &mut summary);
        } else {
            for resource in &plan.privileged {
                let id = resource.id();
                let result = if privileged_diffs.iter().any(|d| d.resource_id == id) {
                    ApplyResult::Skipped {
                        reason: "requires root".to_string(),
                    }
                } else {
                    ApplyResult::NoChange
                };
                report_result(resource.as_ref(), &result);
                summary.add_result(&result);
            }
        }
    }

    // 6. Summary
    print_summary(&summary);

    Ok(summary)
}

/// Apply resources in order
fn apply_batch(
    resources: &[Box<dyn Resource>],
    verbose: bool,
    privilege: &dyn PrivilegeContext,
    summary: &mut ExecuteSummary,
) {
    for resource in resources {
        let result = apply_resource(resource.as_ref(), verbose, privilege);
        report_result(resource.as_ref(), &result);
        summary.add_result(&result);
    }
}

/// Apply a single resource
fn apply_resource(
    resource: &dyn Resource,
    verbose: bool,
    privilege: &dyn PrivilegeContext,
) -> ApplyResult {
    let mut ctx = ApplyContext {
        dry_run: false,
        verbose,
        privilege,
    };

    match resource.apply(&mut ctx) {
        Ok(result) => result,
        Err(e) => ApplyResult::Failed {
            error: format!("{e:#}"),
        },
    }
}

fn report_result(resource: &dyn Resource, result: &ApplyResult) {
    match result {
        ApplyResult::NoChange => ui::dim(&format!("○ {}", resource.id())),
        ApplyResult::Created => println!("    {} {} created", "✓".green(), resource.id()),
        ApplyResult::Modified => println!("    {} {} updated", "✓".green(), resource.id()),
        ApplyResult::Removed => println!("    {} {} revoked", "✓".green(), resource.id()),
        ApplyResult::Failed { error } => {
            println!("    {} {}: {}", "✗".red(), resource.id(), error.red());
        }
        ApplyResult::Skipped { reason } => {
            println!("    {} {} ({})", "⊘".yellow(), resource.id(), reason.dimmed());
        }
    }
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() && summary.total_changes() == 0 {
        println!("  {} Nothing was changed", "ℹ".blue());
    } else if summary.is_success() {
        println!("  {} Keys reconciled successfully!", "✓".green().bold());
    } else {
        println!("  {} Keys reconciled with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} key(s) authorized", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} key(s) updated", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} key(s) revoked", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} key(s) skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "key(s)".red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{PrivilegeRequirement, ResourceState};
    use authkeys::CurrentUser;
    use std::cell::Cell;

    #[derive(Debug)]
    struct TestResource {
        id: String,
        should_change: bool,
        root: bool,
        applied: Cell<bool>,
    }

    impl TestResource {
        fn boxed(id: &str, should_change: bool, root: bool) -> Box<dyn Resource> {
            Box::new(Self {
                id: id.to_string(),
                should_change,
                root,
                applied: Cell::new(false),
            })
        }
    }

    impl Resource for TestResource {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn description(&self) -> String {
            format!("Test resource {}", self.id)
        }

        fn resource_type(&self) -> &'static str {
            "test"
        }

        fn privilege_requirement(&self) -> PrivilegeRequirement {
            if self.root {
                PrivilegeRequirement::Root {
                    reason: "test".into(),
                }
            } else {
                PrivilegeRequirement::None
            }
        }

        fn current_state(&self) -> anyhow::Result<ResourceState> {
            if self.should_change && !self.applied.get() {
                Ok(ResourceState::Absent)
            } else {
                Ok(ResourceState::Present { details: None })
            }
        }

        fn desired_state(&self) -> ResourceState {
            ResourceState::Present { details: None }
        }

        fn apply(&self, ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
            if ctx.dry_run {
                return Ok(ApplyResult::Skipped {
                    reason: "Dry run".into(),
                });
            }
            if self.should_change && !self.applied.replace(true) {
                Ok(ApplyResult::Created)
            } else {
                Ok(ApplyResult::NoChange)
            }
        }
    }

    fn yes() -> Result<bool> {
        Ok(true)
    }

    fn run(plan: ExecutionPlan, opts: ExecuteOptions, is_root: bool) -> ExecuteSummary {
        execute_with(plan, opts, &CurrentUser, is_root, yes).unwrap()
    }

    #[test]
    fn test_execute_empty_plan() {
        let summary = run(ExecutionPlan::new(), ExecuteOptions::default(), false);
        assert_eq!(summary, ExecuteSummary::default());
    }

    #[test]
    fn test_execute_no_changes() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(TestResource::boxed("key:a", false, false));

        let summary = run(plan, ExecuteOptions::default(), false);
        assert_eq!(summary.total_changes(), 0);
    }

    #[test]
    fn test_execute_with_changes() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(TestResource::boxed("key:a", true, false));
        plan.add_resource(TestResource::boxed("key:b", false, false));

        let summary = run(plan, ExecuteOptions::default(), false);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.no_change, 1);
        assert!(summary.is_success());
    }

    #[test]
    fn test_privileged_skipped_without_root() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(TestResource::boxed("key:mine", true, false));
        plan.add_resource(TestResource::boxed("key:theirs", true, true));

        let summary = run(plan, ExecuteOptions::default(), false);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_privileged_applied_as_root() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(TestResource::boxed("key:theirs", true, true));

        let summary = run(plan, ExecuteOptions::default(), true);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(TestResource::boxed("key:a", true, false));

        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = run(plan, opts, false);
        assert_eq!(summary.total_changes(), 0);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_declined_confirmation_aborts() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(TestResource::boxed("key:a", true, false));

        let summary =
            execute_with(plan, ExecuteOptions::default(), &CurrentUser, false, || Ok(false))
                .unwrap();
        assert_eq!(summary.total_changes(), 0);
        assert_eq!(summary.skipped, 1);
    }
}
