//! Authorized key resource - one `[[key]]` across its target files

use anyhow::{Context, Result};
use authkeys::{
    AuthorizationFile, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, Ensure, ReconcileReport,
    ReconciliationRequest, Reconciler,
};
use std::path::PathBuf;

use super::{ApplyContext, ApplyResult, PrivilegeRequirement, Resource, ResourceState};
use crate::config::KeyEntry;

/// A key that must be present in (or absent from) a set of files
#[derive(Debug, Clone)]
pub struct AuthorizedKey {
    pub name: String,
    pub request: ReconciliationRequest,
    pub dir_mode: u32,
    pub file_mode: u32,
}

/// How many targets hold the key, and in what form
#[derive(Debug, Default, PartialEq, Eq)]
struct Census {
    exact: usize,
    stale: usize,
    missing: usize,
}

impl AuthorizedKey {
    pub fn new(name: impl Into<String>, request: ReconciliationRequest) -> Self {
        Self {
            name: name.into(),
            request,
            dir_mode: DEFAULT_DIR_MODE,
            file_mode: DEFAULT_FILE_MODE,
        }
    }

    /// Build from a config entry, resolving default targets with `home_of`.
    pub fn from_entry<F>(entry: &KeyEntry, home_of: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<PathBuf>,
    {
        let mut resource = Self::new(&entry.name, entry.to_request(home_of)?);
        if let Some(mode) = entry.dir_mode {
            resource.dir_mode = mode;
        }
        if let Some(mode) = entry.file_mode {
            resource.file_mode = mode;
        }
        Ok(resource)
    }

    fn target_count(&self) -> usize {
        self.request.targets.len()
    }

    /// Load every target and count exact, stale and missing entries.
    fn census(&self) -> Result<Census> {
        let mut census = Census::default();
        for path in &self.request.targets {
            let file = match AuthorizationFile::load(path) {
                Ok(file) => file,
                Err(e) if e.is_not_found() => {
                    census.missing += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if file.contains(&self.request.key) {
                census.exact += 1;
            } else if !file.find_by_content(self.request.key.content()).is_empty() {
                census.stale += 1;
            }
        }
        Ok(census)
    }

    fn log_report(&self, report: &ReconcileReport) {
        for change in &report.targets {
            log::info!(
                "{}: {} (bootstrapped: {}, removed: {}, added: {}, written: {})",
                self.name,
                change.path.display(),
                change.bootstrapped,
                change.removed,
                change.added,
                change.written
            );
        }
    }
}

impl Resource for AuthorizedKey {
    fn id(&self) -> String {
        format!("key:{}", self.name)
    }

    fn description(&self) -> String {
        match self.request.ensure {
            Ensure::Present => format!(
                "Authorize {} key '{}' in {} file(s)",
                self.request.key.key_type(),
                self.name,
                self.target_count()
            ),
            Ensure::Absent => format!(
                "Revoke {} key '{}' from {} file(s)",
                self.request.key.key_type(),
                self.name,
                self.target_count()
            ),
        }
    }

    fn resource_type(&self) -> &'static str {
        "authorized_key"
    }

    #[cfg(unix)]
    fn privilege_requirement(&self) -> PrivilegeRequirement {
        let euid = authkeys::effective_uid();
        for owner in &self.request.owners {
            match authkeys::lookup_account(owner) {
                Ok(account) if account.uid == euid => {}
                Ok(_) => {
                    return PrivilegeRequirement::Root {
                        reason: format!("writes files owned by '{owner}'"),
                    };
                }
                Err(e) => {
                    log::debug!("Could not look up '{owner}': {e}");
                    return PrivilegeRequirement::Root {
                        reason: format!("owner '{owner}' is not the invoking account"),
                    };
                }
            }
        }
        PrivilegeRequirement::None
    }

    fn current_state(&self) -> Result<ResourceState> {
        let reconciler = Reconciler::new(&authkeys::CurrentUser);
        if reconciler
            .exists(&self.request)
            .with_context(|| format!("Failed to inspect key '{}'", self.name))?
        {
            return Ok(self.desired_state());
        }

        let census = self
            .census()
            .with_context(|| format!("Failed to inspect key '{}'", self.name))?;
        let total = self.target_count();

        match self.request.ensure {
            Ensure::Present if census.exact == 0 && census.stale == 0 => Ok(ResourceState::Absent),
            Ensure::Present => Ok(ResourceState::Modified {
                from: format!(
                    "{}/{} in sync, {} stale, {} missing",
                    census.exact, total, census.stale, census.missing
                ),
                to: format!("{total}/{total} in sync"),
            }),
            Ensure::Absent => Ok(ResourceState::Present {
                details: Some(format!(
                    "found in {} of {} file(s)",
                    census.exact + census.stale,
                    total
                )),
            }),
        }
    }

    fn desired_state(&self) -> ResourceState {
        match self.request.ensure {
            Ensure::Present => ResourceState::Present {
                details: Some(format!("{} file(s)", self.target_count())),
            },
            Ensure::Absent => ResourceState::Absent,
        }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        let reconciler =
            Reconciler::new(ctx.privilege).with_modes(self.dir_mode, self.file_mode);

        if reconciler.exists(&self.request)? {
            return Ok(ApplyResult::NoChange);
        }

        match self.request.ensure {
            Ensure::Present => {
                let report = reconciler
                    .create(&self.request)
                    .with_context(|| format!("Failed to authorize key '{}'", self.name))?;
                if ctx.verbose {
                    self.log_report(&report);
                }
                if !report.changed() {
                    Ok(ApplyResult::NoChange)
                } else if report.removed() > 0 {
                    Ok(ApplyResult::Modified)
                } else {
                    Ok(ApplyResult::Created)
                }
            }
            Ensure::Absent => {
                let report = reconciler
                    .destroy(&self.request)
                    .with_context(|| format!("Failed to revoke key '{}'", self.name))?;
                if ctx.verbose {
                    self.log_report(&report);
                }
                if report.changed() {
                    Ok(ApplyResult::Removed)
                } else {
                    Ok(ApplyResult::NoChange)
                }
            }
        }
    }
}
