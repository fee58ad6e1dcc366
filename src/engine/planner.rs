//! Execution planner - groups resources by privilege level

use crate::resource::{PrivilegeRequirement, Resource};

/// An execution plan with resources grouped by privilege level
#[derive(Default)]
pub struct ExecutionPlan {
    /// Resources the invoking account can apply itself
    pub unprivileged: Vec<Box<dyn Resource>>,
    /// Resources that write files owned by other accounts
    pub privileged: Vec<Box<dyn Resource>>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, classified by its privilege requirement
    pub fn add_resource(&mut self, resource: Box<dyn Resource>) {
        match resource.privilege_requirement() {
            PrivilegeRequirement::Root { reason } => {
                log::debug!("{} needs root: {}", resource.id(), reason);
                self.privileged.push(resource);
            }
            PrivilegeRequirement::None => self.unprivileged.push(resource),
        }
    }

    /// Filter plan to only include resources matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&dyn Resource) -> bool,
    {
        Self {
            unprivileged: self
                .unprivileged
                .into_iter()
                .filter(|r| predicate(r.as_ref()))
                .collect(),
            privileged: self
                .privileged
                .into_iter()
                .filter(|r| predicate(r.as_ref()))
                .collect(),
        }
    }

    /// Keep only resources whose id contains `target`
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(t) => self.filter(|r| matches_filter(r, t)),
        }
    }

    /// Total number of resources in the plan
    pub fn total_resources(&self) -> usize {
        self.unprivileged.len() + self.privileged.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.unprivileged.is_empty() && self.privileged.is_empty()
    }

    /// Check if plan has any privileged resources
    pub fn has_privileged(&self) -> bool {
        !self.privileged.is_empty()
    }
}

/// Check if a resource matches a target filter.
///
/// `key:NAME` matches exactly; anything else is a substring of the id.
fn matches_filter(resource: &dyn Resource, target: &str) -> bool {
    let id = resource.id();
    if target.starts_with("key:") {
        id == target
    } else {
        id.contains(target)
    }
}
