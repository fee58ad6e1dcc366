//! Resource trait and types for declarative key management
//!
//! Every configured key is modeled as a Resource with:
//! - State detection (current vs desired)
//! - Apply function (converge current → desired)
//! - Privilege requirements (does it touch files of other accounts?)

use anyhow::Result;
use authkeys::PrivilegeContext;
use serde::Serialize;
use std::fmt;

pub mod authorized_key;

pub use authorized_key::AuthorizedKey;

/// Whether applying a resource needs root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivilegeRequirement {
    /// Runs as the invoking user
    None,
    /// Needs root, with a reason
    Root { reason: String },
}

/// Current or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ResourceState {
    /// Resource exists/is configured
    Present { details: Option<String> },
    /// Resource does not exist/is not configured
    Absent,
    /// Resource exists but differs from desired
    Modified { from: String, to: String },
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

/// Context passed to apply operations
pub struct ApplyContext<'a> {
    pub dry_run: bool,
    pub verbose: bool,
    pub privilege: &'a dyn PrivilegeContext,
}

/// Core trait for all resources in keysync
pub trait Resource: fmt::Debug {
    /// Unique identifier for this resource (e.g., "key:alice@laptop")
    fn id(&self) -> String;

    /// Human-readable description
    fn description(&self) -> String;

    /// Resource type category (e.g., "authorized_key")
    fn resource_type(&self) -> &'static str;

    /// Whether this resource requires root
    fn privilege_requirement(&self) -> PrivilegeRequirement {
        PrivilegeRequirement::None
    }

    /// Detect current state of this resource
    fn current_state(&self) -> Result<ResourceState>;

    /// Get the desired state (from config)
    fn desired_state(&self) -> ResourceState;

    /// Apply changes to reach desired state
    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult>;
}

/// A diff between current and desired state
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDiff {
    pub resource_id: String,
    pub resource_type: String,
    pub description: String,
    pub current: ResourceState,
    pub desired: ResourceState,
    pub requires_root: bool,
}

impl ResourceDiff {
    /// Diff for `resource`, or `None` when it is already in its desired state.
    pub fn from_resource(resource: &dyn Resource) -> Result<Option<Self>> {
        let current = resource.current_state()?;
        let desired = resource.desired_state();

        if current == desired {
            return Ok(None);
        }

        Ok(Some(Self {
            resource_id: resource.id(),
            resource_type: resource.resource_type().to_string(),
            description: resource.description(),
            current,
            desired,
            requires_root: matches!(
                resource.privilege_requirement(),
                PrivilegeRequirement::Root { .. }
            ),
        }))
    }
}
