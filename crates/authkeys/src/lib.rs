//! # authkeys
//!
//! Pure Rust library for OpenSSH `authorized_keys` files.
//!
//! This crate provides:
//! - A line parser and writer that keeps blank and comment lines intact
//! - [`AuthorizationFile`], an editable snapshot of one file with atomic save
//! - [`Reconciler`], which makes one desired key present in (or absent from)
//!   several files, each owned by a different account
//!
//! ## Example
//!
//! ```no_run
//! use authkeys::{CurrentUser, Ensure, KeyRecord, ReconciliationRequest, Reconciler};
//!
//! let key = KeyRecord::new("ssh-ed25519", "AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl")?
//!     .with_options(["no-agent-forwarding"])?
//!     .with_comment("alice@laptop")?;
//!
//! let request = ReconciliationRequest::new(
//!     vec!["/home/alice/.ssh/authorized_keys".into()],
//!     vec!["alice".into()],
//!     Ensure::Present,
//!     key,
//! );
//!
//! let reconciler = Reconciler::new(&CurrentUser);
//! if !reconciler.exists(&request)? {
//!     let report = reconciler.create(&request)?;
//!     println!("changed: {}", report.changed());
//! }
//! # Ok::<(), authkeys::Error>(())
//! ```

#![warn(missing_docs)]

pub mod bootstrap;
pub mod error;
pub mod file;
pub mod privilege;
pub mod reconcile;
pub mod record;

pub use bootstrap::{DEFAULT_DIR_MODE, PathBootstrapper};
pub use error::{Error, ParseError, ParseErrorKind, Result};
pub use file::{AuthorizationFile, DEFAULT_FILE_MODE, Entry};
#[cfg(unix)]
pub use privilege::{
    SwitchUser, effective_uid, home_dir_of, is_root, lookup_account, supplementary_groups,
};
pub use privilege::{Account, CurrentUser, PrivilegeContext, PrivilegeGuard};
pub use reconcile::{Ensure, ReconcileReport, ReconciliationRequest, Reconciler, TargetChange};
pub use record::{KeyRecord, is_key_type};
