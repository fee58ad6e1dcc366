//! Reconciling one desired key against a set of target files.
//!
//! - [`Reconciler::exists`] answers "is the desired state already in place?"
//! - [`Reconciler::create`] makes every target hold exactly the desired entry
//! - [`Reconciler::destroy`] removes every entry with the key's content
//!
//! Targets are processed in the order given, one complete
//! load-edit-save cycle at a time. Every call loads each file afresh.

use crate::bootstrap::PathBootstrapper;
use crate::error::{Error, Result};
use crate::file::AuthorizationFile;
use crate::privilege::PrivilegeContext;
use crate::record::KeyRecord;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

/// Desired state of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ensure {
    /// Every target holds an entry equal to the desired record
    #[default]
    Present,
    /// No target holds an entry with the key's content
    Absent,
}

impl fmt::Display for Ensure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

impl FromStr for Ensure {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(Error::Config(format!(
                "ensure must be 'present' or 'absent', got '{other}'"
            ))),
        }
    }
}

/// What to reconcile, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationRequest {
    /// Target files, processed in this order
    pub targets: Vec<PathBuf>,
    /// Owner of each target, paired by position
    pub owners: Vec<String>,
    /// Present or absent
    pub ensure: Ensure,
    /// The desired entry
    pub key: KeyRecord,
}

impl ReconciliationRequest {
    /// Build a request. For `Ensure::Absent` the key's options are dropped,
    /// since absence only looks at content.
    pub fn new(
        targets: Vec<PathBuf>,
        owners: Vec<String>,
        ensure: Ensure,
        key: KeyRecord,
    ) -> Self {
        let key = match ensure {
            Ensure::Present => key,
            Ensure::Absent => key.without_options(),
        };
        Self {
            targets,
            owners,
            ensure,
            key,
        }
    }

    /// Check the target/owner pairing.
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::Config("at least one target is required".to_string()));
        }
        if self.targets.len() != self.owners.len() {
            return Err(Error::Config(format!(
                "{} target(s) but {} owner(s); each target needs exactly one owner",
                self.targets.len(),
                self.owners.len()
            )));
        }
        Ok(())
    }

    /// `(target, owner)` pairs in order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.targets
            .iter()
            .map(PathBuf::as_path)
            .zip(self.owners.iter().map(String::as_str))
    }
}

/// What happened to one target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetChange {
    /// Target file
    pub path: PathBuf,
    /// Whether the file or its directory had to be created
    pub bootstrapped: bool,
    /// Entries removed
    pub removed: usize,
    /// Whether the desired entry was appended
    pub added: bool,
    /// Whether the file was rewritten
    pub written: bool,
    /// Whether the target was missing and left alone
    pub skipped: bool,
}

impl TargetChange {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ..Default::default()
        }
    }

    /// Whether anything on disk changed for this target.
    pub fn is_change(&self) -> bool {
        self.bootstrapped || self.written
    }
}

/// Per-target outcome of [`Reconciler::create`] or [`Reconciler::destroy`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// One entry per processed target, in order
    pub targets: Vec<TargetChange>,
}

impl ReconcileReport {
    /// Whether any target changed on disk.
    pub fn changed(&self) -> bool {
        self.targets.iter().any(TargetChange::is_change)
    }

    /// Total entries removed across targets.
    pub fn removed(&self) -> usize {
        self.targets.iter().map(|t| t.removed).sum()
    }

    /// Number of targets the desired entry was appended to.
    pub fn added(&self) -> usize {
        self.targets.iter().filter(|t| t.added).count()
    }
}

/// Applies [`ReconciliationRequest`]s.
pub struct Reconciler<'a> {
    privilege: &'a dyn PrivilegeContext,
    bootstrapper: PathBootstrapper<'a>,
    deadline: Option<Instant>,
}

impl<'a> Reconciler<'a> {
    /// Reconciler writing through `privilege`, with default modes.
    pub fn new(privilege: &'a dyn PrivilegeContext) -> Self {
        Self {
            privilege,
            bootstrapper: PathBootstrapper::new(privilege),
            deadline: None,
        }
    }

    /// Permission bits for bootstrapped directories and files.
    pub fn with_modes(mut self, dir_mode: u32, file_mode: u32) -> Self {
        self.bootstrapper = self.bootstrapper.with_modes(dir_mode, file_mode);
        self
    }

    /// Stop with [`Error::DeadlineExceeded`] once `deadline` has passed.
    /// Only checked between targets.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn check_deadline(&self, completed: usize) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(Error::DeadlineExceeded { completed })
            }
            _ => Ok(()),
        }
    }

    /// Whether the request is already satisfied.
    ///
    /// Present: every target loads and holds an entry equal to the key in
    /// every field. Absent: no target holds an entry with the key's
    /// content; missing targets count as absent.
    pub fn exists(&self, request: &ReconciliationRequest) -> Result<bool> {
        request.validate()?;
        match request.ensure {
            Ensure::Present => self.all_present(request),
            Ensure::Absent => self.all_absent(request),
        }
    }

    fn all_present(&self, request: &ReconciliationRequest) -> Result<bool> {
        for (idx, (path, _)) in request.pairs().enumerate() {
            self.check_deadline(idx)?;

            let file = match AuthorizationFile::load(path) {
                Ok(file) => file,
                Err(e) if e.is_not_found() => {
                    log::debug!("{} is missing; key not present", path.display());
                    return Ok(false);
                }
                Err(e) => return Err(e),
            };

            if file.is_empty() || !file.contains(&request.key) {
                log::debug!("{} lacks an exact entry for the key", path.display());
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn all_absent(&self, request: &ReconciliationRequest) -> Result<bool> {
        for (idx, (path, _)) in request.pairs().enumerate() {
            self.check_deadline(idx)?;

            let file = match AuthorizationFile::load(path) {
                Ok(file) => file,
                Err(e) if e.is_not_found() => {
                    log::debug!("{} is missing; nothing to be absent from", path.display());
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !file.find_by_content(request.key.content()).is_empty() {
                log::debug!("{} still holds the key", path.display());
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Make every target hold the desired entry exactly once.
    ///
    /// Missing targets are bootstrapped first. Entries with the same content
    /// but other fields are replaced by the desired one, appended last.
    /// Files are only rewritten when they change.
    pub fn create(&self, request: &ReconciliationRequest) -> Result<ReconcileReport> {
        request.validate()?;

        let mut report = ReconcileReport::default();
        for (idx, (path, owner)) in request.pairs().enumerate() {
            self.check_deadline(idx)?;
            report
                .targets
                .push(self.create_one(path, owner, &request.key)?);
        }
        Ok(report)
    }

    fn create_one(&self, path: &Path, owner: &str, key: &KeyRecord) -> Result<TargetChange> {
        let mut change = TargetChange::new(path);

        let mut file = match AuthorizationFile::load(path) {
            Ok(file) => file,
            Err(e) if e.is_not_found() => {
                log::debug!("{} is missing; bootstrapping as '{owner}'", path.display());
                change.bootstrapped = self.bootstrapper.ensure(path, owner)?;
                AuthorizationFile::load(path)?
            }
            Err(e) => return Err(e),
        };

        let matches = file.find_by_content(key.content());
        let exact = matches.iter().any(|(_, record)| *record == key);
        let stale: Vec<usize> = if exact {
            Vec::new()
        } else {
            matches.iter().map(|(idx, _)| *idx).collect()
        };

        if exact {
            log::debug!("{} already holds the key", path.display());
        } else {
            change.removed = file.remove_at(&stale);
            file.add(key.clone());
            change.added = true;
            log::debug!(
                "{}: replacing {} stale entr{} and appending the key",
                path.display(),
                change.removed,
                if change.removed == 1 { "y" } else { "ies" }
            );
        }

        if file.is_dirty() {
            file.save(self.privilege, owner)?;
            change.written = true;
        }

        Ok(change)
    }

    /// Remove every entry with the key's content from every target.
    ///
    /// Missing targets are skipped. Files are only rewritten when an entry
    /// was removed.
    pub fn destroy(&self, request: &ReconciliationRequest) -> Result<ReconcileReport> {
        request.validate()?;

        let mut report = ReconcileReport::default();
        for (idx, (path, owner)) in request.pairs().enumerate() {
            self.check_deadline(idx)?;
            report
                .targets
                .push(self.destroy_one(path, owner, request.key.content())?);
        }
        Ok(report)
    }

    fn destroy_one(&self, path: &Path, owner: &str, content: &str) -> Result<TargetChange> {
        let mut change = TargetChange::new(path);

        let mut file = match AuthorizationFile::load(path) {
            Ok(file) => file,
            Err(e) if e.is_not_found() => {
                log::warn!("{} does not exist; skipping", path.display());
                change.skipped = true;
                return Ok(change);
            }
            Err(e) => return Err(e),
        };

        let indices: Vec<usize> = file
            .find_by_content(content)
            .into_iter()
            .map(|(idx, _)| idx)
            .collect();
        change.removed = file.remove_at(&indices);

        if file.is_dirty() {
            file.save(self.privilege, owner)?;
            change.written = true;
        }

        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::CurrentUser;

    fn key() -> KeyRecord {
        KeyRecord::new("ssh-ed25519", "AAAAC3NzaC1lZDI1NTE5")
            .unwrap()
            .with_options(["no-pty"])
            .unwrap()
    }

    #[test]
    fn test_ensure_from_str() {
        assert_eq!("present".parse::<Ensure>().unwrap(), Ensure::Present);
        assert_eq!("absent".parse::<Ensure>().unwrap(), Ensure::Absent);
        assert!("latest".parse::<Ensure>().is_err());
    }

    #[test]
    fn test_absent_request_drops_options() {
        let request = ReconciliationRequest::new(
            vec!["/a".into()],
            vec!["alice".into()],
            Ensure::Absent,
            key(),
        );
        assert!(request.key.options().is_empty());
    }

    #[test]
    fn test_validate_rejects_mismatch_and_empty() {
        let mismatched = ReconciliationRequest::new(
            vec!["/a".into(), "/b".into()],
            vec!["alice".into()],
            Ensure::Present,
            key(),
        );
        assert!(matches!(mismatched.validate(), Err(Error::Config(_))));

        let empty = ReconciliationRequest::new(Vec::new(), Vec::new(), Ensure::Present, key());
        assert!(matches!(empty.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_deadline_in_the_past_stops_before_first_target() {
        let request = ReconciliationRequest::new(
            vec!["/nonexistent/keysync/authorized_keys".into()],
            vec!["alice".into()],
            Ensure::Present,
            key(),
        );
        let reconciler = Reconciler::new(&CurrentUser).with_deadline(Instant::now());
        let err = reconciler.create(&request).unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded { completed: 0 }));
    }
}
