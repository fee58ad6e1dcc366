use authkeys::{
    CurrentUser, Ensure, Error, KeyRecord, PrivilegeContext, PrivilegeGuard, ReconciliationRequest,
    Reconciler, Result,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

const CONTENT: &str = "AAAAB3NzaC1yc2EAAAADAQABAAABAQC7";

/// Records every owner it is asked to act as.
#[derive(Default)]
struct Recording {
    owners: Mutex<Vec<String>>,
}

impl Recording {
    fn owners(&self) -> Vec<String> {
        self.owners.lock().unwrap().clone()
    }
}

impl PrivilegeContext for Recording {
    fn assume(&self, owner: &str) -> Result<PrivilegeGuard> {
        self.owners.lock().unwrap().push(owner.to_string());
        Ok(PrivilegeGuard::noop())
    }
}

fn desired() -> KeyRecord {
    KeyRecord::new("ssh-rsa", CONTENT)
        .unwrap()
        .with_options(["no-pty"])
        .unwrap()
        .with_comment("bob@host")
        .unwrap()
}

fn request(targets: &[&Path], ensure: Ensure) -> ReconciliationRequest {
    ReconciliationRequest::new(
        targets.iter().map(|p| p.to_path_buf()).collect(),
        targets.iter().map(|_| "bob".to_string()).collect(),
        ensure,
        desired(),
    )
}

fn target(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn create_on_missing_target_bootstraps_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".ssh").join("authorized_keys");
    let req = request(&[&path], Ensure::Present);

    let report = Reconciler::new(&CurrentUser).create(&req).unwrap();

    assert!(report.changed());
    assert!(report.targets[0].bootstrapped);
    assert_eq!(read(&path), format!("no-pty ssh-rsa {CONTENT} bob@host\n"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), 0o600);
        assert_eq!(mode(path.parent().unwrap()), 0o700);
    }
}

#[test]
fn create_twice_leaves_file_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = target(&dir, "authorized_keys", "# keys\nssh-ed25519 AAAAC3Nza alice\n");
    let req = request(&[&path], Ensure::Present);
    let reconciler = Reconciler::new(&CurrentUser);

    reconciler.create(&req).unwrap();
    let after_first = read(&path);

    let report = reconciler.create(&req).unwrap();
    assert!(!report.changed());
    assert_eq!(read(&path), after_first);
    assert_eq!(after_first.matches(CONTENT).count(), 1);
}

#[test]
fn create_replaces_stale_entries_and_appends() {
    let dir = TempDir::new().unwrap();
    let path = target(
        &dir,
        "authorized_keys",
        &format!(
            "ssh-rsa {CONTENT} old-comment\n# middle\nfrom=\"10.0.0.1\" ssh-rsa {CONTENT} bob@host\nssh-ed25519 AAAAC3Nza alice\n"
        ),
    );
    let req = request(&[&path], Ensure::Present);

    let report = Reconciler::new(&CurrentUser).create(&req).unwrap();

    assert_eq!(report.removed(), 2);
    assert_eq!(report.added(), 1);
    assert_eq!(
        read(&path),
        format!("# middle\nssh-ed25519 AAAAC3Nza alice\nno-pty ssh-rsa {CONTENT} bob@host\n")
    );
}

#[test]
fn create_keeps_exact_match_in_place() {
    let dir = TempDir::new().unwrap();
    let original = format!("no-pty ssh-rsa {CONTENT} bob@host\nssh-ed25519 AAAAC3Nza alice\n");
    let path = target(&dir, "authorized_keys", &original);
    let req = request(&[&path], Ensure::Present);

    let report = Reconciler::new(&CurrentUser).create(&req).unwrap();

    assert!(!report.changed());
    assert_eq!(read(&path), original);
}

#[test]
fn destroy_keeps_passthrough_lines() {
    let dir = TempDir::new().unwrap();
    let path = target(
        &dir,
        "authorized_keys",
        &format!("\n# work key\nssh-rsa {CONTENT} bob@host\n"),
    );
    let req = request(&[&path], Ensure::Absent);

    let report = Reconciler::new(&CurrentUser).destroy(&req).unwrap();

    assert_eq!(report.removed(), 1);
    assert_eq!(read(&path), "\n# work key\n");
}

#[test]
fn destroy_removes_every_content_match() {
    let dir = TempDir::new().unwrap();
    let path = target(
        &dir,
        "authorized_keys",
        &format!("ssh-rsa {CONTENT} laptop\nssh-ed25519 AAAAC3Nza alice\nssh-rsa {CONTENT} desktop\n"),
    );
    let req = request(&[&path], Ensure::Absent);
    let reconciler = Reconciler::new(&CurrentUser);

    reconciler.destroy(&req).unwrap();
    let after_first = read(&path);
    assert_eq!(after_first, "ssh-ed25519 AAAAC3Nza alice\n");

    let report = reconciler.destroy(&req).unwrap();
    assert!(!report.changed());
    assert_eq!(read(&path), after_first);
}

#[test]
fn destroy_skips_missing_target() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nobody").join("authorized_keys");
    let present = target(&dir, "authorized_keys", &format!("ssh-rsa {CONTENT} x\n"));
    let req = request(&[&missing, &present], Ensure::Absent);

    let report = Reconciler::new(&CurrentUser).destroy(&req).unwrap();

    assert!(report.targets[0].skipped);
    assert!(!missing.exists());
    assert_eq!(read(&present), "");
}

#[test]
fn exists_present_requires_exact_match_everywhere() {
    let dir = TempDir::new().unwrap();
    let exact = target(&dir, "a", &format!("no-pty ssh-rsa {CONTENT} bob@host\n"));
    let stale = target(&dir, "b", &format!("ssh-rsa {CONTENT} bob@host\n"));
    let missing = dir.path().join("c");
    let reconciler = Reconciler::new(&CurrentUser);

    assert!(reconciler.exists(&request(&[&exact], Ensure::Present)).unwrap());
    assert!(!reconciler.exists(&request(&[&exact, &stale], Ensure::Present)).unwrap());
    assert!(!reconciler.exists(&request(&[&exact, &missing], Ensure::Present)).unwrap());
    assert!(!missing.exists(), "exists must not bootstrap");
}

#[test]
fn exists_absent_uses_content_only() {
    let dir = TempDir::new().unwrap();
    let clean = target(&dir, "a", "# nothing here\nssh-ed25519 AAAAC3Nza alice\n");
    let other_options = target(&dir, "b", &format!("command=\"ls\" ssh-rsa {CONTENT} other\n"));
    let missing = dir.path().join("c");
    let reconciler = Reconciler::new(&CurrentUser);

    assert!(reconciler.exists(&request(&[&clean, &missing], Ensure::Absent)).unwrap());
    assert!(!reconciler.exists(&request(&[&clean, &other_options], Ensure::Absent)).unwrap());
}

#[test]
fn mismatched_owners_fail_before_touching_files() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a").join("authorized_keys");
    let b = dir.path().join("b").join("authorized_keys");
    let req = ReconciliationRequest::new(
        vec![a.clone(), b],
        vec!["alice".to_string()],
        Ensure::Present,
        desired(),
    );
    let recording = Recording::default();
    let reconciler = Reconciler::new(&recording);

    assert!(matches!(reconciler.create(&req), Err(Error::Config(_))));
    assert!(matches!(reconciler.exists(&req), Err(Error::Config(_))));
    assert!(matches!(reconciler.destroy(&req), Err(Error::Config(_))));
    assert!(!a.parent().unwrap().exists());
    assert!(recording.owners().is_empty());
}

#[test]
fn each_target_is_written_as_its_owner() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("alice")).unwrap();
    let a = dir.path().join("alice").join("authorized_keys");
    let r = target(&dir, "root_keys", "# root\n");
    let req = ReconciliationRequest::new(
        vec![a, r],
        vec!["alice".to_string(), "root".to_string()],
        Ensure::Present,
        desired(),
    );
    let recording = Recording::default();

    Reconciler::new(&recording).create(&req).unwrap();

    // alice: bootstrap + save; root: save only
    assert_eq!(recording.owners(), ["alice", "alice", "root"]);
}

#[test]
fn parse_error_aborts_and_reports_target() {
    let dir = TempDir::new().unwrap();
    let broken = target(&dir, "a", "command=\"unterminated ssh-rsa AAAA\n");
    let untouched = target(&dir, "b", "# b\n");
    let req = request(&[&broken, &untouched], Ensure::Present);

    let err = Reconciler::new(&CurrentUser).create(&req).unwrap_err();

    assert_eq!(err.path(), Some(broken.as_path()));
    assert!(matches!(err, Error::Parse { .. }));
    assert_eq!(read(&untouched), "# b\n");
}
