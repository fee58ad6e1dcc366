//! Acting as another account.
//!
//! Files under a user's home must be created and replaced by that user,
//! otherwise sshd's `StrictModes` rejects them. [`PrivilegeContext`] hides
//! how that happens: [`SwitchUser`] changes the effective uid/gid of the
//! process while a [`PrivilegeGuard`] is alive, [`CurrentUser`] never
//! switches.
//!
//! Effective ids are process-wide, so guards must not overlap across
//! threads.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Capability to run filesystem operations as a given account.
pub trait PrivilegeContext: Send + Sync {
    /// Become `owner` until the returned guard is dropped.
    fn assume(&self, owner: &str) -> Result<PrivilegeGuard>;
}

/// Restores the previous identity when dropped.
#[must_use = "the previous identity is restored as soon as the guard is dropped"]
pub struct PrivilegeGuard {
    restore: Option<Box<dyn FnOnce()>>,
}

impl PrivilegeGuard {
    /// A guard with nothing to restore.
    pub fn noop() -> Self {
        Self { restore: None }
    }

    /// A guard that runs `restore` on drop.
    pub fn new(restore: impl FnOnce() + 'static) -> Self {
        Self {
            restore: Some(Box::new(restore)),
        }
    }
}

impl Drop for PrivilegeGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

/// Runs everything as the invoking account, whatever owner is requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentUser;

impl PrivilegeContext for CurrentUser {
    fn assume(&self, owner: &str) -> Result<PrivilegeGuard> {
        log::trace!("Acting for '{owner}' as the current user");
        Ok(PrivilegeGuard::noop())
    }
}

/// An entry of the account database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Login name
    pub name: String,
    /// User id
    pub uid: u32,
    /// Primary group id
    pub gid: u32,
    /// Home directory
    pub home: PathBuf,
}

/// Switches effective uid/gid and the supplementary groups to the owner's.
/// Requires root unless the owner is already the effective user.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SwitchUser;

#[cfg(unix)]
impl PrivilegeContext for SwitchUser {
    fn assume(&self, owner: &str) -> Result<PrivilegeGuard> {
        let account = lookup_account(owner)?;

        // SAFETY: geteuid/getegid cannot fail and touch no memory.
        let (euid, egid) = unsafe { (libc::geteuid(), libc::getegid()) };

        if account.uid == euid {
            return Ok(PrivilegeGuard::noop());
        }
        if euid != 0 {
            return Err(Error::Privilege {
                owner: owner.to_string(),
                message: "switching to another account requires root".to_string(),
            });
        }

        let privilege_error = |message: String| Error::Privilege {
            owner: owner.to_string(),
            message,
        };

        let saved_groups = supplementary_groups()?;
        let c_name = std::ffi::CString::new(owner)
            .map_err(|_| privilege_error("name contains a NUL byte".to_string()))?;

        // Groups first, then gid, then uid: once the uid is dropped none of
        // them can be changed.
        // SAFETY: `c_name` is a valid NUL-terminated string; return value checked.
        if unsafe { libc::initgroups(c_name.as_ptr(), account.gid as _) } != 0 {
            return Err(privilege_error(format!(
                "initgroups failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        // SAFETY: plain syscall with an integer argument; return value checked.
        if unsafe { libc::setegid(account.gid) } != 0 {
            let err = std::io::Error::last_os_error();
            restore_groups(&saved_groups);
            return Err(privilege_error(format!("setegid failed: {err}")));
        }
        // SAFETY: as above.
        if unsafe { libc::seteuid(account.uid) } != 0 {
            let err = std::io::Error::last_os_error();
            // SAFETY: as above; still root here, so restoring the gid succeeds.
            unsafe { libc::setegid(egid) };
            restore_groups(&saved_groups);
            return Err(privilege_error(format!("seteuid failed: {err}")));
        }

        log::debug!(
            "Switched effective ids to {}:{} with the groups of '{owner}'",
            account.uid,
            account.gid
        );

        Ok(PrivilegeGuard::new(move || {
            // SAFETY: returning to the saved ids, in reverse order.
            unsafe {
                if libc::seteuid(euid) != 0 || libc::setegid(egid) != 0 {
                    log::error!(
                        "Failed to restore effective ids: {}",
                        std::io::Error::last_os_error()
                    );
                }
            }
            restore_groups(&saved_groups);
        }))
    }
}

/// Supplementary group ids of the process.
#[cfg(unix)]
pub fn supplementary_groups() -> Result<Vec<u32>> {
    let groups_error = |err: std::io::Error| Error::Privilege {
        owner: String::new(),
        message: format!("getgroups failed: {err}"),
    };

    loop {
        // SAFETY: a zero count only queries the number of groups.
        let count = unsafe { libc::getgroups(0, std::ptr::null_mut()) };
        if count < 0 {
            return Err(groups_error(std::io::Error::last_os_error()));
        }

        let mut groups: Vec<libc::gid_t> = vec![0; count as usize];
        // SAFETY: `groups` has room for `count` entries.
        let filled = unsafe { libc::getgroups(count, groups.as_mut_ptr()) };
        if filled < 0 {
            let err = std::io::Error::last_os_error();
            // The list grew between the two calls.
            if err.raw_os_error() == Some(libc::EINVAL) {
                continue;
            }
            return Err(groups_error(err));
        }

        groups.truncate(filled as usize);
        return Ok(groups);
    }
}

/// Reinstate a group list saved by [`supplementary_groups`]. Needs euid 0.
#[cfg(unix)]
fn restore_groups(groups: &[u32]) {
    // SAFETY: the pointer and length describe a live slice of gid_t.
    if unsafe { libc::setgroups(groups.len() as _, groups.as_ptr()) } != 0 {
        log::error!(
            "Failed to restore supplementary groups: {}",
            std::io::Error::last_os_error()
        );
    }
}

/// Look up `name` in the account database.
#[cfg(unix)]
pub fn lookup_account(name: &str) -> Result<Account> {
    use std::ffi::{CStr, CString, OsStr};
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let privilege_error = |message: String| Error::Privilege {
        owner: name.to_string(),
        message,
    };

    let c_name =
        CString::new(name).map_err(|_| privilege_error("name contains a NUL byte".to_string()))?;

    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    let mut pwd = MaybeUninit::<libc::passwd>::uninit();
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    loop {
        // SAFETY: every pointer refers to live, correctly sized storage owned
        // by this frame; getpwnam_r writes only within `buf`.
        let rc = unsafe {
            libc::getpwnam_r(
                c_name.as_ptr(),
                pwd.as_mut_ptr(),
                buf.as_mut_ptr(),
                buf.len(),
                &raw mut result,
            )
        };
        if rc == libc::ERANGE && buf.len() < 1 << 20 {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 {
            return Err(privilege_error(format!(
                "account lookup failed: {}",
                std::io::Error::from_raw_os_error(rc)
            )));
        }
        break;
    }

    if result.is_null() {
        return Err(privilege_error("no such account".to_string()));
    }

    // SAFETY: a non-null result means getpwnam_r filled `pwd`, and its string
    // fields point into `buf`, which is still alive.
    let (uid, gid, home) = unsafe {
        let pwd = pwd.assume_init_ref();
        let home = CStr::from_ptr(pwd.pw_dir).to_bytes();
        (pwd.pw_uid, pwd.pw_gid, PathBuf::from(OsStr::from_bytes(home)))
    };

    Ok(Account {
        name: name.to_string(),
        uid,
        gid,
        home,
    })
}

/// Home directory of `owner`.
#[cfg(unix)]
pub fn home_dir_of(owner: &str) -> Result<PathBuf> {
    Ok(lookup_account(owner)?.home)
}

/// Effective uid of the process.
#[cfg(unix)]
pub fn effective_uid() -> u32 {
    // SAFETY: geteuid cannot fail.
    unsafe { libc::geteuid() }
}

/// Whether the process runs with an effective uid of 0.
#[cfg(unix)]
pub fn is_root() -> bool {
    effective_uid() == 0
}
