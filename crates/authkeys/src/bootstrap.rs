//! Creating a missing target file and its directory.

use crate::error::{Error, Result};
use crate::file::{DEFAULT_FILE_MODE, set_mode};
use crate::privilege::PrivilegeContext;
use std::fs::{DirBuilder, OpenOptions};
use std::path::Path;

/// Permission bits for a newly created key directory.
pub const DEFAULT_DIR_MODE: u32 = 0o700;

/// Makes a target loadable: parent directory and empty file, created as
/// the owner with restrictive permissions.
pub struct PathBootstrapper<'a> {
    privilege: &'a dyn PrivilegeContext,
    dir_mode: u32,
    file_mode: u32,
}

impl<'a> PathBootstrapper<'a> {
    /// Bootstrapper with the default 0700/0600 modes.
    pub fn new(privilege: &'a dyn PrivilegeContext) -> Self {
        Self {
            privilege,
            dir_mode: DEFAULT_DIR_MODE,
            file_mode: DEFAULT_FILE_MODE,
        }
    }

    /// Use other permission bits.
    pub fn with_modes(mut self, dir_mode: u32, file_mode: u32) -> Self {
        self.dir_mode = dir_mode;
        self.file_mode = file_mode;
        self
    }

    /// Ensure `path` and its parent directory exist, acting as `owner`.
    ///
    /// Only the immediate parent is created; a missing grandparent is an
    /// error. Returns whether anything was created.
    pub fn ensure(&self, path: &Path, owner: &str) -> Result<bool> {
        let _guard = self.privilege.assume(owner)?;
        let mut created = false;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty())
            && !dir.exists()
        {
            create_dir(dir, self.dir_mode).map_err(|e| Error::io(dir, e))?;
            set_mode(dir, self.dir_mode).map_err(|e| Error::io(dir, e))?;
            log::info!("Created {} (mode {:o})", dir.display(), self.dir_mode);
            created = true;
        }

        if !path.exists() {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {}
                // Raced with another creator; the file is there now.
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(created),
                Err(e) => return Err(Error::io(path, e)),
            }
            set_mode(path, self.file_mode).map_err(|e| Error::io(path, e))?;
            log::info!("Created {} (mode {:o})", path.display(), self.file_mode);
            created = true;
        }

        Ok(created)
    }
}

fn create_dir(dir: &Path, mode: u32) -> std::io::Result<()> {
    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(dir)
}
