//! In-memory model of one authorized_keys file.
//!
//! An [`AuthorizationFile`] is a snapshot: it is loaded once, edited in
//! memory, and written back in full with [`AuthorizationFile::save`].

pub mod parser;
pub mod writer;

pub use parser::{parse_line, parse_string};
pub use writer::{record_line, write_string};

use crate::error::{Error, Result};
use crate::privilege::PrivilegeContext;
use crate::record::KeyRecord;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Permission bits for a newly written key file.
pub const DEFAULT_FILE_MODE: u32 = 0o600;

/// One line of an authorized_keys file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// An authorization entry
    Key(KeyRecord),
    /// A blank or comment line, kept byte for byte
    Passthrough(String),
}

impl Entry {
    /// The key record, if this line is one.
    pub fn as_key(&self) -> Option<&KeyRecord> {
        match self {
            Self::Key(record) => Some(record),
            Self::Passthrough(_) => None,
        }
    }
}

/// Ordered entries of one target file.
#[derive(Debug, Clone)]
pub struct AuthorizationFile {
    path: PathBuf,
    entries: Vec<Entry>,
    dirty: bool,
}

impl AuthorizationFile {
    /// Read and parse `path`.
    ///
    /// A missing file yields [`Error::NotFound`]; a malformed line aborts
    /// the load with [`Error::Parse`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::from_io(path, e))?;
        let entries = parse_string(&content).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        log::debug!("Loaded {} entries from {}", entries.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        })
    }

    /// Path this file was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Key entries only, in file order.
    pub fn keys(&self) -> impl Iterator<Item = &KeyRecord> {
        self.entries.iter().filter_map(Entry::as_key)
    }

    /// Whether the file holds no key entries.
    pub fn is_empty(&self) -> bool {
        self.keys().next().is_none()
    }

    /// Whether there are unsaved edits.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Every key entry whose content is `content`, with its entry index.
    pub fn find_by_content(&self, content: &str) -> Vec<(usize, &KeyRecord)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| entry.as_key().map(|record| (idx, record)))
            .filter(|(_, record)| record.content() == content)
            .collect()
    }

    /// Whether an entry equal to `record` in every field exists.
    pub fn contains(&self, record: &KeyRecord) -> bool {
        self.keys().any(|k| k == record)
    }

    /// Append `record` as the last entry.
    pub fn add(&mut self, record: KeyRecord) {
        self.entries.push(Entry::Key(record));
        self.dirty = true;
    }

    /// Remove the entries at `indices`, keeping the order of the rest.
    ///
    /// Out-of-range and duplicate indices are ignored. Returns how many
    /// entries were removed.
    pub fn remove_at(&mut self, indices: &[usize]) -> usize {
        let before = self.entries.len();
        let mut idx = 0;
        self.entries.retain(|_| {
            let keep = !indices.contains(&idx);
            idx += 1;
            keep
        });

        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Write all entries back to the path as `owner`.
    ///
    /// The new content goes to a temporary file in the same directory which
    /// then replaces the target, so a crash never leaves a truncated file.
    /// The target keeps its permission bits; a new file gets 0600.
    pub fn save(&mut self, privilege: &dyn PrivilegeContext, owner: &str) -> Result<()> {
        let content = write_string(&self.entries);
        let path = self.path.as_path();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let _guard = privilege.assume(owner)?;

        let mode = match std::fs::metadata(path) {
            Ok(meta) => permission_bits(&meta),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DEFAULT_FILE_MODE,
            Err(e) => return Err(Error::io(path, e)),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(path, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| Error::io(path, e))?;
        tmp.flush().map_err(|e| Error::io(path, e))?;
        tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
        set_mode(tmp.path(), mode).map_err(|e| Error::io(path, e))?;

        // rename(2) within the same directory
        tmp.persist(path).map_err(|e| Error::io(path, e.error))?;

        log::info!(
            "Wrote {} entries to {} (mode {:o})",
            self.entries.len(),
            path.display(),
            mode
        );
        self.dirty = false;
        Ok(())
    }
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(_meta: &std::fs::Metadata) -> u32 {
    DEFAULT_FILE_MODE
}

/// Set permission bits on `path`. No-op where modes do not exist.
pub(crate) fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}
