//! Directory-backed file store.
//!
//! All operations serialize against one store-wide lock so a reconciliation
//! pass never observes a half-written file from a concurrent connection.
//! Written files keep the timestamp carried by their descriptor, never the
//! wall clock at write time - the reconciliation tables depend on mtimes
//! reflecting when the originating side produced the content.

use anyhow::{Context, Result};
use chrono::{DateTime, SubsecRound, Utc};
use filetime::{set_file_mtime, FileTime};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::protocol::FileDescriptor;

pub struct FileStore {
    root: PathBuf,
    lock: Mutex<()>,
}

/// Store names are single path components; anything that could step out of
/// the root is rejected before touching disk.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("empty file name");
    }
    if name == "." || name == ".." {
        anyhow::bail!("file name {:?} is not allowed", name);
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        anyhow::bail!("file name {:?} contains a path separator", name);
    }
    Ok(())
}

/// Mtimes truncate to whole milliseconds so a timestamp survives the
/// disk -> wire -> disk round-trip and compares equal afterwards.
fn mtime_to_timestamp(mtime: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(mtime).trunc_subsecs(3)
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create store root {}", root.display()))?;
        Ok(FileStore {
            root,
            lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Enumerate the store: name/size/mtime only, no content. Entries that
    /// disappear or fail to stat mid-walk are skipped.
    pub fn list(&self) -> Result<Vec<FileDescriptor>> {
        let _guard = self.lock.lock();
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("list store root {}", self.root.display()))?;
        let mut inventory = Vec::new();
        for entry in entries.flatten() {
            let meta = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let modified = match meta.modified() {
                Ok(t) => mtime_to_timestamp(t),
                Err(_) => continue,
            };
            inventory.push(FileDescriptor {
                name,
                size: meta.len(),
                modified,
                content: None,
            });
        }
        inventory.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(inventory)
    }

    /// Read one file with its content.
    pub fn read(&self, name: &str) -> Result<FileDescriptor> {
        let path = self.path_for(name)?;
        let _guard = self.lock.lock();
        let content = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let meta = fs::metadata(&path).with_context(|| format!("stat {}", path.display()))?;
        let modified = mtime_to_timestamp(
            meta.modified()
                .with_context(|| format!("mtime of {}", path.display()))?,
        );
        Ok(FileDescriptor {
            name: name.to_string(),
            size: content.len() as u64,
            modified,
            content: Some(content),
        })
    }

    /// Create or overwrite a file from a descriptor, then force its mtime to
    /// the descriptor's timestamp.
    pub fn write(&self, descriptor: &FileDescriptor) -> Result<()> {
        let path = self.path_for(&descriptor.name)?;
        let content = descriptor
            .content
            .as_deref()
            .with_context(|| format!("descriptor {:?} carries no content", descriptor.name))?;
        let _guard = self.lock.lock();
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
        let mtime = FileTime::from_system_time(SystemTime::from(descriptor.modified));
        set_file_mtime(&path, mtime)
            .with_context(|| format!("set mtime on {}", path.display()))?;
        Ok(())
    }

    /// Delete a file. Removing a missing file is an error the caller treats
    /// as recoverable.
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        let _guard = self.lock.lock();
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        let path = match self.path_for(name) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let _guard = self.lock.lock();
        path.is_file()
    }

    /// Compare the store's mtime for `name` against a reference timestamp.
    /// `Greater` means the store copy is newer than the reference.
    pub fn compare(&self, name: &str, reference: DateTime<Utc>) -> Result<Ordering> {
        let path = self.path_for(name)?;
        let _guard = self.lock.lock();
        let meta = fs::metadata(&path).with_context(|| format!("stat {}", path.display()))?;
        let modified = mtime_to_timestamp(
            meta.modified()
                .with_context(|| format!("mtime of {}", path.display()))?,
        );
        Ok(modified.cmp(&reference.trunc_subsecs(3)))
    }
}
