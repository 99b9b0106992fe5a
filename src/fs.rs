// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::WriteFile {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(unix)]
fn restrict_to_owner(options: &mut OpenOptions, _dest: &Path) {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
}

#[cfg(not(unix))]
fn restrict_to_owner(_options: &mut OpenOptions, dest: &Path) {
    tracing::warn!(
        "Cannot restrict permissions of {} on this platform",
        dest.display()
    );
}

/// Temporary sibling of a destination file. Removed on drop unless persisted.
struct PendingFile {
    temp: PathBuf,
    dest: PathBuf,
    persisted: bool,
}

impl PendingFile {
    fn for_destination(dest: &Path) -> Result<Self> {
        let dir = match dest.parent() {
            Some(p) if p.as_os_str().is_empty() => Path::new("."),
            Some(p) => p,
            None => return Err(Error::InvalidPath(dest.to_path_buf())),
        };
        let suffix: u64 = rand::Rng::random(&mut rand::rng());
        Ok(Self {
            temp: dir.join(format!(".tmp-{:016x}", suffix)),
            dest: dest.to_path_buf(),
            persisted: false,
        })
    }

    fn open(&self, owner_only: bool) -> Result<File> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        if owner_only {
            restrict_to_owner(&mut options, &self.dest);
        }
        options.open(&self.temp).map_err(write_error(&self.temp))
    }

    fn write(&self, contents: &[u8], owner_only: bool) -> Result<()> {
        let mut file = self.open(owner_only)?;
        file.write_all(contents)
            .and_then(|_| file.sync_all())
            .map_err(write_error(&self.temp))
    }

    fn persist(mut self) -> Result<()> {
        std::fs::rename(&self.temp, &self.dest).map_err(write_error(&self.dest))?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

/// Replace `path` with `contents` so that readers see either the old file or
/// the complete new one.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let pending = PendingFile::for_destination(path)?;
    pending.write(contents, false)?;
    pending.persist()
}

/// Like [`atomic_write`], but the file is readable by the owner only (0600
/// on Unix). Used for stores and anything holding key material.
pub fn atomic_write_secret(path: &Path, contents: &[u8]) -> Result<()> {
    let pending = PendingFile::for_destination(path)?;
    pending.write(contents, true)?;
    pending.persist()
}
