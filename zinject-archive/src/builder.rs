//! The sink extractors feed their entries into.

use std::fs;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use filetime::FileTime;

use crate::errors::Result;

/// Receives the entries of one archive, in stream order, with paths already
/// normalized. Symlinks and hardlinks arrive after all regular entries (the
/// extractors buffer them), and a builder may defer applying them further
/// until the archive closes; targets are only guaranteed to exist by then.
pub trait Builder {
    /// Ensures a directory exists at `path`.
    fn add_directory(&mut self, path: &Utf8Path) -> Result<()>;

    /// Writes a regular file from `data`. `mtime` is seconds since the Unix
    /// epoch.
    fn add_file(
        &mut self,
        path: &Utf8Path,
        data: &mut dyn Read,
        mtime: i64,
        executable: bool,
    ) -> Result<()>;

    /// Records a symlink. The target string is stored as-is; it is not
    /// resolved or validated against the extraction root.
    fn add_symlink(&mut self, path: &Utf8Path, target: &str) -> Result<()>;

    /// Records a hardlink to an entry added earlier in the same archive.
    fn add_hardlink(&mut self, path: &Utf8Path, existing: &Utf8Path, executable: bool)
        -> Result<()>;

    /// Removes a previously added entry.
    fn remove(&mut self, path: &Utf8Path) -> Result<()>;

    /// Reinterprets the content of an existing file as a symlink target.
    /// Used by formats that mark symlinks out-of-band (zip central
    /// directory).
    fn turn_into_symlink(&mut self, path: &Utf8Path) -> Result<()>;

    /// Marks an existing file as executable.
    fn mark_as_executable(&mut self, path: &Utf8Path) -> Result<()>;
}

enum PendingLink {
    Symlink {
        path: Utf8PathBuf,
        target: String,
    },
    Hardlink {
        path: Utf8PathBuf,
        existing: Utf8PathBuf,
        executable: bool,
    },
}

/// A [`Builder`] that materializes the archive under a directory on disk.
///
/// Links are deferred until [`DirectoryBuilder::close`] so that an archive
/// may link to entries in any order.
pub struct DirectoryBuilder {
    root: Utf8PathBuf,
    pending: Vec<PendingLink>,
}

impl DirectoryBuilder {
    /// Creates a builder writing beneath `root`. The directory itself must
    /// already exist.
    pub fn new(root: Utf8PathBuf) -> Self {
        Self {
            root,
            pending: Vec::new(),
        }
    }

    /// Applies all deferred links. Must be called once the archive is fully
    /// delivered; dropping the builder without closing discards pending
    /// links.
    pub fn close(mut self) -> Result<()> {
        for link in std::mem::take(&mut self.pending) {
            match link {
                PendingLink::Symlink { path, target } => {
                    create_symlink(&self.root.join(&path), &target)?;
                }
                PendingLink::Hardlink {
                    path,
                    existing,
                    executable,
                } => {
                    let source = self.root.join(&existing);
                    let destination = self.root.join(&path);
                    fs::hard_link(&source, &destination)?;
                    if executable {
                        set_executable(&destination)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn absolute(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.root.join(path)
    }
}

impl Builder for DirectoryBuilder {
    fn add_directory(&mut self, path: &Utf8Path) -> Result<()> {
        fs::create_dir_all(self.absolute(path))?;
        Ok(())
    }

    fn add_file(
        &mut self,
        path: &Utf8Path,
        data: &mut dyn Read,
        mtime: i64,
        executable: bool,
    ) -> Result<()> {
        let destination = self.absolute(path);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&destination)?;
        io::copy(data, &mut file)?;
        drop(file);
        if executable {
            set_executable(&destination)?;
        }
        filetime::set_file_mtime(&destination, FileTime::from_unix_time(mtime, 0))?;
        Ok(())
    }

    fn add_symlink(&mut self, path: &Utf8Path, target: &str) -> Result<()> {
        self.pending.push(PendingLink::Symlink {
            path: path.to_owned(),
            target: target.to_owned(),
        });
        Ok(())
    }

    fn add_hardlink(
        &mut self,
        path: &Utf8Path,
        existing: &Utf8Path,
        executable: bool,
    ) -> Result<()> {
        self.pending.push(PendingLink::Hardlink {
            path: path.to_owned(),
            existing: existing.to_owned(),
            executable,
        });
        Ok(())
    }

    fn remove(&mut self, path: &Utf8Path) -> Result<()> {
        self.pending.retain(|link| {
            let pending_path = match link {
                PendingLink::Symlink { path, .. } => path,
                PendingLink::Hardlink { path, .. } => path,
            };
            pending_path != path && !pending_path.starts_with(path)
        });
        let absolute = self.absolute(path);
        if absolute.is_dir() {
            fs::remove_dir_all(absolute)?;
        } else if absolute.exists() {
            fs::remove_file(absolute)?;
        }
        Ok(())
    }

    fn turn_into_symlink(&mut self, path: &Utf8Path) -> Result<()> {
        let absolute = self.absolute(path);
        let target = fs::read_to_string(&absolute)?;
        fs::remove_file(&absolute)?;
        self.add_symlink(path, &target)
    }

    fn mark_as_executable(&mut self, path: &Utf8Path) -> Result<()> {
        set_executable(&self.absolute(path))
    }
}

#[cfg(unix)]
fn set_executable(path: &Utf8Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Utf8Path) -> Result<()> {
    // NTFS has no execute bit; the manifest records executability instead.
    Ok(())
}

#[cfg(unix)]
fn create_symlink(path: &Utf8Path, target: &str) -> Result<()> {
    std::os::unix::fs::symlink(target, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_symlink(path: &Utf8Path, target: &str) -> Result<()> {
    // Symlink creation needs a privilege on Windows; store the target as
    // file content, the way stores ship symlinks on this platform.
    fs::write(path, target)?;
    Ok(())
}
