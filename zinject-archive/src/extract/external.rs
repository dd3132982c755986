//! Formats unpacked by the platform's own utilities.
//!
//! 7z, rar, cab, msi and dmg have no in-process decoder here; their
//! extractors drive the standard utility for the format into a scoped
//! staging directory and then ingest that directory into the builder.
//! Filter-style tools (`lzip`, `rpm2cpio`) instead stream: a background
//! thread pumps the archive into the child's stdin while the extraction
//! pipeline consumes its stdout, and the pump is joined when the stream
//! closes.

use std::fs;
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Stdio};
use std::thread::JoinHandle;
use std::time::UNIX_EPOCH;

use axoprocess::Cmd;
use camino::Utf8Path;
use temp_dir::TempDir;

use crate::builder::Builder;
use crate::errors::{ArchiveError, Result};
use crate::normalize::normalize;
use crate::registry::{ExtractOptions, Extractor};
use crate::stream::{ensure_file, ArchiveSource};

/// A running filter child plus the thread feeding its stdin.
pub(crate) struct Filter {
    child: Child,
    pump: Option<JoinHandle<io::Result<u64>>>,
}

/// Spawns `program` with the given arguments, streaming `input` into its
/// stdin from a background thread. Returns the child's stdout and a guard
/// that must be [`Filter::finish`]ed after the stdout has been drained.
pub(crate) fn filter_through(
    program: &str,
    args: &[&str],
    mut input: Box<dyn Read + Send>,
    summary: &str,
) -> Result<(ChildStdout, Filter)> {
    let mut cmd = Cmd::new(program, summary);
    for arg in args {
        cmd.arg(arg);
    }
    cmd.stdin(Stdio::piped()).stdout(Stdio::piped());
    let mut child = cmd.spawn()?;

    let Some(mut stdin) = child.stdin.take() else {
        return Err(io::Error::other("filter child has no stdin").into());
    };
    let Some(stdout) = child.stdout.take() else {
        return Err(io::Error::other("filter child has no stdout").into());
    };
    let pump = std::thread::spawn(move || {
        let copied = io::copy(&mut input, &mut stdin);
        drop(stdin);
        copied
    });

    Ok((
        stdout,
        Filter {
            child,
            pump: Some(pump),
        },
    ))
}

impl Filter {
    /// Joins the pump thread and reaps the child, surfacing a decoder
    /// failure as an invalid archive.
    pub(crate) fn finish(mut self) -> Result<()> {
        if let Some(pump) = self.pump.take() {
            match pump.join() {
                Ok(Ok(_)) => {}
                // the decoder closed its stdin early; its exit status decides
                Ok(Err(error)) if error.kind() == io::ErrorKind::BrokenPipe => {}
                Ok(Err(error)) => return Err(error.into()),
                Err(_) => return Err(ArchiveError::invalid("stream pump panicked", None)),
            }
        }
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(ArchiveError::invalid(
                format!("decoder exited with {status}"),
                None,
            ))
        }
    }
}

impl Drop for Filter {
    fn drop(&mut self) {
        // finish() was skipped (an error mid-stream); don't leave the child
        if self.pump.is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Runs a tool that unpacks into a staging directory, then feeds the
/// staging tree to the builder.
fn extract_with_tool(
    builder: &mut dyn Builder,
    options: &ExtractOptions,
    source: ArchiveSource,
    make_cmd: impl FnOnce(&Utf8Path, &Utf8Path) -> Cmd,
) -> Result<()> {
    let archive = ensure_file(source)?;
    let staging = TempDir::new()?;
    let staging_path = Utf8Path::from_path(staging.path()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            "staging directory path is not UTF-8",
        )
    })?;

    let mut cmd = make_cmd(archive.path(), staging_path);
    cmd.stdout(Stdio::null());
    cmd.run()?;

    ingest_directory(staging_path, builder, options)
}

/// Feeds a directory tree produced by an external tool to the builder, in
/// deterministic (byte-sorted) order, symlinks last.
pub(crate) fn ingest_directory(
    root: &Utf8Path,
    builder: &mut dyn Builder,
    options: &ExtractOptions,
) -> Result<()> {
    let mut links = Vec::new();

    for entry in walkdir::WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
    {
        options.cancel.checkpoint()?;
        let entry =
            entry.map_err(|cause| ArchiveError::invalid("unpacked tree unreadable", Some(Box::new(cause))))?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|cause| ArchiveError::invalid("unpacked tree escaped staging", Some(Box::new(cause))))?;
        let Some(relative) = relative.to_str() else {
            return Err(ArchiveError::invalid(
                format!("unpacked entry has a non-UTF-8 name: {}", relative.display()),
                None,
            ));
        };
        let Some(path) = normalize(relative, options.sub_dir.as_deref())? else {
            continue;
        };

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            links.push((path, target.to_string_lossy().into_owned()));
        } else if file_type.is_dir() {
            builder.add_directory(&path)?;
        } else {
            let metadata = entry
                .metadata()
                .map_err(|cause| ArchiveError::invalid("unpacked tree unreadable", Some(Box::new(cause))))?;
            let mtime = metadata
                .modified()?
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs() as i64)
                .unwrap_or(0);
            let mut file = fs::File::open(entry.path())?;
            builder.add_file(&path, &mut file, mtime, is_executable(&metadata))?;
        }
    }

    for (path, target) in links {
        builder.add_symlink(&path, &target)?;
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

pub(crate) struct SevenZipExtractor;

impl Extractor for SevenZipExtractor {
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        extract_with_tool(builder, options, source, |archive, staging| {
            let mut cmd = Cmd::new("7z", "unpack a 7z archive");
            cmd.arg("x").arg("-y").arg(format!("-o{staging}")).arg(archive);
            cmd
        })
    }
}

pub(crate) struct RarExtractor;

impl Extractor for RarExtractor {
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        extract_with_tool(builder, options, source, |archive, staging| {
            let mut cmd = Cmd::new("unrar", "unpack a rar archive");
            // unrar wants the trailing separator to treat it as a directory
            cmd.arg("x").arg("-y").arg(archive).arg(format!("{staging}/"));
            cmd
        })
    }
}

pub(crate) struct CabExtractor;

impl Extractor for CabExtractor {
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        extract_with_tool(builder, options, source, |archive, staging| {
            let mut cmd = Cmd::new("expand.exe", "unpack a cab archive");
            cmd.arg("-F:*").arg(archive).arg(staging);
            cmd
        })
    }
}

pub(crate) struct MsiExtractor;

impl Extractor for MsiExtractor {
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        let archive = ensure_file(source)?;
        let staging = TempDir::new()?;
        let staging_path = Utf8Path::from_path(staging.path()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "staging directory path is not UTF-8",
            )
        })?;

        // An administrative install unpacks every cabinet stream with the
        // File-table names already applied.
        let mut cmd = Cmd::new("msiexec", "unpack an msi installer");
        cmd.arg("/a")
            .arg(archive.path())
            .arg("/qn")
            .arg(format!("TARGETDIR={staging_path}"));
        cmd.stdout(Stdio::null());
        cmd.run()?;

        // msiexec also copies the package itself into the image; that copy
        // is not part of the implementation.
        if let Some(name) = archive.path().file_name() {
            let copied = staging_path.join(name);
            if copied.exists() {
                fs::remove_file(copied)?;
            }
        }

        ingest_directory(staging_path, builder, options)
    }
}

pub(crate) struct DmgExtractor;

impl Extractor for DmgExtractor {
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        let archive = ensure_file(source)?;
        let mount = TempDir::new()?;
        let mount_path = Utf8Path::from_path(mount.path()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "mount point path is not UTF-8")
        })?;

        let mut attach = Cmd::new("hdiutil", "attach a disk image");
        attach
            .arg("attach")
            .arg("-quiet")
            .arg("-nobrowse")
            .arg("-readonly")
            .arg("-mountpoint")
            .arg(mount_path)
            .arg(archive.path());
        attach.run()?;

        let ingested = ingest_directory(mount_path, builder, options);

        let mut detach = Cmd::new("hdiutil", "detach a disk image");
        detach.arg("detach").arg("-quiet").arg(mount_path);
        let detached = detach.run();

        ingested?;
        detached?;
        Ok(())
    }
}
