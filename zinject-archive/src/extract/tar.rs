//! The tar family: plain tar plus its compressed variants.

use std::io::Read;

use camino::Utf8PathBuf;
use tar::EntryType;

use crate::builder::Builder;
use crate::errors::{ArchiveError, Result};
use crate::normalize::normalize;
use crate::registry::{ExtractOptions, Extractor};
use crate::stream::ArchiveSource;

use super::external::filter_through;

/// How the tar stream is wrapped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum TarCompression {
    /// Bare tar.
    None,
    /// gzip (.tar.gz)
    Gzip,
    /// bzip2 (.tar.bz2)
    Bzip2,
    /// raw LZMA (.tar.lzma)
    Lzma,
    /// xz (.tar.xz)
    Xz,
    /// zstandard (.tar.zst)
    Zstd,
    /// lzip (.tar.lz); decoded by the external `lzip` utility
    Lzip,
}

pub(crate) struct TarExtractor {
    compression: TarCompression,
}

impl TarExtractor {
    pub(crate) fn new(compression: TarCompression) -> Self {
        Self { compression }
    }
}

impl Extractor for TarExtractor {
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        let raw = source.into_reader()?;
        if self.compression == TarCompression::Lzip {
            let (stdout, filter) =
                filter_through("lzip", &["-dc"], raw, "decompress an lzip stream")?;
            extract_stream(stdout, builder, options)?;
            filter.finish()
        } else {
            let decoded = decode(raw, self.compression)?;
            extract_stream(decoded, builder, options)
        }
    }
}

/// Wraps a reader in the matching in-process decompressor. Lzip has no
/// in-process decoder and is handled by the caller.
pub(crate) fn decode<'r>(
    reader: Box<dyn Read + Send + 'r>,
    compression: TarCompression,
) -> Result<Box<dyn Read + Send + 'r>> {
    Ok(match compression {
        TarCompression::None => reader,
        TarCompression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
        TarCompression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
        TarCompression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
        TarCompression::Lzma => {
            let lzma = xz2::stream::Stream::new_lzma_decoder(u64::MAX)
                .map_err(|cause| tar_invalid("cannot initialize the LZMA decoder", cause))?;
            Box::new(xz2::read::XzDecoder::new_stream(reader, lzma))
        }
        TarCompression::Zstd => Box::new(
            zstd::stream::read::Decoder::new(reader)
                .map_err(|cause| tar_invalid("cannot initialize the zstd decoder", cause))?,
        ),
        TarCompression::Lzip => {
            return Err(ArchiveError::invalid(
                "lzip streams need the external decoder",
                None,
            ))
        }
    })
}

enum PendingLink {
    Symlink {
        path: Utf8PathBuf,
        target: String,
    },
    Hardlink {
        path: Utf8PathBuf,
        target: Utf8PathBuf,
        executable: bool,
    },
}

/// Walks a decoded tar stream into the builder.
///
/// Symlinks and hardlinks are buffered and delivered after every regular
/// entry, in their original relative order, so their targets exist by the
/// time they apply. Hardlink targets are normalized into the extracted tree;
/// symlink targets are deliberately stored untouched.
pub(crate) fn extract_stream(
    reader: impl Read,
    builder: &mut dyn Builder,
    options: &ExtractOptions,
) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|cause| tar_invalid("tar stream corrupt", cause))?;

    let mut links = Vec::new();
    for entry in entries {
        options.cancel.checkpoint()?;
        let mut entry = entry.map_err(|cause| tar_invalid("tar stream corrupt", cause))?;

        let raw_path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let Some(path) = normalize(&raw_path, options.sub_dir.as_deref())? else {
            continue;
        };

        let header = entry.header();
        let entry_type = header.entry_type();
        let mode = header
            .mode()
            .map_err(|cause| tar_invalid("tar header corrupt", cause))?;
        let mtime = header
            .mtime()
            .map_err(|cause| tar_invalid("tar header corrupt", cause))? as i64;
        let executable = mode & 0o111 != 0;

        match entry_type {
            EntryType::Directory => builder.add_directory(&path)?,
            EntryType::Symlink => {
                let target = link_target(&entry)?;
                links.push(PendingLink::Symlink { path, target });
            }
            EntryType::Link => {
                let raw_target = link_target(&entry)?;
                let target = match normalize(&raw_target, options.sub_dir.as_deref()) {
                    Ok(Some(target)) => target,
                    Ok(None) | Err(ArchiveError::UnsafePath { .. }) => {
                        return Err(ArchiveError::invalid(
                            format!("hardlink target {raw_target:?} lies outside the extracted tree"),
                            None,
                        ))
                    }
                    Err(error) => return Err(error),
                };
                links.push(PendingLink::Hardlink {
                    path,
                    target,
                    executable,
                });
            }
            kind if kind.is_file() => builder.add_file(&path, &mut entry, mtime, executable)?,
            // device nodes and fifos have no place in an implementation
            _ => {}
        }
    }

    options.cancel.checkpoint()?;
    for link in links {
        match link {
            PendingLink::Symlink { path, target } => builder.add_symlink(&path, &target)?,
            PendingLink::Hardlink {
                path,
                target,
                executable,
            } => builder.add_hardlink(&path, &target, executable)?,
        }
    }
    Ok(())
}

fn link_target<R: Read>(entry: &tar::Entry<R>) -> Result<String> {
    let bytes = entry
        .link_name_bytes()
        .ok_or_else(|| ArchiveError::invalid("link entry has no target", None))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn tar_invalid(
    reason: &str,
    cause: impl std::error::Error + Send + Sync + 'static,
) -> ArchiveError {
    ArchiveError::invalid(reason, Some(Box::new(cause)))
}
