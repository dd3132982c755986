//! A reader for cpio "newc" streams, the payload format of rpm packages.

use std::io::{self, Read};

use crate::builder::Builder;
use crate::errors::{ArchiveError, Result};
use crate::normalize::normalize;
use crate::registry::ExtractOptions;

const HEADER_LEN: usize = 110;
const TRAILER: &str = "TRAILER!!!";

const S_IFMT: u64 = 0o170000;
const S_IFDIR: u64 = 0o040000;
const S_IFREG: u64 = 0o100000;
const S_IFLNK: u64 = 0o120000;

struct Header {
    mode: u64,
    mtime: i64,
    file_size: u64,
    name_size: u64,
}

/// Walks a newc stream into the builder. Symlinks are buffered and applied
/// after all regular entries, like the tar pipeline does.
pub(crate) fn extract_cpio(
    mut reader: impl Read,
    builder: &mut dyn Builder,
    options: &ExtractOptions,
) -> Result<()> {
    let mut links = Vec::new();

    loop {
        options.cancel.checkpoint()?;
        let Some(header) = read_header(&mut reader)? else {
            break;
        };

        let mut name_bytes = vec![0u8; header.name_size as usize];
        reader
            .read_exact(&mut name_bytes)
            .map_err(truncated)?;
        // names are NUL-terminated and the header+name block pads to 4
        name_bytes.pop();
        let name = String::from_utf8_lossy(&name_bytes).into_owned();
        skip(&mut reader, pad4(HEADER_LEN as u64 + header.name_size))?;

        if name == TRAILER {
            break;
        }

        let path = normalize(&name, options.sub_dir.as_deref())?;
        let data_pad = pad4(header.file_size);

        match (header.mode & S_IFMT, path) {
            (S_IFDIR, Some(path)) => {
                builder.add_directory(&path)?;
                skip(&mut reader, header.file_size + data_pad)?;
            }
            (S_IFLNK, Some(path)) => {
                let mut target = vec![0u8; header.file_size as usize];
                reader.read_exact(&mut target).map_err(truncated)?;
                links.push((path, String::from_utf8_lossy(&target).into_owned()));
                skip(&mut reader, data_pad)?;
            }
            (S_IFREG, Some(path)) => {
                let mut data = (&mut reader).take(header.file_size);
                builder.add_file(
                    &path,
                    &mut data,
                    header.mtime,
                    header.mode & 0o111 != 0,
                )?;
                // in case the builder stopped early
                io::copy(&mut data, &mut io::sink())?;
                skip(&mut reader, data_pad)?;
            }
            // sockets, devices, or entries outside sub_dir
            _ => skip(&mut reader, header.file_size + data_pad)?,
        }
    }

    options.cancel.checkpoint()?;
    for (path, target) in links {
        builder.add_symlink(&path, &target)?;
    }
    Ok(())
}

fn read_header(reader: &mut impl Read) -> Result<Option<Header>> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let count = reader.read(&mut header[filled..])?;
        if count == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ArchiveError::invalid("cpio header truncated", None));
        }
        filled += count;
    }

    if &header[0..6] != b"070701" && &header[0..6] != b"070702" {
        return Err(ArchiveError::invalid("cpio stream lacks the newc magic", None));
    }

    Ok(Some(Header {
        mode: field(&header, 1)?,
        mtime: field(&header, 5)? as i64,
        file_size: field(&header, 6)?,
        name_size: field(&header, 11)?,
    }))
}

/// The `index`th 8-digit hex field after the magic.
fn field(header: &[u8; HEADER_LEN], index: usize) -> Result<u64> {
    let start = 6 + index * 8;
    let digits = std::str::from_utf8(&header[start..start + 8])
        .map_err(|_| ArchiveError::invalid("cpio header not ASCII", None))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| ArchiveError::invalid("cpio header field not hex", None))
}

/// Bytes of padding needed to reach the next 4-byte boundary.
fn pad4(position: u64) -> u64 {
    (4 - position % 4) % 4
}

fn skip(reader: &mut impl Read, count: u64) -> Result<()> {
    io::copy(&mut reader.take(count), &mut io::sink())?;
    Ok(())
}

fn truncated(cause: io::Error) -> ArchiveError {
    ArchiveError::invalid("cpio entry truncated", Some(Box::new(cause)))
}
