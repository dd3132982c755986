//! Zip archives.
//!
//! Extraction makes two passes over the archive: the first streams every
//! entry's content to the builder, the second walks the central directory
//! and applies per-entry attributes (Unix symlink modes become symlinks,
//! execute bits mark executables). Timestamps come from the Info-ZIP Unix
//! extra field (tag `0x5855`) when present, falling back to the DOS
//! timestamp every entry carries.

use crate::builder::Builder;
use crate::errors::{ArchiveError, Result};
use crate::normalize::normalize;
use crate::registry::{ExtractOptions, Extractor};
use crate::stream::{ensure_seekable, ArchiveSource};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

pub(crate) struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        let file = ensure_seekable(source)?;
        let mut archive = zip::ZipArchive::new(file).map_err(zip_invalid)?;

        for index in 0..archive.len() {
            options.cancel.checkpoint()?;
            let mut entry = archive.by_index(index).map_err(zip_invalid)?;
            let raw_path = entry.name().to_owned();
            let Some(path) = normalize(&raw_path, options.sub_dir.as_deref())? else {
                continue;
            };
            if entry.is_dir() {
                builder.add_directory(&path)?;
            } else {
                let extra = entry.extra_data().map(|data| data.to_vec());
                let mtime = unix_mtime(extra.as_deref(), entry.last_modified());
                builder.add_file(&path, &mut entry, mtime, false)?;
            }
        }

        for index in 0..archive.len() {
            options.cancel.checkpoint()?;
            let entry = archive.by_index(index).map_err(zip_invalid)?;
            let raw_path = entry.name().to_owned();
            let Some(path) = normalize(&raw_path, options.sub_dir.as_deref())? else {
                continue;
            };
            let Some(mode) = entry.unix_mode() else {
                continue;
            };
            if mode & S_IFMT == S_IFLNK {
                builder.turn_into_symlink(&path)?;
            } else if entry.is_file() && mode & 0o111 != 0 {
                builder.mark_as_executable(&path)?;
            }
        }

        Ok(())
    }
}

fn zip_invalid(cause: zip::result::ZipError) -> ArchiveError {
    ArchiveError::invalid("zip archive corrupt", Some(Box::new(cause)))
}

fn unix_mtime(extra: Option<&[u8]>, fallback: Option<zip::DateTime>) -> i64 {
    if let Some(extra) = extra {
        if let Some(mtime) = info_zip_timestamp(extra) {
            return mtime;
        }
    }
    fallback.map(dos_to_unix).unwrap_or(0)
}

/// Scans an extra-field blob for the Info-ZIP Unix field (tag `0x5855`):
/// access time then modification time, each a little-endian 32-bit stamp.
/// The central-directory copy may carry a single stamp.
fn info_zip_timestamp(mut extra: &[u8]) -> Option<i64> {
    while extra.len() >= 4 {
        let tag = u16::from_le_bytes([extra[0], extra[1]]);
        let size = usize::from(u16::from_le_bytes([extra[2], extra[3]]));
        let data = extra.get(4..4 + size)?;
        if tag == 0x5855 {
            return if data.len() >= 8 {
                Some(i64::from(i32::from_le_bytes([
                    data[4], data[5], data[6], data[7],
                ])))
            } else if data.len() >= 4 {
                Some(i64::from(i32::from_le_bytes([
                    data[0], data[1], data[2], data[3],
                ])))
            } else {
                None
            };
        }
        extra = &extra[4 + size..];
    }
    None
}

fn dos_to_unix(stamp: zip::DateTime) -> i64 {
    let days = days_from_civil(
        i64::from(stamp.year()),
        i64::from(stamp.month()),
        i64::from(stamp.day()),
    );
    days * 86_400
        + i64::from(stamp.hour()) * 3_600
        + i64::from(stamp.minute()) * 60
        + i64::from(stamp.second())
}

/// Days between 1970-01-01 and the given civil date (proleptic Gregorian).
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let day_of_year = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}
