//! Archive path hygiene.

use camino::Utf8PathBuf;

use crate::errors::{ArchiveError, Result};

/// Converts an archive-native path into a safe path relative to the
/// extraction root.
///
/// Leading separators and `./` prefixes are stripped and empty segments
/// dropped, so `./bin//app` and `/bin/app` both become `bin/app`. An entry
/// that normalizes to nothing (the archive root itself, or a path outside
/// `sub_dir` when one is given) yields `Ok(None)` and should be skipped.
/// Paths that try to escape the root (`..` segments, drive-qualified names on
/// Windows) are rejected.
///
/// Normalization is idempotent: feeding the result back in returns it
/// unchanged.
pub fn normalize(path: &str, sub_dir: Option<&str>) -> Result<Option<Utf8PathBuf>> {
    let mut segments = split_segments(path)?;

    if let Some(sub_dir) = sub_dir {
        let prefix = split_segments(sub_dir)?;
        if segments.len() < prefix.len() || segments[..prefix.len()] != prefix[..] {
            return Ok(None);
        }
        segments.drain(..prefix.len());
    }

    if segments.is_empty() {
        return Ok(None);
    }

    let mut normalized = Utf8PathBuf::new();
    for segment in segments {
        normalized.push(segment);
    }
    Ok(Some(normalized))
}

fn split_segments(path: &str) -> Result<Vec<&str>> {
    // '\' is a separator only on Windows; on POSIX it is an ordinary
    // filename character and must survive.
    let is_separator = |c: char| c == '/' || (cfg!(windows) && c == '\\');

    let mut segments = Vec::new();
    for segment in path.split(is_separator) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(ArchiveError::UnsafePath {
                    path: path.to_owned(),
                })
            }
            segment => {
                if cfg!(windows) && segment.contains(':') {
                    return Err(ArchiveError::UnsafePath {
                        path: path.to_owned(),
                    });
                }
                segments.push(segment);
            }
        }
    }
    Ok(segments)
}
