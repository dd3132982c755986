//! Test doubles shared by the extractor tests.

use std::io::Read;

use camino::Utf8Path;

use crate::builder::Builder;
use crate::errors::Result;

/// One recorded builder call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BuildOp {
    Dir(String),
    File {
        path: String,
        contents: Vec<u8>,
        mtime: i64,
        executable: bool,
    },
    Symlink {
        path: String,
        target: String,
    },
    Hardlink {
        path: String,
        existing: String,
        executable: bool,
    },
    Remove(String),
    TurnIntoSymlink(String),
    MarkExecutable(String),
}

/// A [`Builder`] that records every call, for asserting on extractor
/// behavior without touching the filesystem.
#[derive(Debug, Default)]
pub(crate) struct RecordingBuilder {
    pub(crate) ops: Vec<BuildOp>,
}

impl Builder for RecordingBuilder {
    fn add_directory(&mut self, path: &Utf8Path) -> Result<()> {
        self.ops.push(BuildOp::Dir(path.to_string()));
        Ok(())
    }

    fn add_file(
        &mut self,
        path: &Utf8Path,
        data: &mut dyn Read,
        mtime: i64,
        executable: bool,
    ) -> Result<()> {
        let mut contents = Vec::new();
        data.read_to_end(&mut contents)?;
        self.ops.push(BuildOp::File {
            path: path.to_string(),
            contents,
            mtime,
            executable,
        });
        Ok(())
    }

    fn add_symlink(&mut self, path: &Utf8Path, target: &str) -> Result<()> {
        self.ops.push(BuildOp::Symlink {
            path: path.to_string(),
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
        self.ops.push(BuildOp::Hardlink {
            path: path.to_string(),
            existing: existing.to_string(),
            executable,
        });
        Ok(())
    }

    fn remove(&mut self, path: &Utf8Path) -> Result<()> {
        self.ops.push(BuildOp::Remove(path.to_string()));
        Ok(())
    }

    fn turn_into_symlink(&mut self, path: &Utf8Path) -> Result<()> {
        self.ops.push(BuildOp::TurnIntoSymlink(path.to_string()));
        Ok(())
    }

    fn mark_as_executable(&mut self, path: &Utf8Path) -> Result<()> {
        self.ops.push(BuildOp::MarkExecutable(path.to_string()));
        Ok(())
    }
}
