//! RPM packages: `rpm2cpio` strips the lead and headers, the cpio reader
//! does the rest.

use std::io;
use std::process::Stdio;

use axoprocess::Cmd;

use crate::builder::Builder;
use crate::errors::{ArchiveError, Result};
use crate::registry::{ExtractOptions, Extractor};
use crate::stream::{ensure_file, ArchiveSource};

use super::cpio::extract_cpio;

pub(crate) struct RpmExtractor;

impl Extractor for RpmExtractor {
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        let archive = ensure_file(source)?;

        let mut cmd = Cmd::new("rpm2cpio", "unpack an rpm payload");
        cmd.arg(archive.path());
        cmd.stdout(Stdio::piped()).stderr(Stdio::null());
        let mut child = cmd.spawn()?;
        let Some(stdout) = child.stdout.take() else {
            return Err(io::Error::other("rpm2cpio child has no stdout").into());
        };

        let extracted = extract_cpio(stdout, builder, options);
        let status = child.wait()?;

        extracted?;
        if status.success() {
            Ok(())
        } else {
            Err(ArchiveError::invalid(
                format!("rpm2cpio exited with {status}"),
                None,
            ))
        }
    }
}
