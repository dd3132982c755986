//! Ruby gems: an outer uncompressed tar whose `data.tar.gz` member holds
//! the actual payload.

use flate2::read::GzDecoder;

use crate::builder::Builder;
use crate::errors::{ArchiveError, Result};
use crate::registry::{ExtractOptions, Extractor};
use crate::stream::ArchiveSource;

use super::extract_stream;

pub(crate) struct GemExtractor;

impl Extractor for GemExtractor {
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        let reader = source.into_reader()?;
        let mut outer = tar::Archive::new(reader);
        let entries = outer
            .entries()
            .map_err(|cause| ArchiveError::invalid("gem outer tar corrupt", Some(Box::new(cause))))?;

        for entry in entries {
            options.cancel.checkpoint()?;
            let entry =
                entry.map_err(|cause| ArchiveError::invalid("gem outer tar corrupt", Some(Box::new(cause))))?;
            let is_payload = {
                let path = entry.path_bytes();
                path.as_ref() == b"data.tar.gz"
            };
            if is_payload {
                return extract_stream(GzDecoder::new(entry), builder, options);
            }
        }

        Err(ArchiveError::invalid("gem has no data.tar.gz member", None))
    }
}
