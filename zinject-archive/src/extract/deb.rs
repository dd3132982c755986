//! Debian packages: a Unix `ar` container whose `data.tar.*` member holds
//! the filesystem payload.
//!
//! The `ar` header layout is fixed-width and tiny, so it is parsed here
//! directly; the payload goes through the regular tar pipeline.

use std::io::{self, Read};

use crate::builder::Builder;
use crate::errors::{ArchiveError, Result};
use crate::registry::{ExtractOptions, Extractor};
use crate::stream::ArchiveSource;

use super::{decode, extract_stream, TarCompression};

const AR_MAGIC: &[u8; 8] = b"!<arch>\n";
const AR_HEADER_LEN: usize = 60;

pub(crate) struct DebExtractor;

impl Extractor for DebExtractor {
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        let mut reader = source.into_reader()?;

        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|cause| ArchiveError::invalid("deb too short for its magic", Some(Box::new(cause))))?;
        if &magic != AR_MAGIC {
            return Err(ArchiveError::invalid("deb lacks the ar magic", None));
        }

        while let Some(header) = read_member_header(&mut reader)? {
            options.cancel.checkpoint()?;
            let (name, size) = parse_member_header(&header)?;

            if let Some(compression) = payload_compression(&name) {
                let member = (&mut reader).take(size);
                let decoded = decode(Box::new(member), compression)?;
                return extract_stream(decoded, builder, options);
            }

            // skip this member plus its alignment byte
            let skip = size + size % 2;
            io::copy(&mut (&mut reader).take(skip), &mut io::sink())?;
        }

        Err(ArchiveError::invalid("deb has no data.tar member", None))
    }
}

/// Reads the next 60-byte member header. A clean EOF at a header boundary
/// ends the archive.
fn read_member_header(reader: &mut dyn Read) -> Result<Option<[u8; AR_HEADER_LEN]>> {
    let mut header = [0u8; AR_HEADER_LEN];
    let mut filled = 0;
    while filled < AR_HEADER_LEN {
        let count = reader.read(&mut header[filled..])?;
        if count == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ArchiveError::invalid("deb member header truncated", None));
        }
        filled += count;
    }
    Ok(Some(header))
}

fn parse_member_header(header: &[u8; AR_HEADER_LEN]) -> Result<(String, u64)> {
    if &header[58..60] != b"`\n" {
        return Err(ArchiveError::invalid("deb member header corrupt", None));
    }
    let name = std::str::from_utf8(&header[0..16])
        .map_err(|cause| ArchiveError::invalid("deb member name not UTF-8", Some(Box::new(cause))))?
        .trim_end()
        .trim_end_matches('/') // GNU ar terminates names with '/'
        .to_owned();
    let size = std::str::from_utf8(&header[48..58])
        .ok()
        .map(str::trim)
        .and_then(|digits| digits.parse::<u64>().ok())
        .ok_or_else(|| ArchiveError::invalid("deb member size corrupt", None))?;
    Ok((name, size))
}

fn payload_compression(name: &str) -> Option<TarCompression> {
    match name {
        "data.tar" => Some(TarCompression::None),
        "data.tar.gz" => Some(TarCompression::Gzip),
        "data.tar.bz2" => Some(TarCompression::Bzip2),
        "data.tar.lzma" => Some(TarCompression::Lzma),
        "data.tar.xz" => Some(TarCompression::Xz),
        "data.tar.zst" => Some(TarCompression::Zstd),
        _ => None,
    }
}
