//! The MIME type → extractor registry.
//!
//! The registry is an explicit value, constructed once and threaded through
//! to whoever retrieves implementations; there is no process-wide global.
//! [`ExtractorRegistry::standard`] knows every format the pipeline ships;
//! platform-bound formats (cab/msi on Windows, rpm/deb on Linux, dmg on
//! macOS) are registered everywhere but fail with a platform error at
//! construction time elsewhere.

use std::collections::BTreeMap;

use crate::builder::Builder;
use crate::cancel::Cancellation;
use crate::errors::{ArchiveError, Result};
use crate::extract;
use crate::stream::ArchiveSource;

/// Well-known archive MIME types.
pub mod mime {
    /// .zip
    pub const ZIP: &str = "application/zip";
    /// plain .tar
    pub const TAR: &str = "application/x-tar";
    /// .tar.gz
    pub const TAR_GZIP: &str = "application/x-compressed-tar";
    /// .tar.bz2
    pub const TAR_BZIP2: &str = "application/x-bzip-compressed-tar";
    /// .tar.lzma
    pub const TAR_LZMA: &str = "application/x-lzma-compressed-tar";
    /// .tar.lz
    pub const TAR_LZIP: &str = "application/x-lzip-compressed-tar";
    /// .tar.xz
    pub const TAR_XZ: &str = "application/x-xz-compressed-tar";
    /// .tar.zst
    pub const TAR_ZSTD: &str = "application/x-zstd-compressed-tar";
    /// alias kept for feeds produced before TAR_GZIP settled
    pub const TAR_GZ: &str = TAR_GZIP;
    /// .7z
    pub const SEVEN_ZIP: &str = "application/x-7z-compressed";
    /// .rar
    pub const RAR: &str = "application/vnd.rar";
    /// .cab
    pub const CAB: &str = "application/vnd.ms-cab-compressed";
    /// .msi
    pub const MSI: &str = "application/x-msi";
    /// .dmg
    pub const DMG: &str = "application/x-apple-diskimage";
    /// .rpm
    pub const RPM: &str = "application/x-rpm";
    /// .deb
    pub const DEB: &str = "application/x-deb";
    /// .gem
    pub const GEM: &str = "application/x-ruby-gem";
}

/// Options for one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Only extract entries below this archive-relative directory, stripping
    /// the prefix.
    pub sub_dir: Option<String>,
    /// Token checked at every entry boundary.
    pub cancel: Cancellation,
}

/// One archive format's decoder, driving a [`Builder`].
pub trait Extractor {
    /// Decodes `source` and delivers its entries to `builder`.
    fn extract(
        &self,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()>;
}

impl std::fmt::Debug for dyn Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Extractor")
    }
}

/// Creates an extractor, or fails if the format cannot work here (wrong OS,
/// helper tooling known to be absent).
pub type ExtractorFactory = fn() -> Result<Box<dyn Extractor>>;

/// Maps MIME types to extractor factories.
pub struct ExtractorRegistry {
    factories: BTreeMap<String, ExtractorFactory>,
}

impl ExtractorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with every format the pipeline ships.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for (mime_type, factory) in extract::standard_entries() {
            registry.register(mime_type, factory);
        }
        registry
    }

    /// Registers (or replaces) the factory for a MIME type.
    pub fn register(&mut self, mime_type: &str, factory: ExtractorFactory) {
        self.factories.insert(mime_type.to_owned(), factory);
    }

    /// Whether anything is registered for this MIME type (it may still be
    /// platform-gated).
    pub fn contains(&self, mime_type: &str) -> bool {
        self.factories.contains_key(mime_type)
    }

    /// Constructs the extractor for a MIME type.
    pub fn get(&self, mime_type: &str) -> Result<Box<dyn Extractor>> {
        let factory = self
            .factories
            .get(mime_type)
            .ok_or_else(|| ArchiveError::UnknownMimeType {
                mime_type: mime_type.to_owned(),
            })?;
        factory()
    }

    /// Convenience: construct the extractor and run it.
    pub fn extract(
        &self,
        mime_type: &str,
        source: ArchiveSource,
        builder: &mut dyn Builder,
        options: &ExtractOptions,
    ) -> Result<()> {
        tracing::debug!("extracting {mime_type} archive");
        self.get(mime_type)?.extract(source, builder, options)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
