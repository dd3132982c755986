//! The format-specific extractors.

use crate::errors::{ArchiveError, Result};
use crate::registry::{mime, ExtractorFactory};

mod cpio;
mod deb;
mod external;
mod gem;
mod rpm;
mod tar;
mod zip;

pub(crate) use self::tar::{decode, extract_stream, TarCompression};

/// The (MIME type, factory) table behind `ExtractorRegistry::standard`.
pub(crate) fn standard_entries() -> Vec<(&'static str, ExtractorFactory)> {
    vec![
        (mime::ZIP, || Ok(Box::new(self::zip::ZipExtractor))),
        (mime::TAR, || {
            Ok(Box::new(self::tar::TarExtractor::new(TarCompression::None)))
        }),
        (mime::TAR_GZIP, || {
            Ok(Box::new(self::tar::TarExtractor::new(TarCompression::Gzip)))
        }),
        (mime::TAR_BZIP2, || {
            Ok(Box::new(self::tar::TarExtractor::new(TarCompression::Bzip2)))
        }),
        (mime::TAR_LZMA, || {
            Ok(Box::new(self::tar::TarExtractor::new(TarCompression::Lzma)))
        }),
        (mime::TAR_LZIP, || {
            Ok(Box::new(self::tar::TarExtractor::new(TarCompression::Lzip)))
        }),
        (mime::TAR_XZ, || {
            Ok(Box::new(self::tar::TarExtractor::new(TarCompression::Xz)))
        }),
        (mime::TAR_ZSTD, || {
            Ok(Box::new(self::tar::TarExtractor::new(TarCompression::Zstd)))
        }),
        (mime::GEM, || Ok(Box::new(gem::GemExtractor))),
        (mime::SEVEN_ZIP, || {
            Ok(Box::new(external::SevenZipExtractor))
        }),
        (mime::RAR, || Ok(Box::new(external::RarExtractor))),
        (mime::CAB, || {
            require_os("cab", "Windows", cfg!(windows))?;
            Ok(Box::new(external::CabExtractor))
        }),
        (mime::MSI, || {
            require_os("msi", "Windows", cfg!(windows))?;
            Ok(Box::new(external::MsiExtractor))
        }),
        (mime::DMG, || {
            require_os("dmg", "macOS", cfg!(target_os = "macos"))?;
            Ok(Box::new(external::DmgExtractor))
        }),
        (mime::RPM, || {
            require_os("rpm", "Linux", cfg!(target_os = "linux"))?;
            Ok(Box::new(rpm::RpmExtractor))
        }),
        (mime::DEB, || {
            require_os("deb", "Linux", cfg!(target_os = "linux"))?;
            Ok(Box::new(deb::DebExtractor))
        }),
    ]
}

fn require_os(format: &'static str, os: &'static str, supported: bool) -> Result<()> {
    if supported {
        Ok(())
    } else {
        Err(ArchiveError::PlatformUnsupported { format, os })
    }
}
