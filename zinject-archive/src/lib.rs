#![deny(missing_docs)]

//! # zinject-archive
//!
//! Turns archive byte streams, tagged by MIME type, into canonical
//! implementation directories. An [`ExtractorRegistry`] maps MIME types to
//! format-specific extractors; every extractor delivers a normalized stream
//! of directory/file/link operations to a [`builder::Builder`] sink, which is
//! what a store uses to materialize (and later digest) an implementation.
//!
//! ```no_run
//! # use zinject_archive::{builder::DirectoryBuilder, ArchiveSource, ExtractOptions, ExtractorRegistry, mime};
//! # fn main() -> Result<(), zinject_archive::errors::ArchiveError> {
//! let registry = ExtractorRegistry::standard();
//! let mut builder = DirectoryBuilder::new("/tmp/impl".into());
//! registry.extract(
//!     mime::TAR_GZ,
//!     ArchiveSource::File("app-1.0.tar.gz".into()),
//!     &mut builder,
//!     &ExtractOptions::default(),
//! )?;
//! builder.close()?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cancel;
pub mod errors;
mod extract;
pub mod manifest;
mod normalize;
mod registry;
mod stream;

pub use normalize::normalize;
pub use registry::{mime, ExtractOptions, Extractor, ExtractorFactory, ExtractorRegistry};
pub use stream::ArchiveSource;

#[cfg(test)]
pub(crate) mod testing;
