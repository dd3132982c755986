//! Stream plumbing: getting bytes into the shape an extractor backend wants.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};

use camino::{Utf8Path, Utf8PathBuf};

/// The bytes of one archive, either already on disk or as an arbitrary
/// stream (a download in progress, a nested archive member).
pub enum ArchiveSource {
    /// An archive file on disk.
    File(Utf8PathBuf),
    /// An opaque byte stream.
    Stream(Box<dyn Read + Send>),
}

impl ArchiveSource {
    /// Wraps an in-memory buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ArchiveSource::Stream(Box::new(io::Cursor::new(bytes)))
    }

    /// A plain reader over the source.
    pub(crate) fn into_reader(self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            ArchiveSource::File(path) => Ok(Box::new(fs::File::open(path)?)),
            ArchiveSource::Stream(stream) => Ok(stream),
        }
    }
}

/// Exposes the source as something seekable. Streams are spooled into an
/// anonymous temporary file first; the file vanishes when the handle drops.
pub(crate) fn ensure_seekable(source: ArchiveSource) -> io::Result<fs::File> {
    match source {
        ArchiveSource::File(path) => fs::File::open(path),
        ArchiveSource::Stream(mut stream) => {
            let mut spool = tempfile::tempfile()?;
            io::copy(&mut stream, &mut spool)?;
            spool.seek(SeekFrom::Start(0))?;
            Ok(spool)
        }
    }
}

/// A source pinned to a filesystem path, for backends that only take paths.
/// Any spool file lives exactly as long as this handle.
pub(crate) struct FileSource {
    path: Utf8PathBuf,
    _spool: Option<tempfile::NamedTempFile>,
}

impl FileSource {
    pub(crate) fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// Exposes the source as a filesystem path, spooling streams to a named
/// temporary file.
pub(crate) fn ensure_file(source: ArchiveSource) -> io::Result<FileSource> {
    match source {
        ArchiveSource::File(path) => Ok(FileSource { path, _spool: None }),
        ArchiveSource::Stream(mut stream) => {
            let mut spool = tempfile::NamedTempFile::new()?;
            io::copy(&mut stream, spool.as_file_mut())?;
            let path = Utf8PathBuf::from_path_buf(spool.path().to_path_buf()).map_err(|path| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("temporary file path is not UTF-8: {}", path.display()),
                )
            })?;
            Ok(FileSource {
                path,
                _spool: Some(spool),
            })
        }
    }
}
