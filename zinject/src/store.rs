//! The implementation-store contract the executor consumes.
//!
//! The store itself (how implementations get fetched, verified and laid
//! out) lives elsewhere; the execution core only needs to turn a manifest
//! digest into a directory.

use camino::Utf8PathBuf;
use zinject_selections::ManifestDigest;

/// Maps manifest digests to cached implementation directories.
pub trait ImplementationStore {
    /// The directory holding the implementation with this digest, or `None`
    /// if it is not cached.
    fn path_for(&self, digest: &ManifestDigest) -> Option<Utf8PathBuf>;
}

/// A store made of one or more directories whose children are named after
/// digests, searched in order.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    roots: Vec<Utf8PathBuf>,
}

impl DirectoryStore {
    /// A store over the given root directories.
    pub fn new(roots: Vec<Utf8PathBuf>) -> Self {
        Self { roots }
    }

    /// The roots this store searches.
    pub fn roots(&self) -> &[Utf8PathBuf] {
        &self.roots
    }
}

impl ImplementationStore for DirectoryStore {
    fn path_for(&self, digest: &ManifestDigest) -> Option<Utf8PathBuf> {
        for root in &self.roots {
            for name in digest.names() {
                let candidate = root.join(&name);
                if candidate.is_dir() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}
