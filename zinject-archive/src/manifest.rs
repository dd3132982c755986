//! Canonical implementation manifests and the digests derived from them.
//!
//! A manifest is an ordered listing of every entry in an implementation
//! directory: one line per regular file (`F`), executable (`X`) or symlink
//! (`S`), and a `D` line introducing each subdirectory before its contents.
//! The digest of the manifest text is the implementation's content address
//! and names its store directory.

use std::fs;
use std::io::Read;
use std::time::UNIX_EPOCH;

use camino::Utf8Path;
use sha2::{Digest as _, Sha256};

use crate::errors::{ArchiveError, Result};

/// Digest algorithms this crate can compute.
///
/// `sha1new` ids are still *parsed* for old stores, but never generated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// sha256 over the manifest, hex-encoded: `sha256=…`
    Sha256,
    /// sha256 over the manifest, base32-encoded: `sha256new_…` (the default)
    Sha256New,
}

impl DigestAlgorithm {
    /// Recognizes the algorithm prefix of a store directory name.
    pub fn from_digest_name(name: &str) -> Option<Self> {
        if name.starts_with("sha256new_") {
            Some(DigestAlgorithm::Sha256New)
        } else if name.starts_with("sha256=") {
            Some(DigestAlgorithm::Sha256)
        } else {
            None
        }
    }

    /// Formats a raw manifest hash as a store directory name.
    pub fn format(&self, hash: &[u8]) -> String {
        match self {
            DigestAlgorithm::Sha256 => format!("sha256={}", hex(hash)),
            DigestAlgorithm::Sha256New => format!("sha256new_{}", base32(hash)),
        }
    }
}

/// Generates the manifest text for a directory tree.
///
/// Entries within a directory are listed in byte order of their names,
/// regular entries before subdirectories, so the text (and therefore the
/// digest) is independent of filesystem iteration order.
pub fn generate(root: &Utf8Path) -> Result<String> {
    let mut manifest = String::new();
    generate_directory(root, Utf8Path::new(""), &mut manifest)?;
    Ok(manifest)
}

/// Computes the store directory name for a directory tree.
pub fn digest_directory(root: &Utf8Path, algorithm: DigestAlgorithm) -> Result<String> {
    let manifest = generate(root)?;
    Ok(algorithm.format(&Sha256::digest(manifest.as_bytes())))
}

/// Verifies a directory tree against an expected store directory name.
pub fn verify(root: &Utf8Path, expected: &str) -> Result<()> {
    let algorithm = DigestAlgorithm::from_digest_name(expected).ok_or_else(|| {
        ArchiveError::invalid(format!("cannot verify digests of type {expected:?}"), None)
    })?;
    let actual = digest_directory(root, algorithm)?;
    if actual == expected {
        Ok(())
    } else {
        Err(ArchiveError::DigestMismatch {
            expected: expected.to_owned(),
            actual,
        })
    }
}

fn generate_directory(directory: &Utf8Path, relative: &Utf8Path, manifest: &mut String) -> Result<()> {
    let mut entries = Vec::new();
    for entry in directory.read_dir_utf8()? {
        entries.push(entry?);
    }
    entries.sort_by(|a, b| a.file_name().cmp(b.file_name()));

    let mut subdirectories = Vec::new();
    for entry in entries {
        let name = entry.file_name();
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            let target = target.to_string_lossy();
            let hash = hex(&Sha256::digest(target.as_bytes()));
            manifest.push_str(&format!("S {hash} {} {name}\n", target.len()));
        } else if file_type.is_dir() {
            subdirectories.push(entry);
        } else {
            let metadata = entry.metadata()?;
            let mtime = metadata
                .modified()?
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs() as i64)
                .unwrap_or(0);
            let kind = if is_executable(&metadata) { 'X' } else { 'F' };
            let hash = hex(&hash_file(entry.path())?);
            manifest.push_str(&format!("{kind} {hash} {mtime} {} {name}\n", metadata.len()));
        }
    }

    for entry in subdirectories {
        let child = relative.join(entry.file_name());
        // manifest paths always use forward slashes, whatever the host
        let unix_path = child
            .as_str()
            .split(std::path::MAIN_SEPARATOR)
            .collect::<Vec<_>>()
            .join("/");
        manifest.push_str(&format!("D /{unix_path}\n"));
        generate_directory(entry.path(), &child, manifest)?;
    }

    Ok(())
}

fn hash_file(path: &Utf8Path) -> Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }
    Ok(hasher.finalize().to_vec())
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// RFC 4648 base32 without padding, as used in `sha256new_` names.
fn base32(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    let mut output = String::new();
    let mut buffer: u64 = 0;
    let mut bits = 0;
    for &byte in bytes {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            output.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        output.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    fn write(root: &Utf8Path, path: &str, contents: &str) {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn utf8_root(dir: &TempDir) -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn manifest_lists_directories_before_their_contents() {
        let dir = TempDir::new().unwrap();
        let root = utf8_root(&dir);
        write(&root, "readme", "docs");
        write(&root, "lib/code.py", "print()");

        let manifest = generate(&root).unwrap();
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("F "), "{manifest}");
        assert!(lines[0].ends_with(" readme"), "{manifest}");
        assert_eq!(lines[1], "D /lib");
        assert!(lines[2].ends_with(" code.py"), "{manifest}");
    }

    #[test]
    fn digest_is_stable_and_ignores_iteration_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let first_root = utf8_root(&first);
        let second_root = utf8_root(&second);
        // create in different orders
        write(&first_root, "a", "one");
        write(&first_root, "b", "two");
        write(&second_root, "b", "two");
        write(&second_root, "a", "one");
        // pin mtimes so the digests can agree
        for root in [&first_root, &second_root] {
            for name in ["a", "b"] {
                filetime::set_file_mtime(
                    root.join(name),
                    filetime::FileTime::from_unix_time(1_600_000_000, 0),
                )
                .unwrap();
            }
        }

        let lhs = digest_directory(&first_root, DigestAlgorithm::Sha256New).unwrap();
        let rhs = digest_directory(&second_root, DigestAlgorithm::Sha256New).unwrap();
        assert_eq!(lhs, rhs);
        assert!(lhs.starts_with("sha256new_"), "{lhs}");
    }

    #[test]
    fn verify_detects_tampering() {
        let dir = TempDir::new().unwrap();
        let root = utf8_root(&dir);
        write(&root, "data", "original");
        let digest = digest_directory(&root, DigestAlgorithm::Sha256New).unwrap();
        verify(&root, &digest).unwrap();

        write(&root, "data", "tampered");
        let error = verify(&root, &digest).unwrap_err();
        assert!(matches!(error, ArchiveError::DigestMismatch { .. }));
        assert_eq!(error.exit_code(), 26);
    }

    #[test]
    fn base32_matches_rfc_vectors() {
        assert_eq!(base32(b""), "");
        assert_eq!(base32(b"f"), "MY");
        assert_eq!(base32(b"fo"), "MZXQ");
        assert_eq!(base32(b"foo"), "MZXW6");
        assert_eq!(base32(b"foob"), "MZXW6YQ");
        assert_eq!(base32(b"fooba"), "MZXW6YTB");
        assert_eq!(base32(b"foobar"), "MZXW6YTBOI");
    }
}
