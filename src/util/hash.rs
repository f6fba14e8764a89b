//! Hashing utilities for checksums and fingerprinting.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Fingerprint a whole directory tree: relative paths, file contents and
/// symlink targets. Two trees with equal fingerprints have identical content.
pub fn sha256_tree(root: &Path) -> Result<String> {
    let mut fp = Fingerprint::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        fp.update_str(&rel.to_string_lossy());

        let ty = entry.file_type();
        if ty.is_symlink() {
            let link = fs::read_link(entry.path())
                .with_context(|| format!("failed to read link: {}", entry.path().display()))?;
            fp.update_str("l").update_str(&link.to_string_lossy());
        } else if ty.is_file() {
            fp.update_str("f").update_file(entry.path())?;
        } else {
            fp.update_str("d");
        }
    }

    Ok(fp.finish())
}

/// A hasher for building fingerprints from multiple components.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    /// Create a new fingerprint builder.
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component to the fingerprint.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0"); // Separator
        self
    }

    /// Stream a file's contents into the fingerprint.
    pub fn update_file(&mut self, path: &Path) -> Result<&mut Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

        let mut reader = BufReader::new(file);
        let mut buffer = [0u8; 8192];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            self.hasher.update(&buffer[..bytes_read]);
        }
        Ok(self)
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_separates_components() {
        let mut a = Fingerprint::new();
        a.update_str("ab").update_str("c");
        let mut b = Fingerprint::new();
        b.update_str("a").update_str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_tree_fingerprint_tracks_content_and_names() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        for dir in [&a, &b] {
            std::fs::create_dir_all(dir.join("llvm")).unwrap();
            std::fs::write(dir.join("llvm").join("CMakeLists.txt"), "project(LLVM)").unwrap();
        }
        assert_eq!(sha256_tree(&a).unwrap(), sha256_tree(&b).unwrap());

        std::fs::write(b.join("llvm").join("CMakeLists.txt"), "project(LLVM) # patched").unwrap();
        assert_ne!(sha256_tree(&a).unwrap(), sha256_tree(&b).unwrap());

        std::fs::write(b.join("llvm").join("CMakeLists.txt"), "project(LLVM)").unwrap();
        std::fs::write(b.join("llvm").join("extra.txt"), "").unwrap();
        assert_ne!(sha256_tree(&a).unwrap(), sha256_tree(&b).unwrap());
    }
}
