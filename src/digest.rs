// src/digest.rs

use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

pub const SHA256_PREFIX: &str = "sha256:";

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Incremental `sha256:<hex>` digest.
#[derive(Debug, Clone, Default)]
pub struct Digester {
    hasher: Sha256,
}

impl Digester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finish(self) -> String {
        format!("{}{:x}", SHA256_PREFIX, self.hasher.finalize())
    }
}

/// Digest of an in-memory blob.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut digester = Digester::new();
    digester.update(data);
    digester.finish()
}

/// Digest and size of a file, read asynchronously in chunks.
pub async fn sha256_file(path: &Path) -> Result<(String, u64), DigestError> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut digester = Digester::new();
    let mut buffer = [0u8; 1024 * 8];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        digester.update(&buffer[..n]);
        size += n as u64;
    }
    Ok((digester.finish(), size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_has_well_known_digest() {
        assert_eq!(
            sha256_bytes(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut digester = Digester::new();
        digester.update(b"hello ");
        digester.update(b"world");
        assert_eq!(digester.finish(), sha256_bytes(b"hello world"));
    }

    #[tokio::test]
    async fn file_digest_matches_contents() {
        let path = std::env::temp_dir().join(format!("trackline-digest-{}", std::process::id()));
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let (digest, size) = sha256_file(&path).await.unwrap();
        assert_eq!(digest, sha256_bytes(b"hello world"));
        assert_eq!(size, 11);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
