//! Content identity.
//!
//! A file's identity is the SHA-256 of its bytes, independent of name, path,
//! or mtime. Files are streamed in fixed-size chunks so large downloads never
//! sit in memory.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::{CtxError, ErrorCode};

const CHUNK_SIZE: usize = 64 * 1024;

/// Hash the file at `path`, returning lowercase hex.
///
/// Any I/O failure (missing file, permissions, file removed mid-read) is
/// reported as `FILE_UNREADABLE`.
pub fn sha256_file(path: &Path) -> Result<String> {
    let unreadable = |e: std::io::Error| -> anyhow::Error {
        CtxError::new(ErrorCode::FileUnreadable, "Failed to hash file.")
            .with_detail("path", path.display().to_string())
            .with_detail("reason", e.to_string())
            .into()
    };

    let mut file = File::open(path).map_err(unreadable)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(unreadable(e)),
        };
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use tempfile::TempDir;

    #[test]
    fn test_known_digest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hello.txt");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_empty_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_independent_of_name_and_location() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("x.zip");
        std::fs::create_dir_all(tmp.path().join("nested")).unwrap();
        let b = tmp.path().join("nested").join("y.zip");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        assert_eq!(sha256_file(&a).unwrap(), sha256_file(&b).unwrap());
    }

    #[test]
    fn test_spans_multiple_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.bin");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let expected = hex::encode(Sha256::digest(&data));
        assert_eq!(sha256_file(&path).unwrap(), expected);
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        let err = sha256_file(&tmp.path().join("gone.txt")).unwrap_err();
        let ctx = classify(&err);
        assert_eq!(ctx.code, ErrorCode::FileUnreadable);
        assert!(ctx.details["path"].as_str().unwrap().ends_with("gone.txt"));
    }
}
