//! Streaming MD5 digests.

use std::io::{self, Read};
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::error::ChecksumError;

/// Read size used when hashing, bounding memory regardless of file size.
pub const CHUNK_SIZE: usize = 4096;

/// Computes the lowercase hex MD5 of everything `reader` yields.
///
/// Blocking; used for remote files read through a synchronous SFTP handle.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut context = md5::Context::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        context.consume(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Computes the lowercase hex MD5 of a local file.
pub async fn digest_file(path: &Path) -> Result<String, ChecksumError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| ChecksumError::io(path, e))?;

    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .await
            .map_err(|e| ChecksumError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        context.consume(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Returns whether the file's digest equals `expected`.
pub async fn verify(path: &Path, expected: &str) -> Result<bool, ChecksumError> {
    let actual = digest_file(path).await?;
    Ok(digests_match(&actual, expected))
}

/// Hex digests compare case-insensitively.
pub fn digests_match(actual: &str, expected: &str) -> bool {
    actual.trim().eq_ignore_ascii_case(expected.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // md5("hello world\n")
    const HELLO_MD5: &str = "6f5902ac237024bdd0c176cb93063dc4";

    #[test]
    fn test_digest_reader_known_value() {
        let digest = digest_reader(&b"hello world\n"[..]).unwrap();
        assert_eq!(digest, HELLO_MD5);
    }

    #[test]
    fn test_digest_reader_empty_input() {
        let digest = digest_reader(&b""[..]).unwrap();
        assert_eq!(digest, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn test_digest_file_spanning_many_chunks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.bin");
        let content: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &content).await.unwrap();

        let from_file = digest_file(&path).await.unwrap();
        let from_reader = digest_reader(&content[..]).unwrap();
        assert_eq!(from_file, from_reader);
    }

    #[tokio::test]
    async fn test_verify_matches_and_detects_single_byte_change() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        tokio::fs::write(&path, b"hello world\n").await.unwrap();

        assert!(verify(&path, HELLO_MD5).await.unwrap());
        assert!(verify(&path, &HELLO_MD5.to_uppercase()).await.unwrap());

        tokio::fs::write(&path, b"hello world!").await.unwrap();
        assert!(!verify(&path, HELLO_MD5).await.unwrap());
    }

    #[tokio::test]
    async fn test_digest_missing_file_is_io_error() {
        let result = digest_file(Path::new("/nonexistent/file.bin")).await;
        assert!(matches!(result, Err(ChecksumError::Io { .. })));
    }
}
