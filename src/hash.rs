//! Content hashing for change detection and idempotent re-ingestion.
//!
//! The whole-file SHA-256 digest is the pipeline's sole deduplication
//! key: same bytes ⇒ same digest ⇒ skip. The file is streamed in fixed
//! 8 KiB reads so large documents never load fully into memory.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::PipelineError;

const READ_CHUNK: usize = 8192;

/// Compute the lowercase hex SHA-256 digest of a file's bytes.
pub fn content_hash(path: &Path) -> Result<String, PipelineError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::NotFound(path.display().to_string()),
        _ => PipelineError::io(path, e),
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(|e| PipelineError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn digest_is_stable_for_same_bytes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"tender submission deadline 2024-03-15").unwrap();
        let h1 = content_hash(f.path()).unwrap();
        let h2 = content_hash(f.path()).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn single_byte_change_changes_digest() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b"bill of quantities rev A").unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        b.write_all(b"bill of quantities rev B").unwrap();
        assert_ne!(content_hash(a.path()).unwrap(), content_hash(b.path()).unwrap());
    }

    #[test]
    fn large_file_streams_across_read_boundary() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let data = vec![0x5au8; READ_CHUNK * 3 + 17];
        f.write_all(&data).unwrap();

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let expected = hex::encode(hasher.finalize());

        assert_eq!(content_hash(f.path()).unwrap(), expected);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = content_hash(Path::new("/nonexistent/itt.pdf")).unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
