//! File checksums.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use md5::{Digest, Md5};

use crate::error::{IoContext, Result};

/// Returns the hex-encoded md5 digest of the file at `path`.
///
/// The file is streamed in blocks so large resources do not need to fit in
/// memory.
pub fn md5sum(path: &Path) -> Result<String> {
    let file = File::open(path).with_path(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Md5::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = reader.read(&mut buffer).with_path(path)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_md5sum_known_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, "hello\n").unwrap();

        assert_eq!(md5sum(&path).unwrap(), "b1946ac92492d2347c6235b4d2611184");
    }

    #[test]
    fn test_md5sum_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, "").unwrap();

        assert_eq!(md5sum(&path).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_md5sum_missing_file() {
        let dir = tempdir().unwrap();
        assert!(md5sum(&dir.path().join("missing")).is_err());
    }
}
