use crate::error::{BenchError, Result};
use serde::Serialize;
use sha1::{Digest as _, Sha1};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Read size used when hashing or copying corpus files.
pub const BUF_SIZE: usize = 1024 * 1024;

/// Hex encoded SHA-1 of a file's content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Digest(String);

impl Digest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hashes a file in `BUF_SIZE` chunks.
pub fn hash_file<P: AsRef<Path>>(path: P) -> Result<Digest> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| BenchError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; BUF_SIZE];

    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(BenchError::io(path, e)),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(Digest(format!("{:x}", hasher.finalize())))
}
