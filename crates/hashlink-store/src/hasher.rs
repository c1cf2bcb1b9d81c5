//! Streaming content fingerprints.
//!
//! Files are read through a fixed-size buffer, so memory use does not grow
//! with file size.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::monitor::OperationMonitor;
use crate::{Fingerprint, IoResultExt, Result};

/// Read buffer size for hashing
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Computes BLAKE3 fingerprints, reusing one read buffer across files.
pub struct ContentHasher {
    buf: Vec<u8>,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; HASH_BUFFER_SIZE],
        }
    }

    /// Fingerprint the file at `path`, whose size was observed as `size`.
    ///
    /// The hash is reported to `monitor` before reading. Fails if the file
    /// cannot be read to the end or its length no longer matches `size`.
    pub fn fingerprint(
        &mut self,
        path: &Path,
        size: u64,
        monitor: &mut OperationMonitor,
    ) -> Result<Fingerprint> {
        monitor.hash_file(path, size);
        let file = File::open(path).at("open", path)?;
        let (fingerprint, read) = self.fingerprint_reader(file).at("read", path)?;
        if read != size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("file changed size while hashing ({} -> {} bytes)", size, read),
            ))
            .at("read", path);
        }
        Ok(fingerprint)
    }

    /// Fingerprint everything `reader` yields. Returns the digest and the byte count.
    pub fn fingerprint_reader<R: Read>(&mut self, mut reader: R) -> io::Result<(Fingerprint, u64)> {
        let mut hasher = blake3::Hasher::new();
        let mut total = 0u64;
        loop {
            match reader.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => {
                    hasher.update(&self.buf[..n]);
                    total += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok((Fingerprint::from_bytes(*hasher.finalize().as_bytes()), total))
    }

    /// Fingerprint an in-memory buffer.
    #[inline]
    pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
        Fingerprint::from_bytes(*blake3::hash(data).as_bytes())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}
