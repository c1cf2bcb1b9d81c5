//! Fingerprint collision detection.
//!
//! A slot hit is only trusted after the resident file passes the guard.
//! [`VerifyMode::Size`] compares lengths; [`VerifyMode::Content`] also
//! compares the bytes when the lengths agree.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::{IoResultExt, Result};

const COMPARE_BUFFER_SIZE: usize = 64 * 1024;

/// Result of comparing an incoming file with a slot's resident data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMatch {
    Match,
    Collision,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerifyMode {
    /// Equal sizes are accepted as equal content
    #[default]
    Size,
    /// Equal sizes are confirmed by a byte-for-byte comparison
    Content,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionGuard {
    mode: VerifyMode,
}

impl CollisionGuard {
    pub fn new(mode: VerifyMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> VerifyMode {
        self.mode
    }

    /// Size-only pre-check.
    pub fn check(incoming_size: u64, resident_size: u64) -> SlotMatch {
        if incoming_size == resident_size {
            SlotMatch::Match
        } else {
            SlotMatch::Collision
        }
    }

    /// Full check according to the configured mode.
    ///
    /// `resident_path` is where the slot's data currently lives. In dry-run
    /// that is the leader's original path, not the slot.
    pub fn verify(
        &self,
        incoming_path: &Path,
        incoming_size: u64,
        resident_path: &Path,
        resident_size: u64,
    ) -> Result<SlotMatch> {
        if Self::check(incoming_size, resident_size) == SlotMatch::Collision {
            return Ok(SlotMatch::Collision);
        }
        match self.mode {
            VerifyMode::Size => Ok(SlotMatch::Match),
            VerifyMode::Content => {
                let a = File::open(incoming_path).at("open", incoming_path)?;
                let b = File::open(resident_path).at("open", resident_path)?;
                if same_bytes(a, b).at("compare", incoming_path)? {
                    Ok(SlotMatch::Match)
                } else {
                    Ok(SlotMatch::Collision)
                }
            }
        }
    }
}

fn same_bytes<A: Read, B: Read>(mut a: A, mut b: B) -> io::Result<bool> {
    let mut buf_a = vec![0u8; COMPARE_BUFFER_SIZE];
    let mut buf_b = vec![0u8; COMPARE_BUFFER_SIZE];
    loop {
        let n = read_full(&mut a, &mut buf_a)?;
        let m = read_full(&mut b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows. Short only at EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
