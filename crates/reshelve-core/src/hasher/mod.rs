mod xxhash;

pub use xxhash::{full_hash, hash_data, partial_hash, PARTIAL_HASH_LENGTH};

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::trace;

/// True if `a` and `b` are regular files with the same content.
///
/// Two-tier check: sizes, then a 1KB partial hash, and only when both agree a
/// full content hash. Files no larger than the partial window stop after the
/// partial hash.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if !meta_a.is_file() || !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }

    if partial_hash(a)? != partial_hash(b)? {
        return Ok(false);
    }
    if meta_a.len() <= PARTIAL_HASH_LENGTH as u64 {
        return Ok(true);
    }

    trace!("Full hash compare {} vs {}", a.display(), b.display());
    Ok(full_hash(a)? == full_hash(b)?)
}

const COMPARE_BUFFER: usize = 64 * 1024;

/// Byte-for-byte comparison, for decisions a hash collision must not decide.
pub fn contents_equal(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    let mut left = BufReader::with_capacity(COMPARE_BUFFER, File::open(a)?);
    let mut right = BufReader::with_capacity(COMPARE_BUFFER, File::open(b)?);
    loop {
        let (consumed, equal) = {
            let l = left.fill_buf()?;
            let r = right.fill_buf()?;
            if l.is_empty() || r.is_empty() {
                return Ok(l.is_empty() && r.is_empty());
            }
            let n = l.len().min(r.len());
            (n, l[..n] == r[..n])
        };
        if !equal {
            return Ok(false);
        }
        left.consume(consumed);
        right.consume(consumed);
    }
}
