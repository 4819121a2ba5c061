use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::Path;
use twox_hash::XxHash64;

pub const PARTIAL_HASH_LENGTH: usize = 1024; // 1KB

const READ_BUFFER: usize = 64 * 1024;

/// XxHash64 of the first [`PARTIAL_HASH_LENGTH`] bytes of a file.
pub fn partial_hash(file: &Path) -> io::Result<u64> {
    let data = read_portion(file)?;
    Ok(hash_data(&data))
}

/// XxHash64 of the whole file, streamed.
pub fn full_hash(file: &Path) -> io::Result<u64> {
    let mut f = File::open(file)?;
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let n = f.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.write(&buffer[..n]);
    }
    Ok(hasher.finish())
}

fn read_portion(file: &Path) -> io::Result<Vec<u8>> {
    let f = File::open(file)?;
    let mut buffer = Vec::with_capacity(PARTIAL_HASH_LENGTH);
    f.take(PARTIAL_HASH_LENGTH as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

pub fn hash_data(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}
