use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Length of the Part-10 preamble that precedes the magic token.
pub const PREAMBLE_LENGTH: u64 = 128;
pub const MAGIC: &[u8; 4] = b"DICM";

/// Cheap check for a DICOM Part-10 file: seek past the preamble and compare
/// the 4-byte magic. Never reads more than 4 bytes. Any I/O failure (missing
/// file, directory, permissions, short file) is a non-match.
pub fn is_dicom_file(path: &Path) -> bool {
    read_magic(path)
        .map(|magic| &magic == MAGIC)
        .unwrap_or(false)
}

fn read_magic(path: &Path) -> std::io::Result<[u8; 4]> {
    let mut f = File::open(path)?;
    f.seek(SeekFrom::Start(PREAMBLE_LENGTH))?;
    let mut magic = [0u8; 4];
    f.read_exact(&mut magic)?;
    Ok(magic)
}
