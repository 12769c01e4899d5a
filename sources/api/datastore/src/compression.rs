//! Snapshot compression.
//!
//! Snapshots are gzip-compressed before they're sent to slaves.  The reading side checks for the
//! gzip magic bytes rather than assuming, so plain text snapshots are accepted too.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use snafu::ResultExt;
use std::io::{Read, Write};

use super::{error, Result};

/// These bytes are at the start of any gzip-compressed data.
/// https://en.wikipedia.org/wiki/List_of_file_signatures
const GZ_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compresses snapshot text with gzip.
pub fn compress<S: AsRef<str>>(text: S) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_ref().as_bytes())
        .context(error::CompressSnafu)?;
    encoder.finish().context(error::CompressSnafu)
}

/// Returns whether the given bytes look like gzip data.
pub fn is_compressed(input: &[u8]) -> bool {
    input.starts_with(&GZ_MAGIC)
}

/// Returns the snapshot text held in `input`, which may or may not be gzip-compressed.
pub fn expand_maybe(input: &[u8]) -> Result<String> {
    if !is_compressed(input) {
        return String::from_utf8(input.to_vec()).context(error::NonUnicodeSnapshotSnafu);
    }

    let mut output = String::new();
    GzDecoder::new(input)
        .read_to_string(&mut output)
        .context(error::DecompressSnafu)?;
    Ok(output)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compressed_input() {
        let text = "A\n{\n  X = 1\n}\n";
        let compressed = compress(text).unwrap();
        assert!(is_compressed(&compressed));
        assert_eq!(expand_maybe(&compressed).unwrap(), text);
    }

    #[test]
    fn plain_input() {
        assert_eq!(expand_maybe(b"A = 1").unwrap(), "A = 1");
        assert_eq!(expand_maybe(b"").unwrap(), "");
        assert_eq!(expand_maybe(b"\x1f").unwrap(), "\x1f");
    }

    #[test]
    fn corrupt_gzip_fails() {
        let corrupt = [0x1f, 0x8b, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x42];
        assert!(expand_maybe(&corrupt).is_err());
    }

    #[test]
    fn invalid_utf8_fails() {
        assert!(expand_maybe(&[0xff, 0xfe, 0x00]).is_err());
    }
}
