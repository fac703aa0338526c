#![deny(missing_docs)]

//! Content digests that fingerprint the files of a release.
//!
//! Every file of a release is fingerprinted with MD5 and the digest is stored
//! as 32 lower-case hex characters. The hex string is the key of the blob
//! store, so it must be stable across runs and platforms for identical bytes.
//!
//! A new hasher is created for every call; there is no shared hashing state.
//!
//! ```no_run
//! use updex_digest::{compute_bytes_digest, compute_file_md5_hex, digest_to_hex, Md5};
//!
//! let hash = compute_bytes_digest::<Md5>("Hello, world!");
//! assert_eq!(digest_to_hex::<Md5>(&hash), "6cd3556deb0da54bca060b4c39479839");
//!
//! let fingerprint = compute_file_md5_hex("client.exe").unwrap();
//! println!("client.exe - {fingerprint}");
//! ```
//!
//! [`HashingReader`] hashes the bytes that are read through it, which lets a
//! file be copied and verified in the same pass.

use std::{
    io::{Read, Write},
    path::Path,
};

use digest::{Digest, Output};

pub use md5::Md5;

/// The output of an MD5 hash.
pub type Md5Hash = Output<Md5>;

/// The number of hex characters in a rendered [`Md5Hash`].
pub const MD5_HEX_LEN: usize = 32;

/// Computes the digest of the file at `path` by streaming it through a
/// hasher.
pub fn compute_file_digest<D: Digest + Default + Write>(
    path: impl AsRef<Path>,
) -> Result<Output<D>, std::io::Error> {
    let mut file = fs_err::File::open(path.as_ref())?;
    compute_reader_digest::<D>(&mut file)
}

/// Computes the digest of everything `reader` yields. A read error is
/// returned as is, a partial digest is never produced.
pub fn compute_reader_digest<D: Digest + Default + Write>(
    reader: &mut impl Read,
) -> Result<Output<D>, std::io::Error> {
    let mut hasher = D::default();
    std::io::copy(reader, &mut hasher)?;
    Ok(hasher.finalize())
}

/// Computes the digest of a byte slice.
pub fn compute_bytes_digest<D: Digest + Default>(bytes: impl AsRef<[u8]>) -> Output<D> {
    D::digest(bytes)
}

/// Computes the fingerprint recorded in release manifests: the MD5 digest of
/// a file rendered as lower-case hex.
pub fn compute_file_md5_hex(path: impl AsRef<Path>) -> Result<String, std::io::Error> {
    compute_file_digest::<Md5>(path).map(|hash| digest_to_hex::<Md5>(&hash))
}

/// Renders a digest as a lower-case hex string.
pub fn digest_to_hex<D: Digest>(hash: &Output<D>) -> String {
    hex::encode(hash)
}

/// Returns true if `str` looks like a rendered MD5 digest: exactly
/// [`MD5_HEX_LEN`] lower-case hex characters.
pub fn is_md5_hex(str: &str) -> bool {
    str.len() == MD5_HEX_LEN && str.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

/// A [`Read`] adaptor that hashes every byte read through it. Call
/// [`HashingReader::finalize`] to get back the reader and the digest.
pub struct HashingReader<R, D: Digest> {
    reader: R,
    hasher: D,
}

impl<R, D: Digest + Default> HashingReader<R, D> {
    /// Wraps `reader` with a fresh hasher.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            hasher: D::default(),
        }
    }
}

impl<R, D: Digest> HashingReader<R, D> {
    /// Returns the wrapped reader and the digest of all bytes read so far.
    pub fn finalize(self) -> (R, Output<D>) {
        (self.reader, self.hasher.finalize())
    }
}

impl<R: Read, D: Digest> Read for HashingReader<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let bytes_read = self.reader.read(buf)?;
        self.hasher.update(&buf[..bytes_read]);
        Ok(bytes_read)
    }
}

#[cfg(test)]
mod test {
    use super::{compute_bytes_digest, compute_file_md5_hex, digest_to_hex, HashingReader, Md5};
    use rstest::rstest;
    use std::io::Read;

    #[rstest]
    #[case("", "d41d8cd98f00b204e9800998ecf8427e")]
    #[case("abc", "900150983cd24fb0d6963f7d28e17f72")]
    #[case("1234567890", "e807f1fcf82d132f9bb018ca6738a19f")]
    #[case(
        "The quick brown fox jumps over the lazy dog",
        "9e107d9d372bb6826bd81d3542a419d6"
    )]
    fn test_file_fingerprint(#[case] content: &str, #[case] expected: &str) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("client.dll");
        std::fs::write(&path, content).unwrap();

        assert_eq!(compute_file_md5_hex(&path).unwrap(), expected);
    }

    #[test]
    fn test_single_byte_change_changes_digest() {
        let a = compute_bytes_digest::<Md5>("The quick brown fox jumps over the lazy dog");
        let b = compute_bytes_digest::<Md5>("The quick brown fox jumps over the lazy dog.");
        assert_ne!(a, b);
        assert_eq!(digest_to_hex::<Md5>(&b), "e4d909c290d0fb1ca068ffaddf22cbd0");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = compute_file_md5_hex(temp_dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_copy_through_hashing_reader() {
        let mut reader = HashingReader::<_, Md5>::new(std::io::Cursor::new("Hello, world!"));
        let mut copied = Vec::new();
        reader.read_to_end(&mut copied).unwrap();
        let (_, hash) = reader.finalize();

        assert_eq!(copied, b"Hello, world!");
        assert_eq!(
            digest_to_hex::<Md5>(&hash),
            "6cd3556deb0da54bca060b4c39479839"
        );
    }

    #[rstest]
    #[case("900150983cd24fb0d6963f7d28e17f72", true)]
    #[case("900150983CD24FB0D6963F7D28E17F72", false)]
    #[case("900150983cd24fb0d6963f7d28e17f7", false)]
    #[case("z00150983cd24fb0d6963f7d28e17f72", false)]
    fn test_is_md5_hex(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(super::is_md5_hex(input), expected);
    }
}
