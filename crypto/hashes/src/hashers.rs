use crate::Hash;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Common interface of the incremental hashers used for transaction and signature hashing.
pub trait HasherBase {
    fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self;
}

pub trait Hasher: HasherBase + Clone + Default {
    fn finalize(self) -> Hash;
    fn reset(&mut self);

    #[inline(always)]
    fn hash<A: AsRef<[u8]>>(data: A) -> Hash {
        let mut hasher = Self::default();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Double SHA256, the hash of transaction ids, block hashes and signature hashes.
#[derive(Clone, Default)]
pub struct Sha256d(Sha256);

impl Sha256d {
    #[inline]
    pub fn new() -> Self {
        Self(Sha256::new())
    }
}

impl HasherBase for Sha256d {
    #[inline(always)]
    fn update<A: AsRef<[u8]>>(&mut self, data: A) -> &mut Self {
        self.0.update(data.as_ref());
        self
    }
}

impl Hasher for Sha256d {
    #[inline(always)]
    fn finalize(self) -> Hash {
        let first = self.0.finalize();
        Hash::from_bytes(Sha256::digest(first).into())
    }

    #[inline(always)]
    fn reset(&mut self) {
        Digest::reset(&mut self.0);
    }
}

/// Single SHA256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// RIPEMD160(SHA256(data)), the hash committed to by pay-to-public-key-hash scripts.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256d_empty() {
        // Double SHA256 of the empty string
        let hash = Sha256d::hash(b"");
        assert_eq!(
            hash.as_bytes(),
            [
                0x5d, 0xf6, 0xe0, 0xe2, 0x76, 0x13, 0x59, 0xd3, 0x0a, 0x82, 0x75, 0x05, 0x8e, 0x29, 0x9f, 0xcc, 0x03, 0x81, 0x53, 0x45,
                0x45, 0xf5, 0x5c, 0xf4, 0x3e, 0x41, 0x98, 0x3f, 0x5d, 0x4c, 0x94, 0x56
            ]
        );
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut hasher = Sha256d::new();
        hasher.update(b"lotus").update([0u8, 1, 2]);
        assert_eq!(hasher.finalize(), Sha256d::hash(b"lotus\x00\x01\x02"));
    }

    #[test]
    fn test_hash160_empty() {
        // RIPEMD160(SHA256(""))
        let mut expected = [0u8; 20];
        faster_hex::hex_decode(b"b472a266d0bd89c13706a4132ccfb16f7c3b9fcb", &mut expected).unwrap();
        assert_eq!(hash160(&[]), expected);
    }
}
