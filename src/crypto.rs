//! Capability traits for the things this crate is deliberately oblivious
//! to: filename/data encryption and superblock signing. Each ships a no-op
//! default so a plain, unsigned, unencrypted image is the zero-configuration
//! outcome, and a caller who needs the real thing supplies a concrete
//! implementation — key management and the actual ciphers stay external.

use crate::config::HashAlgo;

/// Encrypts directory entry names for an encrypted directory. The default
/// implementation is the identity function, i.e. "no encryption".
pub trait FnameEncrypt {
    fn encrypt_fname(&self, name: &[u8]) -> Vec<u8> {
        name.to_vec()
    }
}

#[derive(Default)]
pub struct NoFnameEncrypt;
impl FnameEncrypt for NoFnameEncrypt {}

/// Encrypts file data contents before compression's verbatim-fallback
/// check is even considered (encrypted volumes never compress, see
/// `compress::Router`). Default implementation is the identity function.
pub trait DataEncrypt {
    fn encrypt_data(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }
}

#[derive(Default)]
pub struct NoDataEncrypt;
impl DataEncrypt for NoDataEncrypt {}

/// Produces the superblock's authentication signature. The default
/// implementation signs nothing and reports the image as unsigned.
pub trait SbSign {
    fn sign(&self, _hashed_sb: &[u8]) -> Option<Vec<u8>> {
        None
    }
}

#[derive(Default)]
pub struct NoSbSign;
impl SbSign for NoSbSign {}

/// Computes the fixed-width digest stored in nodes and the superblock's
/// master-hash field when authentication is enabled. Key material handling
/// is out of scope; this only performs the hash itself.
pub fn hash(algo: HashAlgo, data: &[u8]) -> Vec<u8> {
    use sha1::Sha1;
    use sha2::{Digest, Sha256, Sha512};

    match algo {
        HashAlgo::Sha1 => {
            let mut h = Sha1::new();
            sha1::Digest::update(&mut h, data);
            sha1::Digest::finalize(h).to_vec()
        }
        HashAlgo::Sha256 => {
            let mut h = Sha256::new();
            h.update(data);
            h.finalize().to_vec()
        }
        HashAlgo::Sha512 => {
            let mut h = Sha512::new();
            h.update(data);
            h.finalize().to_vec()
        }
    }
}

/// Signs a superblock hash with an HMAC-like construction once a key is
/// supplied, the concrete counterpart to `SbSign`'s no-op default.
pub struct Sha2HmacSigner {
    key: Vec<u8>,
    algo: HashAlgo,
}

impl Sha2HmacSigner {
    pub fn new(key: Vec<u8>, algo: HashAlgo) -> Self {
        Sha2HmacSigner { key, algo }
    }
}

impl SbSign for Sha2HmacSigner {
    fn sign(&self, hashed_sb: &[u8]) -> Option<Vec<u8>> {
        let mut buf = self.key.clone();
        buf.extend_from_slice(hashed_sb);
        Some(hash(self.algo, &buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_defaults_are_identity_or_none() {
        assert_eq!(NoFnameEncrypt.encrypt_fname(b"foo"), b"foo");
        assert_eq!(NoDataEncrypt.encrypt_data(b"bar"), b"bar");
        assert_eq!(NoSbSign.sign(b"whatever"), None);
    }

    #[test]
    fn hash_lengths_match_algo() {
        assert_eq!(hash(HashAlgo::Sha1, b"x").len(), 20);
        assert_eq!(hash(HashAlgo::Sha256, b"x").len(), 32);
        assert_eq!(hash(HashAlgo::Sha512, b"x").len(), 64);
    }

    #[test]
    fn signer_produces_signature() {
        let signer = Sha2HmacSigner::new(vec![1, 2, 3], HashAlgo::Sha256);
        assert!(signer.sign(b"digest").is_some());
    }
}
