//! Primitives the simulated module runs internally.
//!
//! Hashes come from `sha2` and `streebog`, block ciphers from `magma`,
//! `kuznyechik` and `aes`, driven through the `cbc` and `ctr` mode
//! wrappers. Nothing here is exposed to the client side of the wire.

use std::fmt;

use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use kuznyechik::Kuznyechik;
use magma::Magma;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha384, Sha512};
use streebog::{Streebog256, Streebog512};
use thiserror::Error;

use tpm_protocol::AlgorithmId;

/// Size of the integrity digest at the front of a wrapped private blob.
pub const INTEGRITY_SIZE: usize = 32;

/// Size of the IV that follows the integrity digest.
const WRAP_IV_SIZE: usize = 16;

/// Failures inside the simulated cryptography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("unsupported hash algorithm {0}")]
    UnsupportedHash(AlgorithmId),

    #[error("unsupported cipher {algorithm} with a {key_len}-byte key")]
    UnsupportedCipher {
        algorithm: AlgorithmId,
        key_len: usize,
    },

    #[error("unsupported cipher mode {0}")]
    UnsupportedMode(AlgorithmId),

    #[error("IV must be {expected} bytes, got {actual}")]
    IvLength { expected: usize, actual: usize },

    #[error("{len} bytes is not a multiple of the {block}-byte block")]
    Unaligned { len: usize, block: usize },

    #[error("invalid key or IV length")]
    InvalidLength,

    #[error("wrapped blob failed its integrity check")]
    Integrity,
}

/// Hash algorithms the simulator implements.
pub fn is_supported_hash(alg: AlgorithmId) -> bool {
    hasher(alg).is_ok()
}

/// An incremental hash over one of the supported algorithms.
#[derive(Clone)]
pub enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Streebog256(Streebog256),
    Streebog512(Streebog512),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Streebog256(h) => h.update(data),
            Hasher::Streebog512(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Sha256(h) => h.finalize().to_vec(),
            Hasher::Sha384(h) => h.finalize().to_vec(),
            Hasher::Sha512(h) => h.finalize().to_vec(),
            Hasher::Streebog256(h) => h.finalize().to_vec(),
            Hasher::Streebog512(h) => h.finalize().to_vec(),
        }
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hasher::Sha256(_) => "sha256",
            Hasher::Sha384(_) => "sha384",
            Hasher::Sha512(_) => "sha512",
            Hasher::Streebog256(_) => "streebog256",
            Hasher::Streebog512(_) => "streebog512",
        };
        f.debug_tuple("Hasher").field(&name).finish()
    }
}

/// A fresh incremental hasher for `alg`.
pub fn hasher(alg: AlgorithmId) -> Result<Hasher, CryptoError> {
    Ok(match alg {
        AlgorithmId::Sha256 => Hasher::Sha256(Sha256::new()),
        AlgorithmId::Sha384 => Hasher::Sha384(Sha384::new()),
        AlgorithmId::Sha512 => Hasher::Sha512(Sha512::new()),
        AlgorithmId::Gost3411_256 => Hasher::Streebog256(Streebog256::new()),
        AlgorithmId::Gost3411_512 => Hasher::Streebog512(Streebog512::new()),
        other => return Err(CryptoError::UnsupportedHash(other)),
    })
}

/// One-shot digest over the concatenation of `parts`.
pub fn digest(alg: AlgorithmId, parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
    let mut hasher = hasher(alg)?;
    for part in parts {
        hasher.update(part);
    }
    Ok(hasher.finalize())
}

fn sha256(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// Counter-mode SHA-256 expansion of `parts` to exactly `len` bytes.
pub fn expand(parts: &[&[u8]], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut counter: u32 = 1;
    while out.len() < len {
        let mut block: Vec<&[u8]> = Vec::with_capacity(parts.len() + 1);
        let counter_bytes = counter.to_be_bytes();
        block.push(&counter_bytes);
        block.extend_from_slice(parts);
        out.extend_from_slice(&sha256(&block));
        counter += 1;
    }
    out.truncate(len);
    out
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Output of one cipher call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherOutput {
    pub data: Vec<u8>,
    /// Chaining value for a following call over the next chunk.
    pub iv_out: Vec<u8>,
}

macro_rules! run_mode {
    ($cipher:ty, $counter:ident, $mode:expr, $decrypt:expr, $key:expr, $iv:expr, $data:expr) => {
        match $mode {
            AlgorithmId::Ctr => keystream::<ctr::$counter<$cipher>>($key, $iv, $data),
            AlgorithmId::Cbc if $decrypt => {
                cbc_decrypt::<cbc::Decryptor<$cipher>>($key, $iv, $data)
            }
            AlgorithmId::Cbc => cbc_encrypt::<cbc::Encryptor<$cipher>>($key, $iv, $data),
            other => Err(CryptoError::UnsupportedMode(other)),
        }
    };
}

/// Encrypt or decrypt `data` with no padding.
///
/// CBC input must be block aligned. CTR accepts any length.
pub fn apply_cipher(
    algorithm: AlgorithmId,
    mode: AlgorithmId,
    key: &[u8],
    iv: &[u8],
    data: &[u8],
    decrypt: bool,
) -> Result<CipherOutput, CryptoError> {
    let unsupported = CryptoError::UnsupportedCipher {
        algorithm,
        key_len: key.len(),
    };
    let block = algorithm.block_size().ok_or(unsupported)?;
    if iv.len() != block {
        return Err(CryptoError::IvLength {
            expected: block,
            actual: iv.len(),
        });
    }
    if mode == AlgorithmId::Cbc && data.len() % block != 0 {
        return Err(CryptoError::Unaligned {
            len: data.len(),
            block,
        });
    }

    let out = match (algorithm, key.len()) {
        (AlgorithmId::Magma, 32) => run_mode!(Magma, Ctr64BE, mode, decrypt, key, iv, data),
        (AlgorithmId::Grasshopper, 32) => {
            run_mode!(Kuznyechik, Ctr128BE, mode, decrypt, key, iv, data)
        }
        (AlgorithmId::Aes, 16) => run_mode!(Aes128, Ctr128BE, mode, decrypt, key, iv, data),
        (AlgorithmId::Aes, 24) => run_mode!(Aes192, Ctr128BE, mode, decrypt, key, iv, data),
        (AlgorithmId::Aes, 32) => run_mode!(Aes256, Ctr128BE, mode, decrypt, key, iv, data),
        _ => Err(unsupported),
    }?;

    let iv_out = match mode {
        AlgorithmId::Ctr => advance_counter(iv, data.len().div_ceil(block) as u64),
        _ => {
            let ciphertext = if decrypt { data } else { out.as_slice() };
            if ciphertext.is_empty() {
                iv.to_vec()
            } else {
                ciphertext[ciphertext.len() - block..].to_vec()
            }
        }
    };
    Ok(CipherOutput { data: out, iv_out })
}

fn keystream<S: KeyIvInit + StreamCipher>(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut cipher = S::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidLength)?;
    let mut buf = data.to_vec();
    cipher.apply_keystream(&mut buf);
    Ok(buf)
}

fn cbc_encrypt<E: KeyIvInit + BlockEncryptMut>(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = E::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidLength)?;
    Ok(cipher.encrypt_padded_vec_mut::<NoPadding>(data))
}

fn cbc_decrypt<D: KeyIvInit + BlockDecryptMut>(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = D::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidLength)?;
    cipher
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| CryptoError::Unaligned {
            len: data.len(),
            block: iv.len(),
        })
}

/// Add `blocks` to a big-endian counter block, wrapping at its width.
fn advance_counter(iv: &[u8], blocks: u64) -> Vec<u8> {
    let mut out = iv.to_vec();
    let mut carry = blocks as u128;
    for byte in out.iter_mut().rev() {
        if carry == 0 {
            break;
        }
        let sum = *byte as u128 + (carry & 0xFF);
        *byte = sum as u8;
        carry = (carry >> 8) + (sum >> 8);
    }
    out
}

fn storage_key(parent_secret: &[u8]) -> Vec<u8> {
    sha256(&[parent_secret, b"STORAGE"])
}

fn integrity_key(parent_secret: &[u8]) -> Vec<u8> {
    sha256(&[parent_secret, b"INTEGRITY"])
}

/// Seal `plaintext` under a storage parent, bound to the child's name.
///
/// Layout: `integrity(32) || iv(16) || ciphertext`.
pub fn wrap(parent_secret: &[u8], name: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let iv = random_bytes(WRAP_IV_SIZE);
    let ciphertext = keystream::<ctr::Ctr128BE<Kuznyechik>>(
        &storage_key(parent_secret),
        &iv,
        plaintext,
    )?;
    let integrity = sha256(&[&integrity_key(parent_secret), &iv, &ciphertext, name]);

    let mut blob = Vec::with_capacity(INTEGRITY_SIZE + WRAP_IV_SIZE + ciphertext.len());
    blob.extend_from_slice(&integrity);
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Inverse of [`wrap`]. Any tampering with the blob or a different
/// parent or name fails with [`CryptoError::Integrity`].
pub fn unwrap(parent_secret: &[u8], name: &[u8], blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < INTEGRITY_SIZE + WRAP_IV_SIZE {
        return Err(CryptoError::Integrity);
    }
    let (integrity, rest) = blob.split_at(INTEGRITY_SIZE);
    let (iv, ciphertext) = rest.split_at(WRAP_IV_SIZE);
    let expected = sha256(&[&integrity_key(parent_secret), iv, ciphertext, name]);
    if expected != integrity {
        return Err(CryptoError::Integrity);
    }
    keystream::<ctr::Ctr128BE<Kuznyechik>>(&storage_key(parent_secret), iv, ciphertext)
}

/// Proof binding a saved context to this module instance.
pub fn context_integrity(proof: &[u8], sequence: u64, saved_handle: u32, hierarchy: u32) -> Vec<u8> {
    sha256(&[
        proof,
        &sequence.to_be_bytes(),
        &saved_handle.to_be_bytes(),
        &hierarchy.to_be_bytes(),
    ])
}

/// Keyed-digest signature value `s` for nonce `r`.
///
/// This has the size and shape of a GOST R 34.10 `s` component but is
/// only checkable by the module holding `secret`.
pub fn signature_value(
    hash: AlgorithmId,
    secret: &[u8],
    r: &[u8],
    digest_bytes: &[u8],
    size: usize,
) -> Result<Vec<u8>, CryptoError> {
    let seed = digest(hash, &[secret, r, digest_bytes])?;
    Ok(expand(&[b"SIGN", &seed], size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        let sha = digest(AlgorithmId::Sha256, &[b"abc"]).unwrap();
        assert_eq!(
            hex::encode(sha),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        // GOST R 34.11-2012 test vector M1
        let m1 = b"012345678901234567890123456789012345678901234567890123456789012";
        let streebog = digest(AlgorithmId::Gost3411_256, &[m1]).unwrap();
        assert_eq!(
            hex::encode(streebog),
            "9d151eefd8590b89daa6ba6cb74af9275dd051026bb149a452fd84e5e57b5500"
        );
    }

    #[test]
    fn test_digest_parts_concatenate() {
        let whole = digest(AlgorithmId::Gost3411_512, &[b"hello world"]).unwrap();
        let parts = digest(AlgorithmId::Gost3411_512, &[b"hello", b" ", b"world"]).unwrap();
        assert_eq!(whole, parts);
        assert_eq!(whole.len(), 64);
    }

    #[test]
    fn test_unsupported_hash() {
        assert_eq!(
            digest(AlgorithmId::Sm3, &[b""]).unwrap_err(),
            CryptoError::UnsupportedHash(AlgorithmId::Sm3)
        );
        assert!(!is_supported_hash(AlgorithmId::Null));
        assert!(is_supported_hash(AlgorithmId::Gost3411_256));
    }

    #[test]
    fn test_expand_lengths() {
        assert_eq!(expand(&[b"seed"], 0).len(), 0);
        assert_eq!(expand(&[b"seed"], 66).len(), 66);
        assert_eq!(expand(&[b"seed"], 32), expand(&[b"seed"], 64)[..32].to_vec());
        assert_ne!(expand(&[b"seed"], 32), expand(&[b"other"], 32));
    }

    #[test]
    fn test_cbc_roundtrip_and_chaining() {
        let key = [7u8; 32];
        let iv = [1u8; 8];
        let data = [0x42u8; 24];

        let enc = apply_cipher(AlgorithmId::Magma, AlgorithmId::Cbc, &key, &iv, &data, false).unwrap();
        assert_eq!(enc.data.len(), 24);
        assert_eq!(enc.iv_out, enc.data[16..].to_vec());

        let dec =
            apply_cipher(AlgorithmId::Magma, AlgorithmId::Cbc, &key, &iv, &enc.data, true).unwrap();
        assert_eq!(dec.data, data);
        assert_eq!(dec.iv_out, enc.iv_out);

        // Two chained halves equal one call
        let first =
            apply_cipher(AlgorithmId::Magma, AlgorithmId::Cbc, &key, &iv, &data[..16], false).unwrap();
        let second = apply_cipher(
            AlgorithmId::Magma,
            AlgorithmId::Cbc,
            &key,
            &first.iv_out,
            &data[16..],
            false,
        )
        .unwrap();
        assert_eq!([first.data, second.data].concat(), enc.data);
    }

    #[test]
    fn test_cbc_rejects_unaligned() {
        let err = apply_cipher(
            AlgorithmId::Grasshopper,
            AlgorithmId::Cbc,
            &[0u8; 32],
            &[0u8; 16],
            &[0u8; 17],
            false,
        )
        .unwrap_err();
        assert_eq!(err, CryptoError::Unaligned { len: 17, block: 16 });
    }

    #[test]
    fn test_ctr_any_length_and_counter_advance() {
        let key = [3u8; 32];
        let iv = [0u8; 16];
        let data = vec![0x11u8; 37];

        let enc =
            apply_cipher(AlgorithmId::Grasshopper, AlgorithmId::Ctr, &key, &iv, &data, false).unwrap();
        assert_eq!(enc.data.len(), 37);
        let mut expected_iv = [0u8; 16];
        expected_iv[15] = 3;
        assert_eq!(enc.iv_out, expected_iv.to_vec());

        let dec = apply_cipher(
            AlgorithmId::Grasshopper,
            AlgorithmId::Ctr,
            &key,
            &iv,
            &enc.data,
            true,
        )
        .unwrap();
        assert_eq!(dec.data, data);
    }

    #[test]
    fn test_ctr_chaining_matches_single_call() {
        let key = [9u8; 16];
        let iv = [0xFFu8; 16];
        let data = vec![0x5Au8; 64];

        let whole = apply_cipher(AlgorithmId::Aes, AlgorithmId::Ctr, &key, &iv, &data, false).unwrap();
        let first =
            apply_cipher(AlgorithmId::Aes, AlgorithmId::Ctr, &key, &iv, &data[..32], false).unwrap();
        let second = apply_cipher(
            AlgorithmId::Aes,
            AlgorithmId::Ctr,
            &key,
            &first.iv_out,
            &data[32..],
            false,
        )
        .unwrap();
        assert_eq!([first.data, second.data].concat(), whole.data);
    }

    #[test]
    fn test_cipher_argument_errors() {
        assert_eq!(
            apply_cipher(AlgorithmId::Magma, AlgorithmId::Ctr, &[0u8; 32], &[0u8; 16], b"x", false)
                .unwrap_err(),
            CryptoError::IvLength {
                expected: 8,
                actual: 16
            }
        );
        assert_eq!(
            apply_cipher(AlgorithmId::Magma, AlgorithmId::Ofb, &[0u8; 32], &[0u8; 8], b"x", false)
                .unwrap_err(),
            CryptoError::UnsupportedMode(AlgorithmId::Ofb)
        );
        assert_eq!(
            apply_cipher(AlgorithmId::Magma, AlgorithmId::Ctr, &[0u8; 16], &[0u8; 8], b"x", false)
                .unwrap_err(),
            CryptoError::UnsupportedCipher {
                algorithm: AlgorithmId::Magma,
                key_len: 16
            }
        );
    }

    #[test]
    fn test_advance_counter_carries() {
        assert_eq!(advance_counter(&[0x00, 0xFF], 1), vec![0x01, 0x00]);
        assert_eq!(advance_counter(&[0xFF, 0xFF], 1), vec![0x00, 0x00]);
        assert_eq!(advance_counter(&[0x00, 0x00], 0x0102), vec![0x01, 0x02]);
    }

    #[test]
    fn test_wrap_roundtrip() {
        let blob = wrap(b"parent", b"name", b"secret material").unwrap();
        assert_eq!(unwrap(b"parent", b"name", &blob).unwrap(), b"secret material");
    }

    #[test]
    fn test_wrap_detects_tampering() {
        let mut blob = wrap(b"parent", b"name", b"secret material").unwrap();
        assert_eq!(unwrap(b"other", b"name", &blob), Err(CryptoError::Integrity));
        assert_eq!(unwrap(b"parent", b"renamed", &blob), Err(CryptoError::Integrity));

        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert_eq!(unwrap(b"parent", b"name", &blob), Err(CryptoError::Integrity));
        assert_eq!(unwrap(b"parent", b"name", &blob[..10]), Err(CryptoError::Integrity));
    }

    #[test]
    fn test_signature_value_depends_on_every_input() {
        let base = signature_value(AlgorithmId::Gost3411_256, b"d", b"r", b"digest", 32).unwrap();
        assert_eq!(base.len(), 32);
        assert_ne!(
            base,
            signature_value(AlgorithmId::Gost3411_256, b"e", b"r", b"digest", 32).unwrap()
        );
        assert_ne!(
            base,
            signature_value(AlgorithmId::Gost3411_256, b"d", b"q", b"digest", 32).unwrap()
        );
        assert_ne!(
            base,
            signature_value(AlgorithmId::Gost3411_256, b"d", b"r", b"digesu", 32).unwrap()
        );
    }
}
