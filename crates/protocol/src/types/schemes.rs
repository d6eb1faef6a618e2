//! Algorithm-tagged parameter unions.
//!
//! Each union is encoded as its algorithm tag followed by the variant body,
//! with no length prefix in between. Decoding reads the tag, validates it
//! against the registry for that union, and then reads exactly the body
//! the tag selects.

use crate::algorithm::{read_tag, AlgorithmId, UnionKind};
use crate::error::Result;
use crate::marshal::{Marshal, Reader, Unmarshal};

/// Symmetric algorithm used by an object (`TPMT_SYM_DEF_OBJECT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymDefObject {
    Null,
    Cipher {
        algorithm: AlgorithmId,
        key_bits: u16,
        mode: AlgorithmId,
    },
}

impl SymDefObject {
    /// Cipher definition helper.
    pub fn cipher(algorithm: AlgorithmId, key_bits: u16, mode: AlgorithmId) -> Self {
        SymDefObject::Cipher {
            algorithm,
            key_bits,
            mode,
        }
    }

    /// Union tag.
    pub fn algorithm(&self) -> AlgorithmId {
        match self {
            SymDefObject::Null => AlgorithmId::Null,
            SymDefObject::Cipher { algorithm, .. } => *algorithm,
        }
    }
}

impl Marshal for SymDefObject {
    fn marshal(&self, buf: &mut Vec<u8>) {
        match self {
            SymDefObject::Null => AlgorithmId::Null.marshal(buf),
            SymDefObject::Cipher {
                algorithm,
                key_bits,
                mode,
            } => {
                algorithm.marshal(buf);
                key_bits.marshal(buf);
                mode.marshal(buf);
            }
        }
    }
}

impl Unmarshal for SymDefObject {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        match read_tag(reader, UnionKind::SymmetricObject)? {
            AlgorithmId::Null => Ok(SymDefObject::Null),
            algorithm => Ok(SymDefObject::Cipher {
                algorithm,
                key_bits: reader.u16()?,
                mode: read_tag(reader, UnionKind::CipherMode)?,
            }),
        }
    }
}

/// Scheme of a keyed-hash object (`TPMT_KEYEDHASH_SCHEME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyedHashScheme {
    Null,
    Hmac { hash: AlgorithmId },
    Xor { hash: AlgorithmId, kdf: AlgorithmId },
}

impl Marshal for KeyedHashScheme {
    fn marshal(&self, buf: &mut Vec<u8>) {
        match self {
            KeyedHashScheme::Null => AlgorithmId::Null.marshal(buf),
            KeyedHashScheme::Hmac { hash } => {
                AlgorithmId::Hmac.marshal(buf);
                hash.marshal(buf);
            }
            KeyedHashScheme::Xor { hash, kdf } => {
                AlgorithmId::Xor.marshal(buf);
                hash.marshal(buf);
                kdf.marshal(buf);
            }
        }
    }
}

impl Unmarshal for KeyedHashScheme {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        match read_tag(reader, UnionKind::KeyedHashScheme)? {
            AlgorithmId::Hmac => Ok(KeyedHashScheme::Hmac {
                hash: read_tag(reader, UnionKind::Hash)?,
            }),
            AlgorithmId::Xor => Ok(KeyedHashScheme::Xor {
                hash: read_tag(reader, UnionKind::Hash)?,
                kdf: read_tag(reader, UnionKind::KdfScheme)?,
            }),
            _ => Ok(KeyedHashScheme::Null),
        }
    }
}

/// Scheme of an RSA object (`TPMT_RSA_SCHEME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsaScheme {
    Null,
    /// RSAES-PKCS1-v1_5, which carries no hash.
    RsaEs,
    /// RSASSA, RSAPSS, or OAEP with its hash.
    Hashed { scheme: AlgorithmId, hash: AlgorithmId },
}

impl Marshal for RsaScheme {
    fn marshal(&self, buf: &mut Vec<u8>) {
        match self {
            RsaScheme::Null => AlgorithmId::Null.marshal(buf),
            RsaScheme::RsaEs => AlgorithmId::RsaEs.marshal(buf),
            RsaScheme::Hashed { scheme, hash } => {
                scheme.marshal(buf);
                hash.marshal(buf);
            }
        }
    }
}

impl Unmarshal for RsaScheme {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        match read_tag(reader, UnionKind::RsaScheme)? {
            AlgorithmId::Null => Ok(RsaScheme::Null),
            AlgorithmId::RsaEs => Ok(RsaScheme::RsaEs),
            scheme => Ok(RsaScheme::Hashed {
                scheme,
                hash: read_tag(reader, UnionKind::Hash)?,
            }),
        }
    }
}

/// Scheme of an ECC object (`TPMT_ECC_SCHEME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EccScheme {
    Null,
    /// Any ECC scheme whose body is a single hash selector, GOST R 34.10 included.
    Hashed { scheme: AlgorithmId, hash: AlgorithmId },
    EcDaa { hash: AlgorithmId, count: u16 },
}

impl EccScheme {
    /// A scheme with a hash-only body.
    pub fn hashed(scheme: AlgorithmId, hash: AlgorithmId) -> Self {
        EccScheme::Hashed { scheme, hash }
    }

    /// Union tag.
    pub fn scheme(&self) -> AlgorithmId {
        match self {
            EccScheme::Null => AlgorithmId::Null,
            EccScheme::Hashed { scheme, .. } => *scheme,
            EccScheme::EcDaa { .. } => AlgorithmId::EcDaa,
        }
    }

    /// Hash selector, if the scheme carries one.
    pub fn hash(&self) -> Option<AlgorithmId> {
        match self {
            EccScheme::Null => None,
            EccScheme::Hashed { hash, .. } | EccScheme::EcDaa { hash, .. } => Some(*hash),
        }
    }
}

impl Marshal for EccScheme {
    fn marshal(&self, buf: &mut Vec<u8>) {
        match self {
            EccScheme::Null => AlgorithmId::Null.marshal(buf),
            EccScheme::Hashed { scheme, hash } => {
                scheme.marshal(buf);
                hash.marshal(buf);
            }
            EccScheme::EcDaa { hash, count } => {
                AlgorithmId::EcDaa.marshal(buf);
                hash.marshal(buf);
                count.marshal(buf);
            }
        }
    }
}

impl Unmarshal for EccScheme {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        match read_tag(reader, UnionKind::EccScheme)? {
            AlgorithmId::Null => Ok(EccScheme::Null),
            AlgorithmId::EcDaa => Ok(EccScheme::EcDaa {
                hash: read_tag(reader, UnionKind::Hash)?,
                count: reader.u16()?,
            }),
            scheme => Ok(EccScheme::Hashed {
                scheme,
                hash: read_tag(reader, UnionKind::Hash)?,
            }),
        }
    }
}

/// Key derivation function (`TPMT_KDF_SCHEME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfScheme {
    Null,
    Hashed { scheme: AlgorithmId, hash: AlgorithmId },
}

impl Marshal for KdfScheme {
    fn marshal(&self, buf: &mut Vec<u8>) {
        match self {
            KdfScheme::Null => AlgorithmId::Null.marshal(buf),
            KdfScheme::Hashed { scheme, hash } => {
                scheme.marshal(buf);
                hash.marshal(buf);
            }
        }
    }
}

impl Unmarshal for KdfScheme {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        match read_tag(reader, UnionKind::KdfScheme)? {
            AlgorithmId::Null => Ok(KdfScheme::Null),
            scheme => Ok(KdfScheme::Hashed {
                scheme,
                hash: read_tag(reader, UnionKind::Hash)?,
            }),
        }
    }
}

/// Signing scheme passed to Sign (`TPMT_SIG_SCHEME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigScheme {
    /// Use the key's own scheme.
    Null,
    Hashed { scheme: AlgorithmId, hash: AlgorithmId },
    EcDaa { hash: AlgorithmId, count: u16 },
}

impl SigScheme {
    /// Union tag.
    pub fn scheme(&self) -> AlgorithmId {
        match self {
            SigScheme::Null => AlgorithmId::Null,
            SigScheme::Hashed { scheme, .. } => *scheme,
            SigScheme::EcDaa { .. } => AlgorithmId::EcDaa,
        }
    }
}

impl From<EccScheme> for SigScheme {
    fn from(scheme: EccScheme) -> Self {
        match scheme {
            EccScheme::Null => SigScheme::Null,
            EccScheme::Hashed { scheme, hash } => SigScheme::Hashed { scheme, hash },
            EccScheme::EcDaa { hash, count } => SigScheme::EcDaa { hash, count },
        }
    }
}

impl Marshal for SigScheme {
    fn marshal(&self, buf: &mut Vec<u8>) {
        match self {
            SigScheme::Null => AlgorithmId::Null.marshal(buf),
            SigScheme::Hashed { scheme, hash } => {
                scheme.marshal(buf);
                hash.marshal(buf);
            }
            SigScheme::EcDaa { hash, count } => {
                AlgorithmId::EcDaa.marshal(buf);
                hash.marshal(buf);
                count.marshal(buf);
            }
        }
    }
}

impl Unmarshal for SigScheme {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        match read_tag(reader, UnionKind::SignatureScheme)? {
            AlgorithmId::Null => Ok(SigScheme::Null),
            AlgorithmId::EcDaa => Ok(SigScheme::EcDaa {
                hash: read_tag(reader, UnionKind::Hash)?,
                count: reader.u16()?,
            }),
            scheme => Ok(SigScheme::Hashed {
                scheme,
                hash: read_tag(reader, UnionKind::Hash)?,
            }),
        }
    }
}
