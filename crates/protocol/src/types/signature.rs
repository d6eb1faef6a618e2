//! Signatures and tagged hash values.

use crate::algorithm::{read_tag, AlgorithmId, UnionKind};
use crate::buffers::{EccParameter, PublicKeyRsa};
use crate::error::{ProtocolError, Result};
use crate::marshal::{Marshal, Reader, Unmarshal};

/// A digest tagged with its algorithm (`TPMT_HA`).
///
/// The digest length is fixed by the algorithm, so there is no size field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashValue {
    hash: AlgorithmId,
    digest: Vec<u8>,
}

impl HashValue {
    /// Pair `digest` with `hash`, checking the length matches the algorithm.
    pub fn new(hash: AlgorithmId, digest: Vec<u8>) -> Result<Self> {
        let expected = hash.digest_size().unwrap_or(0);
        if digest.len() != expected {
            return Err(ProtocolError::InvalidValue {
                field: "TPMT_HA digest length",
                value: digest.len() as u32,
            });
        }
        Ok(Self { hash, digest })
    }

    pub fn hash(&self) -> AlgorithmId {
        self.hash
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }
}

impl Marshal for HashValue {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.hash.marshal(buf);
        buf.extend_from_slice(&self.digest);
    }
}

impl Unmarshal for HashValue {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        let hash = read_tag(reader, UnionKind::Hash)?;
        let size = hash.digest_size().unwrap_or(0);
        Ok(Self {
            hash,
            digest: reader.bytes(size)?.to_vec(),
        })
    }
}

/// Signature union (`TPMT_SIGNATURE`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signature {
    Null,
    /// RSASSA or RSAPSS.
    Rsa {
        scheme: AlgorithmId,
        hash: AlgorithmId,
        sig: PublicKeyRsa,
    },
    /// Any `(r, s)` signature: ECDSA, ECDAA, SM2, EC-Schnorr, GOST R 34.10.
    Ecc {
        scheme: AlgorithmId,
        hash: AlgorithmId,
        r: EccParameter,
        s: EccParameter,
    },
    Hmac(HashValue),
}

impl Signature {
    /// Union tag.
    pub fn scheme(&self) -> AlgorithmId {
        match self {
            Signature::Null => AlgorithmId::Null,
            Signature::Rsa { scheme, .. } | Signature::Ecc { scheme, .. } => *scheme,
            Signature::Hmac(_) => AlgorithmId::Hmac,
        }
    }
}

impl Marshal for Signature {
    fn marshal(&self, buf: &mut Vec<u8>) {
        match self {
            Signature::Null => AlgorithmId::Null.marshal(buf),
            Signature::Rsa { scheme, hash, sig } => {
                scheme.marshal(buf);
                hash.marshal(buf);
                sig.marshal(buf);
            }
            Signature::Ecc { scheme, hash, r, s } => {
                scheme.marshal(buf);
                hash.marshal(buf);
                r.marshal(buf);
                s.marshal(buf);
            }
            Signature::Hmac(value) => {
                AlgorithmId::Hmac.marshal(buf);
                value.marshal(buf);
            }
        }
    }
}

impl Unmarshal for Signature {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        match read_tag(reader, UnionKind::Signature)? {
            AlgorithmId::Null => Ok(Signature::Null),
            AlgorithmId::Hmac => Ok(Signature::Hmac(reader.read()?)),
            scheme @ (AlgorithmId::RsaSsa | AlgorithmId::RsaPss) => Ok(Signature::Rsa {
                scheme,
                hash: read_tag(reader, UnionKind::Hash)?,
                sig: reader.read()?,
            }),
            scheme => Ok(Signature::Ecc {
                scheme,
                hash: read_tag(reader, UnionKind::Hash)?,
                r: reader.read()?,
                s: reader.read()?,
            }),
        }
    }
}
