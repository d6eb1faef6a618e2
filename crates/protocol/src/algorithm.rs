//! Algorithm identifiers and the union tag registry.
//!
//! Every algorithm-tagged union on the wire starts with a 16-bit
//! [`AlgorithmId`]. Which identifiers are legal depends on the union being
//! decoded; [`UnionKind::accepts`] is the single place that decides.

use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};
use crate::marshal::{Marshal, Reader, Unmarshal};

macro_rules! algorithms {
    ($($(#[$doc:meta])* $variant:ident = $value:literal => $name:literal,)+) => {
        /// Algorithm identifier (`TPM_ALG_ID`).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum AlgorithmId {
            $($(#[$doc])* $variant = $value,)+
        }

        impl AlgorithmId {
            /// Every known identifier, in ascending wire order.
            pub const ALL: &'static [AlgorithmId] = &[$(AlgorithmId::$variant,)+];

            /// Look up an identifier by its wire value.
            pub fn from_u16(value: u16) -> Option<Self> {
                match value {
                    $($value => Some(AlgorithmId::$variant),)+
                    _ => None,
                }
            }

            /// Short lowercase name, as accepted by [`FromStr`].
            pub fn name(self) -> &'static str {
                match self {
                    $(AlgorithmId::$variant => $name,)+
                }
            }
        }
    };
}

algorithms! {
    Rsa = 0x0001 => "rsa",
    Tdes = 0x0003 => "tdes",
    Sha1 = 0x0004 => "sha1",
    Hmac = 0x0005 => "hmac",
    Aes = 0x0006 => "aes",
    Mgf1 = 0x0007 => "mgf1",
    KeyedHash = 0x0008 => "keyedhash",
    Xor = 0x000A => "xor",
    Sha256 = 0x000B => "sha256",
    Sha384 = 0x000C => "sha384",
    Sha512 = 0x000D => "sha512",
    Null = 0x0010 => "null",
    Sm3 = 0x0012 => "sm3",
    Sm4 = 0x0013 => "sm4",
    RsaSsa = 0x0014 => "rsassa",
    RsaEs = 0x0015 => "rsaes",
    RsaPss = 0x0016 => "rsapss",
    Oaep = 0x0017 => "oaep",
    EcDsa = 0x0018 => "ecdsa",
    EcDh = 0x0019 => "ecdh",
    EcDaa = 0x001A => "ecdaa",
    Sm2 = 0x001B => "sm2",
    EcSchnorr = 0x001C => "ecschnorr",
    EcMqv = 0x001D => "ecmqv",
    Kdf1Sp800_56A = 0x0020 => "kdf1-sp800-56a",
    Kdf2 = 0x0021 => "kdf2",
    Kdf1Sp800_108 = 0x0022 => "kdf1-sp800-108",
    Ecc = 0x0023 => "ecc",
    SymCipher = 0x0025 => "symcipher",
    Camellia = 0x0026 => "camellia",
    Sha3_256 = 0x0027 => "sha3-256",
    Sha3_384 = 0x0028 => "sha3-384",
    Sha3_512 = 0x0029 => "sha3-512",
    Cmac = 0x003F => "cmac",
    Ctr = 0x0040 => "ctr",
    Ofb = 0x0041 => "ofb",
    Cbc = 0x0042 => "cbc",
    Cfb = 0x0043 => "cfb",
    Ecb = 0x0044 => "ecb",
    /// GOST R 34.11-2012, 256-bit digest (Streebog-256).
    Gost3411_256 = 0x0090 => "streebog256",
    /// GOST R 34.11-2012, 512-bit digest (Streebog-512).
    Gost3411_512 = 0x0091 => "streebog512",
    /// GOST R 34.12-2015 with a 64-bit block (Magma).
    Magma = 0x0092 => "magma",
    /// GOST R 34.12-2015 with a 128-bit block (Kuznyechik).
    Grasshopper = 0x0093 => "grasshopper",
    /// GOST R 34.10-2012 signature over 256-bit curves.
    Gost3410_256 = 0x0094 => "gost3410-256",
    /// GOST R 34.10-2012 signature over 512-bit curves.
    Gost3410_512 = 0x0095 => "gost3410-512",
}

impl AlgorithmId {
    /// Raw wire value.
    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Digest length in bytes, for hash algorithms.
    pub fn digest_size(self) -> Option<usize> {
        match self {
            AlgorithmId::Sha1 => Some(20),
            AlgorithmId::Sha256
            | AlgorithmId::Sm3
            | AlgorithmId::Sha3_256
            | AlgorithmId::Gost3411_256 => Some(32),
            AlgorithmId::Sha384 | AlgorithmId::Sha3_384 => Some(48),
            AlgorithmId::Sha512 | AlgorithmId::Sha3_512 | AlgorithmId::Gost3411_512 => Some(64),
            _ => None,
        }
    }

    /// Cipher block length in bytes, for block ciphers.
    pub fn block_size(self) -> Option<usize> {
        match self {
            AlgorithmId::Tdes | AlgorithmId::Magma => Some(8),
            AlgorithmId::Aes
            | AlgorithmId::Sm4
            | AlgorithmId::Camellia
            | AlgorithmId::Grasshopper => Some(16),
            _ => None,
        }
    }

    /// Whether this is a hash algorithm.
    #[inline]
    pub fn is_hash(self) -> bool {
        self.digest_size().is_some()
    }

    /// Whether this is a block cipher usable in a symmetric object.
    #[inline]
    pub fn is_block_cipher(self) -> bool {
        self.block_size().is_some()
    }

    /// Whether this is a cipher mode of operation.
    pub fn is_cipher_mode(self) -> bool {
        matches!(
            self,
            AlgorithmId::Ctr
                | AlgorithmId::Ofb
                | AlgorithmId::Cbc
                | AlgorithmId::Cfb
                | AlgorithmId::Ecb
        )
    }

    /// Whether the mode requires block-aligned input.
    pub fn is_block_mode(self) -> bool {
        matches!(self, AlgorithmId::Cbc | AlgorithmId::Ecb)
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        if let Some(alg) = AlgorithmId::ALL.iter().find(|a| a.name() == lower) {
            return Ok(*alg);
        }
        // Accept raw wire values such as "0x0090"
        let raw = lower
            .strip_prefix("0x")
            .and_then(|hex| u16::from_str_radix(hex, 16).ok());
        raw.and_then(AlgorithmId::from_u16)
            .ok_or(ProtocolError::InvalidValue {
                field: "algorithm name",
                value: raw.map(u32::from).unwrap_or(u32::MAX),
            })
    }
}

impl Marshal for AlgorithmId {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.as_u16().marshal(buf);
    }
}

impl Unmarshal for AlgorithmId {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        read_tag(reader, UnionKind::Algorithm)
    }
}

/// Union contexts that carry an algorithm tag.
///
/// The registry is closed: each context accepts a fixed set of tags and
/// anything else is rejected with [`ProtocolError::UnknownAlgorithmTag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnionKind {
    /// Any known algorithm.
    Algorithm,
    /// Hash selector, `NULL` allowed.
    Hash,
    /// Public object type.
    ObjectType,
    /// Symmetric object definition (`TPMT_SYM_DEF_OBJECT`).
    SymmetricObject,
    /// Block cipher mode, `NULL` allowed.
    CipherMode,
    /// Keyed-hash object scheme.
    KeyedHashScheme,
    /// RSA object scheme.
    RsaScheme,
    /// ECC object scheme.
    EccScheme,
    /// Key derivation scheme.
    KdfScheme,
    /// Signing scheme passed to Sign.
    SignatureScheme,
    /// Signature union (`TPMT_SIGNATURE`).
    Signature,
}

impl UnionKind {
    /// Whether `alg` is a legal tag in this context.
    pub fn accepts(self, alg: AlgorithmId) -> bool {
        use AlgorithmId as A;
        match self {
            UnionKind::Algorithm => true,
            UnionKind::Hash => alg == A::Null || alg.is_hash(),
            UnionKind::ObjectType => {
                matches!(alg, A::Rsa | A::KeyedHash | A::Ecc | A::SymCipher)
            }
            UnionKind::SymmetricObject => alg == A::Null || alg.is_block_cipher(),
            UnionKind::CipherMode => alg == A::Null || alg.is_cipher_mode(),
            UnionKind::KeyedHashScheme => matches!(alg, A::Null | A::Hmac | A::Xor),
            UnionKind::RsaScheme => {
                matches!(alg, A::Null | A::RsaSsa | A::RsaPss | A::RsaEs | A::Oaep)
            }
            UnionKind::EccScheme => matches!(
                alg,
                A::Null
                    | A::EcDsa
                    | A::EcDh
                    | A::EcDaa
                    | A::Sm2
                    | A::EcSchnorr
                    | A::EcMqv
                    | A::Gost3410_256
                    | A::Gost3410_512
            ),
            UnionKind::KdfScheme => matches!(
                alg,
                A::Null | A::Mgf1 | A::Kdf1Sp800_56A | A::Kdf2 | A::Kdf1Sp800_108
            ),
            UnionKind::SignatureScheme | UnionKind::Signature => matches!(
                alg,
                A::Null
                    | A::RsaSsa
                    | A::RsaPss
                    | A::EcDsa
                    | A::EcDaa
                    | A::Sm2
                    | A::EcSchnorr
                    | A::Hmac
                    | A::Gost3410_256
                    | A::Gost3410_512
            ),
        }
    }
}

impl fmt::Display for UnionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnionKind::Algorithm => "algorithm",
            UnionKind::Hash => "hash selector",
            UnionKind::ObjectType => "object type",
            UnionKind::SymmetricObject => "symmetric object definition",
            UnionKind::CipherMode => "cipher mode",
            UnionKind::KeyedHashScheme => "keyed-hash scheme",
            UnionKind::RsaScheme => "RSA scheme",
            UnionKind::EccScheme => "ECC scheme",
            UnionKind::KdfScheme => "KDF scheme",
            UnionKind::SignatureScheme => "signature scheme",
            UnionKind::Signature => "signature",
        };
        f.write_str(name)
    }
}

/// Read an algorithm tag and check it against the registry for `kind`.
pub fn read_tag(reader: &mut Reader<'_>, kind: UnionKind) -> Result<AlgorithmId> {
    let mut probe = *reader;
    let tag = probe.u16()?;
    let alg = AlgorithmId::from_u16(tag)
        .filter(|alg| kind.accepts(*alg))
        .ok_or(ProtocolError::UnknownAlgorithmTag { context: kind, tag })?;
    *reader = probe;
    Ok(alg)
}

/// Elliptic curve identifier (`TPM_ECC_CURVE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EccCurve {
    NistP192 = 0x0001,
    NistP224 = 0x0002,
    NistP256 = 0x0003,
    NistP384 = 0x0004,
    NistP521 = 0x0005,
    BnP256 = 0x0010,
    BnP638 = 0x0011,
    Sm2P256 = 0x0020,
    /// TC26 256-bit parameter set A.
    Gost256A = 0x0040,
    Gost256B = 0x0041,
    Gost256C = 0x0042,
    Gost256D = 0x0043,
    /// TC26 512-bit parameter set A.
    Gost512A = 0x0044,
    Gost512B = 0x0045,
    Gost512C = 0x0046,
}

impl EccCurve {
    /// Every known curve.
    pub const ALL: &'static [EccCurve] = &[
        EccCurve::NistP192,
        EccCurve::NistP224,
        EccCurve::NistP256,
        EccCurve::NistP384,
        EccCurve::NistP521,
        EccCurve::BnP256,
        EccCurve::BnP638,
        EccCurve::Sm2P256,
        EccCurve::Gost256A,
        EccCurve::Gost256B,
        EccCurve::Gost256C,
        EccCurve::Gost256D,
        EccCurve::Gost512A,
        EccCurve::Gost512B,
        EccCurve::Gost512C,
    ];

    /// Look up a curve by its wire value.
    pub fn from_u16(value: u16) -> Option<Self> {
        EccCurve::ALL.iter().copied().find(|c| c.as_u16() == value)
    }

    /// Raw wire value.
    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Size of one point coordinate in bytes.
    pub fn coordinate_size(self) -> usize {
        match self {
            EccCurve::NistP192 => 24,
            EccCurve::NistP224 => 28,
            EccCurve::NistP256
            | EccCurve::BnP256
            | EccCurve::Sm2P256
            | EccCurve::Gost256A
            | EccCurve::Gost256B
            | EccCurve::Gost256C
            | EccCurve::Gost256D => 32,
            EccCurve::NistP384 => 48,
            EccCurve::NistP521 => 66,
            EccCurve::BnP638 => 80,
            EccCurve::Gost512A | EccCurve::Gost512B | EccCurve::Gost512C => 64,
        }
    }

    /// The GOST R 34.10-2012 signature algorithm defined over this curve.
    pub fn gost_signature(self) -> Option<AlgorithmId> {
        match self {
            EccCurve::Gost256A | EccCurve::Gost256B | EccCurve::Gost256C | EccCurve::Gost256D => {
                Some(AlgorithmId::Gost3410_256)
            }
            EccCurve::Gost512A | EccCurve::Gost512B | EccCurve::Gost512C => {
                Some(AlgorithmId::Gost3410_512)
            }
            _ => None,
        }
    }
}

impl Marshal for EccCurve {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.as_u16().marshal(buf);
    }
}

impl Unmarshal for EccCurve {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        let value = reader.u16()?;
        EccCurve::from_u16(value).ok_or(ProtocolError::InvalidValue {
            field: "TPM_ECC_CURVE",
            value: value as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::decode_exact;

    #[test]
    fn test_wire_values_roundtrip() {
        for alg in AlgorithmId::ALL {
            assert_eq!(AlgorithmId::from_u16(alg.as_u16()), Some(*alg));
        }
        assert_eq!(AlgorithmId::from_u16(0x7777), None);
    }

    #[test]
    fn test_digest_sizes() {
        assert_eq!(AlgorithmId::Sha256.digest_size(), Some(32));
        assert_eq!(AlgorithmId::Gost3411_256.digest_size(), Some(32));
        assert_eq!(AlgorithmId::Gost3411_512.digest_size(), Some(64));
        assert_eq!(AlgorithmId::Magma.digest_size(), None);
    }

    #[test]
    fn test_block_sizes() {
        assert_eq!(AlgorithmId::Magma.block_size(), Some(8));
        assert_eq!(AlgorithmId::Grasshopper.block_size(), Some(16));
        assert_eq!(AlgorithmId::Aes.block_size(), Some(16));
        assert_eq!(AlgorithmId::Cbc.block_size(), None);
    }

    #[test]
    fn test_parse_by_name_and_value() {
        assert_eq!("streebog256".parse::<AlgorithmId>().unwrap(), AlgorithmId::Gost3411_256);
        assert_eq!("MAGMA".parse::<AlgorithmId>().unwrap(), AlgorithmId::Magma);
        assert_eq!("0x000b".parse::<AlgorithmId>().unwrap(), AlgorithmId::Sha256);
        assert!("rot13".parse::<AlgorithmId>().is_err());
    }

    #[test]
    fn test_xor_allowed_only_in_keyed_hash_scheme() {
        assert!(UnionKind::KeyedHashScheme.accepts(AlgorithmId::Xor));
        assert!(!UnionKind::SymmetricObject.accepts(AlgorithmId::Xor));
    }

    #[test]
    fn test_read_tag_rejects_unregistered() {
        let data = 0x000Au16.to_be_bytes();
        let mut reader = Reader::new(&data);
        let err = read_tag(&mut reader, UnionKind::SymmetricObject).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnknownAlgorithmTag {
                context: UnionKind::SymmetricObject,
                tag: 0x000A
            }
        );
        assert_eq!(reader.remaining(), 2);
    }

    #[test]
    fn test_read_tag_rejects_unknown_value() {
        let data = 0xBEEFu16.to_be_bytes();
        let mut reader = Reader::new(&data);
        assert!(matches!(
            read_tag(&mut reader, UnionKind::Algorithm),
            Err(ProtocolError::UnknownAlgorithmTag { tag: 0xBEEF, .. })
        ));
    }

    #[test]
    fn test_curve_codec() {
        let bytes = EccCurve::Gost512B.to_bytes();
        assert_eq!(bytes, vec![0x00, 0x45]);
        assert_eq!(decode_exact::<EccCurve>(&bytes).unwrap(), EccCurve::Gost512B);
        assert!(decode_exact::<EccCurve>(&[0x12, 0x34]).is_err());
    }

    #[test]
    fn test_gost_curves_map_to_signature() {
        assert_eq!(
            EccCurve::Gost256C.gost_signature(),
            Some(AlgorithmId::Gost3410_256)
        );
        assert_eq!(
            EccCurve::Gost512A.gost_signature(),
            Some(AlgorithmId::Gost3410_512)
        );
        assert_eq!(EccCurve::NistP256.gost_signature(), None);
    }
}
