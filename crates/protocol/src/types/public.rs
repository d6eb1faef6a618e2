//! Public areas and creation inputs.

use crate::algorithm::{read_tag, AlgorithmId, EccCurve, UnionKind};
use crate::buffers::{Auth, Digest, EccParameter, PublicKeyRsa, SensitiveData};
use crate::error::Result;
use crate::marshal::{Marshal, Reader, Unmarshal};

use super::attributes::ObjectAttributes;
use super::schemes::{EccScheme, KdfScheme, KeyedHashScheme, RsaScheme, SymDefObject};

/// ECC point (`TPMS_ECC_POINT`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EccPoint {
    pub x: EccParameter,
    pub y: EccParameter,
}

impl Marshal for EccPoint {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.x.marshal(buf);
        self.y.marshal(buf);
    }
}

impl Unmarshal for EccPoint {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            x: reader.read()?,
            y: reader.read()?,
        })
    }
}

/// Type-specific parameters together with the matching unique field.
///
/// Keeping both halves in one variant means the parameters and the unique
/// identifier can never describe different object types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PublicDetails {
    KeyedHash {
        scheme: KeyedHashScheme,
        unique: Digest,
    },
    SymCipher {
        symmetric: SymDefObject,
        unique: Digest,
    },
    Rsa {
        symmetric: SymDefObject,
        scheme: RsaScheme,
        key_bits: u16,
        /// Zero selects the default exponent 65537.
        exponent: u32,
        unique: PublicKeyRsa,
    },
    Ecc {
        symmetric: SymDefObject,
        scheme: EccScheme,
        curve: EccCurve,
        kdf: KdfScheme,
        unique: EccPoint,
    },
}

impl PublicDetails {
    /// Object type tag (`TPMI_ALG_PUBLIC`).
    pub fn object_type(&self) -> AlgorithmId {
        match self {
            PublicDetails::KeyedHash { .. } => AlgorithmId::KeyedHash,
            PublicDetails::SymCipher { .. } => AlgorithmId::SymCipher,
            PublicDetails::Rsa { .. } => AlgorithmId::Rsa,
            PublicDetails::Ecc { .. } => AlgorithmId::Ecc,
        }
    }

    /// Symmetric definition, for object types that carry one.
    pub fn symmetric(&self) -> Option<SymDefObject> {
        match self {
            PublicDetails::KeyedHash { .. } => None,
            PublicDetails::SymCipher { symmetric, .. }
            | PublicDetails::Rsa { symmetric, .. }
            | PublicDetails::Ecc { symmetric, .. } => Some(*symmetric),
        }
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        match self {
            PublicDetails::KeyedHash { scheme, .. } => scheme.marshal(buf),
            PublicDetails::SymCipher { symmetric, .. } => symmetric.marshal(buf),
            PublicDetails::Rsa {
                symmetric,
                scheme,
                key_bits,
                exponent,
                ..
            } => {
                symmetric.marshal(buf);
                scheme.marshal(buf);
                key_bits.marshal(buf);
                exponent.marshal(buf);
            }
            PublicDetails::Ecc {
                symmetric,
                scheme,
                curve,
                kdf,
                ..
            } => {
                symmetric.marshal(buf);
                scheme.marshal(buf);
                curve.marshal(buf);
                kdf.marshal(buf);
            }
        }
    }

    fn marshal_unique(&self, buf: &mut Vec<u8>) {
        match self {
            PublicDetails::KeyedHash { unique, .. } | PublicDetails::SymCipher { unique, .. } => {
                unique.marshal(buf)
            }
            PublicDetails::Rsa { unique, .. } => unique.marshal(buf),
            PublicDetails::Ecc { unique, .. } => unique.marshal(buf),
        }
    }

    fn unmarshal_for(object_type: AlgorithmId, reader: &mut Reader<'_>) -> Result<Self> {
        match object_type {
            AlgorithmId::KeyedHash => Ok(PublicDetails::KeyedHash {
                scheme: reader.read()?,
                unique: reader.read()?,
            }),
            AlgorithmId::SymCipher => Ok(PublicDetails::SymCipher {
                symmetric: reader.read()?,
                unique: reader.read()?,
            }),
            AlgorithmId::Rsa => Ok(PublicDetails::Rsa {
                symmetric: reader.read()?,
                scheme: reader.read()?,
                key_bits: reader.u16()?,
                exponent: reader.u32()?,
                unique: reader.read()?,
            }),
            // read_tag(ObjectType) only lets the four object types through
            _ => Ok(PublicDetails::Ecc {
                symmetric: reader.read()?,
                scheme: reader.read()?,
                curve: reader.read()?,
                kdf: reader.read()?,
                unique: reader.read()?,
            }),
        }
    }
}

/// Public area of an object (`TPMT_PUBLIC`).
///
/// On the wire this travels inside a 16-bit size field (`TPM2B_PUBLIC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicArea {
    pub name_alg: AlgorithmId,
    pub attributes: ObjectAttributes,
    pub auth_policy: Digest,
    pub details: PublicDetails,
}

impl PublicArea {
    /// Object type tag.
    pub fn object_type(&self) -> AlgorithmId {
        self.details.object_type()
    }
}

impl Marshal for PublicArea {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.object_type().marshal(buf);
        self.name_alg.marshal(buf);
        self.attributes.marshal(buf);
        self.auth_policy.marshal(buf);
        self.details.marshal_parameters(buf);
        self.details.marshal_unique(buf);
    }
}

impl Unmarshal for PublicArea {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        let object_type = read_tag(reader, UnionKind::ObjectType)?;
        let name_alg = read_tag(reader, UnionKind::Hash)?;
        let attributes = reader.read()?;
        let auth_policy = reader.read()?;
        let details = PublicDetails::unmarshal_for(object_type, reader)?;
        Ok(Self {
            name_alg,
            attributes,
            auth_policy,
            details,
        })
    }
}

/// Secret inputs to object creation (`TPMS_SENSITIVE_CREATE`).
///
/// On the wire this travels inside a 16-bit size field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensitiveCreate {
    pub user_auth: Auth,
    pub data: SensitiveData,
}

impl Marshal for SensitiveCreate {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.user_auth.marshal(buf);
        self.data.marshal(buf);
    }
}

impl Unmarshal for SensitiveCreate {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            user_auth: reader.read()?,
            data: reader.read()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::marshal::{decode_exact, put_sized_struct, Reader};

    fn ecc_template() -> PublicArea {
        PublicArea {
            name_alg: AlgorithmId::Gost3411_256,
            attributes: ObjectAttributes::from_bits(
                ObjectAttributes::FIXED_TPM
                    | ObjectAttributes::FIXED_PARENT
                    | ObjectAttributes::SENSITIVE_DATA_ORIGIN
                    | ObjectAttributes::USER_WITH_AUTH
                    | ObjectAttributes::SIGN,
            ),
            auth_policy: Digest::empty(),
            details: PublicDetails::Ecc {
                symmetric: SymDefObject::Null,
                scheme: EccScheme::hashed(AlgorithmId::Gost3410_256, AlgorithmId::Gost3411_256),
                curve: EccCurve::Gost256A,
                kdf: KdfScheme::Null,
                unique: EccPoint::default(),
            },
        }
    }

    #[test]
    fn test_ecc_public_layout() {
        let bytes = ecc_template().to_bytes();
        #[rustfmt::skip]
        let expected = vec![
            0x00, 0x23,             // type ECC
            0x00, 0x90,             // nameAlg streebog256
            0x00, 0x04, 0x00, 0x72, // attributes
            0x00, 0x00,             // empty policy
            0x00, 0x10,             // symmetric NULL
            0x00, 0x94, 0x00, 0x90, // scheme gost3410-256 / streebog256
            0x00, 0x40,             // curve tc26 256 A
            0x00, 0x10,             // kdf NULL
            0x00, 0x00, 0x00, 0x00, // unique x, y
        ];
        assert_eq!(bytes, expected);
        assert_eq!(decode_exact::<PublicArea>(&bytes).unwrap(), ecc_template());
    }

    #[test]
    fn test_rsa_public_roundtrip() {
        let public = PublicArea {
            name_alg: AlgorithmId::Sha256,
            attributes: ObjectAttributes::from_bits(
                ObjectAttributes::RESTRICTED | ObjectAttributes::DECRYPT,
            ),
            auth_policy: Digest::empty(),
            details: PublicDetails::Rsa {
                symmetric: SymDefObject::cipher(AlgorithmId::Aes, 128, AlgorithmId::Cfb),
                scheme: RsaScheme::Null,
                key_bits: 2048,
                exponent: 0,
                unique: PublicKeyRsa::new(vec![0xC3; 256]).unwrap(),
            },
        };
        let mut buf = Vec::new();
        put_sized_struct(&mut buf, &public);
        let mut reader = Reader::new(&buf);
        let decoded: PublicArea = reader.sized_struct("TPM2B_PUBLIC").unwrap();
        assert_eq!(decoded, public);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_public_rejects_non_object_type() {
        // SHA-256 in the type position
        let bytes = [0x00, 0x0B, 0x00, 0x0B];
        assert!(matches!(
            decode_exact::<PublicArea>(&bytes),
            Err(ProtocolError::UnknownAlgorithmTag {
                context: UnionKind::ObjectType,
                tag: 0x000B
            })
        ));
    }

    #[test]
    fn test_sensitive_create_roundtrip() {
        let sensitive = SensitiveCreate {
            user_auth: Auth::new(b"pw".to_vec()).unwrap(),
            data: SensitiveData::empty(),
        };
        let bytes = sensitive.to_bytes();
        assert_eq!(bytes, vec![0x00, 0x02, b'p', b'w', 0x00, 0x00]);
        assert_eq!(decode_exact::<SensitiveCreate>(&bytes).unwrap(), sensitive);
    }
}
