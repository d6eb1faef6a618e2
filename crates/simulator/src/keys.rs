//! Template rules and key material.
//!
//! Validation answers with the bare format-1 code; the dispatcher adds
//! the parameter number of the template it came from.

use tpm_protocol::types::{
    EccPoint, EccScheme, KdfScheme, KeyedHashScheme, PublicArea, PublicDetails, RsaScheme,
    SensitiveCreate, SymDefObject,
};
use tpm_protocol::{AlgorithmId, Digest, EccCurve, EccParameter, Marshal, Name, PublicKeyRsa, ResponseCode};

use crate::crypto;

/// Curves the simulator can create keys on.
pub fn is_supported_curve(curve: EccCurve) -> bool {
    curve.gost_signature().is_some() || matches!(curve, EccCurve::NistP256 | EccCurve::NistP384)
}

/// Key sizes accepted for each block cipher.
fn cipher_key_bits(algorithm: AlgorithmId) -> &'static [u16] {
    match algorithm {
        AlgorithmId::Magma | AlgorithmId::Grasshopper => &[256],
        AlgorithmId::Aes => &[128, 192, 256],
        _ => &[],
    }
}

/// Check a symmetric definition. Storage parents may name any mode since
/// the simulator only uses the definition to mark them as parents.
fn check_symmetric(symmetric: &SymDefObject, storage: bool) -> Result<(), ResponseCode> {
    let SymDefObject::Cipher {
        algorithm,
        key_bits,
        mode,
    } = *symmetric
    else {
        return Err(ResponseCode::SYMMETRIC);
    };
    let sizes = cipher_key_bits(algorithm);
    if sizes.is_empty() {
        return Err(ResponseCode::SYMMETRIC);
    }
    if !sizes.contains(&key_bits) {
        return Err(ResponseCode::KEY_SIZE);
    }
    let mode_ok = match mode {
        AlgorithmId::Null | AlgorithmId::Ctr | AlgorithmId::Cbc => true,
        AlgorithmId::Cfb => storage,
        _ => false,
    };
    if !mode_ok {
        return Err(ResponseCode::MODE);
    }
    Ok(())
}

/// Asymmetric keys carry a symmetric definition only when they are
/// storage parents.
fn check_parent_symmetric(public: &PublicArea, symmetric: &SymDefObject) -> Result<(), ResponseCode> {
    if is_storage_parent(public) {
        check_symmetric(symmetric, true)
    } else if *symmetric != SymDefObject::Null {
        Err(ResponseCode::SYMMETRIC)
    } else {
        Ok(())
    }
}

fn check_ecc_scheme(public: &PublicArea, scheme: &EccScheme, curve: EccCurve) -> Result<(), ResponseCode> {
    let attrs = public.attributes;
    match *scheme {
        EccScheme::Null => Ok(()),
        _ if attrs.restricted() && attrs.decrypt() => Err(ResponseCode::SCHEME),
        EccScheme::EcDaa { .. } => Err(ResponseCode::SCHEME),
        EccScheme::Hashed { scheme, hash } => {
            if !crypto::is_supported_hash(hash) {
                return Err(ResponseCode::HASH);
            }
            match scheme {
                AlgorithmId::Gost3410_256 | AlgorithmId::Gost3410_512 => {
                    if curve.gost_signature() != Some(scheme) {
                        return Err(ResponseCode::CURVE);
                    }
                    if hash.digest_size() != Some(curve.coordinate_size()) {
                        return Err(ResponseCode::HASH);
                    }
                    Ok(())
                }
                AlgorithmId::EcDsa | AlgorithmId::EcSchnorr if attrs.sign() => Ok(()),
                AlgorithmId::EcDh | AlgorithmId::EcMqv if attrs.decrypt() => Ok(()),
                _ => Err(ResponseCode::SCHEME),
            }
        }
    }
}

/// Validate a creation template and its sensitive half.
pub fn validate(public: &PublicArea, sensitive: &SensitiveCreate) -> Result<(), ResponseCode> {
    let attrs = public.attributes;
    if attrs.has_reserved_bits() {
        return Err(ResponseCode::RESERVED_BITS);
    }
    if !crypto::is_supported_hash(public.name_alg) {
        return Err(ResponseCode::HASH);
    }
    if attrs.fixed_tpm() && !attrs.fixed_parent() {
        return Err(ResponseCode::ATTRIBUTES);
    }

    let sealed_data = !sensitive.data.is_empty();
    if sealed_data == attrs.sensitive_data_origin() {
        return Err(ResponseCode::ATTRIBUTES);
    }
    if sealed_data && !matches!(public.details, PublicDetails::KeyedHash { .. }) {
        return Err(ResponseCode::VALUE);
    }

    if attrs.restricted() && attrs.sign() == attrs.decrypt() {
        return Err(ResponseCode::ATTRIBUTES);
    }
    if !sealed_data && !attrs.sign() && !attrs.decrypt() {
        return Err(ResponseCode::ATTRIBUTES);
    }

    match &public.details {
        PublicDetails::KeyedHash { scheme, .. } => match *scheme {
            KeyedHashScheme::Null => Ok(()),
            KeyedHashScheme::Hmac { hash } if crypto::is_supported_hash(hash) => Ok(()),
            KeyedHashScheme::Hmac { .. } => Err(ResponseCode::HASH),
            KeyedHashScheme::Xor { .. } => Err(ResponseCode::SCHEME),
        },
        PublicDetails::SymCipher { symmetric, .. } => {
            check_symmetric(symmetric, is_storage_parent(public))
        }
        PublicDetails::Rsa {
            symmetric,
            scheme,
            key_bits,
            exponent,
            ..
        } => {
            if ![1024, 2048, 3072, 4096].contains(key_bits) {
                return Err(ResponseCode::KEY_SIZE);
            }
            if *exponent != 0 && *exponent != 65537 {
                return Err(ResponseCode::VALUE);
            }
            if is_storage_parent(public) && *scheme != RsaScheme::Null {
                return Err(ResponseCode::SCHEME);
            }
            check_parent_symmetric(public, symmetric)
        }
        PublicDetails::Ecc {
            symmetric,
            scheme,
            curve,
            kdf,
            ..
        } => {
            if !is_supported_curve(*curve) {
                return Err(ResponseCode::CURVE);
            }
            if *kdf != KdfScheme::Null {
                return Err(ResponseCode::KDF);
            }
            check_ecc_scheme(public, scheme, *curve)?;
            check_parent_symmetric(public, symmetric)
        }
    }
}

/// Restricted decryption keys with a symmetric definition can hold children.
pub fn is_storage_parent(public: &PublicArea) -> bool {
    let attrs = public.attributes;
    attrs.restricted()
        && attrs.decrypt()
        && !attrs.sign()
        && public
            .details
            .symmetric()
            .is_some_and(|symmetric| symmetric != SymDefObject::Null)
}

/// Length of the secret value generated for an object.
pub fn secret_len(public: &PublicArea) -> usize {
    match &public.details {
        PublicDetails::KeyedHash { .. } => 32,
        PublicDetails::SymCipher { symmetric, .. } => match symmetric {
            SymDefObject::Cipher { key_bits, .. } => usize::from(*key_bits) / 8,
            SymDefObject::Null => 0,
        },
        PublicDetails::Rsa { .. } => 32,
        PublicDetails::Ecc { curve, .. } => curve.coordinate_size(),
    }
}

fn buffer_error(_: tpm_protocol::ProtocolError) -> ResponseCode {
    ResponseCode::SIZE
}

fn hash_error(_: crypto::CryptoError) -> ResponseCode {
    ResponseCode::HASH
}

/// Fill in the unique field of `template` from the object's secret.
pub fn complete_public(template: &PublicArea, secret: &[u8]) -> Result<PublicArea, ResponseCode> {
    let name_alg = template.name_alg;
    let details = match &template.details {
        PublicDetails::KeyedHash { scheme, .. } => PublicDetails::KeyedHash {
            scheme: *scheme,
            unique: Digest::new(crypto::digest(name_alg, &[b"KEYEDHASH", secret]).map_err(hash_error)?)
                .map_err(buffer_error)?,
        },
        PublicDetails::SymCipher { symmetric, .. } => PublicDetails::SymCipher {
            symmetric: *symmetric,
            unique: Digest::new(crypto::digest(name_alg, &[b"SYMCIPHER", secret]).map_err(hash_error)?)
                .map_err(buffer_error)?,
        },
        PublicDetails::Rsa {
            symmetric,
            scheme,
            key_bits,
            exponent,
            ..
        } => PublicDetails::Rsa {
            symmetric: *symmetric,
            scheme: *scheme,
            key_bits: *key_bits,
            exponent: *exponent,
            unique: PublicKeyRsa::new(crypto::expand(&[b"RSA", secret], usize::from(*key_bits) / 8))
                .map_err(buffer_error)?,
        },
        PublicDetails::Ecc {
            symmetric,
            scheme,
            curve,
            kdf,
            ..
        } => {
            let size = curve.coordinate_size();
            PublicDetails::Ecc {
                symmetric: *symmetric,
                scheme: *scheme,
                curve: *curve,
                kdf: *kdf,
                unique: EccPoint {
                    x: EccParameter::new(crypto::expand(&[b"ECC-X", secret], size))
                        .map_err(buffer_error)?,
                    y: EccParameter::new(crypto::expand(&[b"ECC-Y", secret], size))
                        .map_err(buffer_error)?,
                },
            }
        }
    };
    Ok(PublicArea {
        name_alg,
        attributes: template.attributes,
        auth_policy: template.auth_policy.clone(),
        details,
    })
}

/// `nameAlg || H_nameAlg(public)`.
pub fn object_name(public: &PublicArea) -> Result<Name, ResponseCode> {
    let mut name = public.name_alg.to_bytes();
    name.extend(crypto::digest(public.name_alg, &[&public.to_bytes()]).map_err(hash_error)?);
    Name::new(name).map_err(buffer_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpm_protocol::types::{EccScheme, ObjectAttributes};
    use tpm_protocol::{Auth, SensitiveData};

    fn generated() -> SensitiveCreate {
        SensitiveCreate {
            user_auth: Auth::empty(),
            data: SensitiveData::empty(),
        }
    }

    fn key_attrs(extra: u32) -> ObjectAttributes {
        ObjectAttributes::from_bits(
            ObjectAttributes::FIXED_TPM
                | ObjectAttributes::FIXED_PARENT
                | ObjectAttributes::SENSITIVE_DATA_ORIGIN
                | ObjectAttributes::USER_WITH_AUTH
                | extra,
        )
    }

    fn symmetric(algorithm: AlgorithmId, bits: u16, mode: AlgorithmId) -> PublicArea {
        PublicArea {
            name_alg: AlgorithmId::Gost3411_256,
            attributes: key_attrs(ObjectAttributes::DECRYPT | ObjectAttributes::SIGN),
            auth_policy: Digest::empty(),
            details: PublicDetails::SymCipher {
                symmetric: SymDefObject::cipher(algorithm, bits, mode),
                unique: Digest::empty(),
            },
        }
    }

    fn ecc(curve: EccCurve, scheme: AlgorithmId, hash: AlgorithmId) -> PublicArea {
        PublicArea {
            name_alg: hash,
            attributes: key_attrs(ObjectAttributes::SIGN),
            auth_policy: Digest::empty(),
            details: PublicDetails::Ecc {
                symmetric: SymDefObject::Null,
                scheme: EccScheme::hashed(scheme, hash),
                curve,
                kdf: KdfScheme::Null,
                unique: EccPoint::default(),
            },
        }
    }

    #[test]
    fn test_valid_templates() {
        validate(&symmetric(AlgorithmId::Magma, 256, AlgorithmId::Cbc), &generated()).unwrap();
        validate(&symmetric(AlgorithmId::Aes, 128, AlgorithmId::Null), &generated()).unwrap();
        validate(
            &ecc(EccCurve::Gost512C, AlgorithmId::Gost3410_512, AlgorithmId::Gost3411_512),
            &generated(),
        )
        .unwrap();
    }

    #[test]
    fn test_symmetric_rejections() {
        assert_eq!(
            validate(&symmetric(AlgorithmId::Magma, 128, AlgorithmId::Cbc), &generated()),
            Err(ResponseCode::KEY_SIZE)
        );
        assert_eq!(
            validate(&symmetric(AlgorithmId::Grasshopper, 256, AlgorithmId::Ofb), &generated()),
            Err(ResponseCode::MODE)
        );
        assert_eq!(
            validate(&symmetric(AlgorithmId::Camellia, 128, AlgorithmId::Cbc), &generated()),
            Err(ResponseCode::SYMMETRIC)
        );
    }

    #[test]
    fn test_gost_curve_must_match_scheme_and_hash() {
        assert_eq!(
            validate(
                &ecc(EccCurve::Gost256A, AlgorithmId::Gost3410_512, AlgorithmId::Gost3411_512),
                &generated()
            ),
            Err(ResponseCode::CURVE)
        );
        assert_eq!(
            validate(
                &ecc(EccCurve::Gost256B, AlgorithmId::Gost3410_256, AlgorithmId::Gost3411_512),
                &generated()
            ),
            Err(ResponseCode::HASH)
        );
        assert_eq!(
            validate(
                &ecc(EccCurve::BnP256, AlgorithmId::EcDsa, AlgorithmId::Sha256),
                &generated()
            ),
            Err(ResponseCode::CURVE)
        );
    }

    #[test]
    fn test_attribute_rules() {
        let mut template = symmetric(AlgorithmId::Magma, 256, AlgorithmId::Ctr);
        template.attributes = template.attributes.with(ObjectAttributes::FIXED_PARENT, false);
        assert_eq!(validate(&template, &generated()), Err(ResponseCode::ATTRIBUTES));

        let mut template = symmetric(AlgorithmId::Magma, 256, AlgorithmId::Ctr);
        template.attributes = template.attributes.with(ObjectAttributes::RESTRICTED, true);
        assert_eq!(validate(&template, &generated()), Err(ResponseCode::ATTRIBUTES));

        let mut template = symmetric(AlgorithmId::Magma, 256, AlgorithmId::Ctr);
        template.attributes = ObjectAttributes::from_bits(template.attributes.bits() | 1);
        assert_eq!(validate(&template, &generated()), Err(ResponseCode::RESERVED_BITS));
    }

    #[test]
    fn test_complete_public_is_deterministic() {
        let template = ecc(EccCurve::Gost256A, AlgorithmId::Gost3410_256, AlgorithmId::Gost3411_256);
        let a = complete_public(&template, b"secret").unwrap();
        let b = complete_public(&template, b"secret").unwrap();
        let c = complete_public(&template, b"other").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        match a.details {
            PublicDetails::Ecc { unique, .. } => {
                assert_eq!(unique.x.len(), 32);
                assert_eq!(unique.y.len(), 32);
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn test_object_name_prefix() {
        let public = complete_public(&symmetric(AlgorithmId::Magma, 256, AlgorithmId::Cbc), b"k").unwrap();
        let name = object_name(&public).unwrap();
        assert_eq!(name.len(), 34);
        assert_eq!(&name.as_bytes()[..2], &[0x00, 0x90]);
    }

    #[test]
    fn test_storage_parent_detection() {
        let mut template = symmetric(AlgorithmId::Aes, 128, AlgorithmId::Cfb);
        template.attributes = key_attrs(ObjectAttributes::RESTRICTED | ObjectAttributes::DECRYPT);
        assert!(is_storage_parent(&template));
        assert!(!is_storage_parent(&symmetric(AlgorithmId::Aes, 128, AlgorithmId::Cfb)));
    }
}
