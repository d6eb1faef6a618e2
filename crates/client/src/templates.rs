//! Object templates for the key types the flows create.

use tpm_protocol::types::{
    Authorization, EccPoint, EccScheme, KdfScheme, ObjectAttributes, PublicArea, PublicDetails,
    SensitiveCreate, SymDefObject,
};
use tpm_protocol::{AlgorithmId, Auth, Digest, EccCurve, SensitiveData};

use crate::error::{ClientError, Result};

/// Attributes every template starts from.
const BASE_ATTRIBUTES: u32 = ObjectAttributes::FIXED_TPM
    | ObjectAttributes::FIXED_PARENT
    | ObjectAttributes::SENSITIVE_DATA_ORIGIN
    | ObjectAttributes::USER_WITH_AUTH
    | ObjectAttributes::NO_DA;

/// Public template plus the sensitive inputs sent alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub public: PublicArea,
    /// Auth value the new object will require.
    pub user_auth: Auth,
}

impl Template {
    pub fn new(public: PublicArea) -> Self {
        Self {
            public,
            user_auth: Auth::empty(),
        }
    }

    pub fn with_auth(mut self, user_auth: Auth) -> Self {
        self.user_auth = user_auth;
        self
    }

    /// How later commands authorize the object built from this template.
    pub fn authorization(&self) -> Authorization {
        if self.user_auth.is_empty() {
            Authorization::Empty
        } else {
            Authorization::Password(self.user_auth.clone())
        }
    }

    pub(crate) fn sensitive(&self) -> SensitiveCreate {
        SensitiveCreate {
            user_auth: self.user_auth.clone(),
            data: SensitiveData::empty(),
        }
    }

    /// A restricted decryption key that can parent other objects.
    ///
    /// Storage keys use CFB, the only mode a storage parent may declare.
    pub fn storage(cipher: AlgorithmId) -> Result<Self> {
        let public = PublicArea {
            name_alg: name_alg_for_cipher(cipher),
            attributes: ObjectAttributes::from_bits(
                BASE_ATTRIBUTES | ObjectAttributes::RESTRICTED | ObjectAttributes::DECRYPT,
            ),
            auth_policy: Digest::empty(),
            details: PublicDetails::SymCipher {
                symmetric: SymDefObject::cipher(cipher, key_bits(cipher)?, AlgorithmId::Cfb),
                unique: Digest::empty(),
            },
        };
        Ok(Self::new(public))
    }

    /// An unrestricted symmetric key usable for both directions.
    pub fn symmetric(cipher: AlgorithmId, mode: AlgorithmId) -> Result<Self> {
        if !mode.is_cipher_mode() {
            return Err(ClientError::InvalidArgument(format!(
                "{mode} is not a cipher mode"
            )));
        }
        let public = PublicArea {
            name_alg: name_alg_for_cipher(cipher),
            attributes: ObjectAttributes::from_bits(
                BASE_ATTRIBUTES | ObjectAttributes::DECRYPT | ObjectAttributes::SIGN,
            ),
            auth_policy: Digest::empty(),
            details: PublicDetails::SymCipher {
                symmetric: SymDefObject::cipher(cipher, key_bits(cipher)?, mode),
                unique: Digest::empty(),
            },
        };
        Ok(Self::new(public))
    }

    /// A GOST R 34.10-2012 signing key on a TC26 curve.
    ///
    /// The hash is Streebog of the curve's size, which the scheme requires.
    pub fn gost_signing(curve: EccCurve) -> Result<Self> {
        let scheme = curve.gost_signature().ok_or_else(|| {
            ClientError::InvalidArgument(format!("{curve:?} is not a GOST curve"))
        })?;
        let hash = match scheme {
            AlgorithmId::Gost3410_256 => AlgorithmId::Gost3411_256,
            _ => AlgorithmId::Gost3411_512,
        };
        Ok(Self::ecc_signing(curve, scheme, hash))
    }

    /// An ECDSA signing key.
    pub fn ecdsa_signing(curve: EccCurve, hash: AlgorithmId) -> Result<Self> {
        if hash.digest_size() != Some(curve.coordinate_size()) {
            return Err(ClientError::InvalidArgument(format!(
                "{hash} does not match the size of {curve:?}"
            )));
        }
        Ok(Self::ecc_signing(curve, AlgorithmId::EcDsa, hash))
    }

    fn ecc_signing(curve: EccCurve, scheme: AlgorithmId, hash: AlgorithmId) -> Self {
        Self::new(PublicArea {
            name_alg: hash,
            attributes: ObjectAttributes::from_bits(BASE_ATTRIBUTES | ObjectAttributes::SIGN),
            auth_policy: Digest::empty(),
            details: PublicDetails::Ecc {
                symmetric: SymDefObject::Null,
                scheme: EccScheme::hashed(scheme, hash),
                curve,
                kdf: KdfScheme::Null,
                unique: EccPoint::default(),
            },
        })
    }
}

/// Key size the templates use for each cipher.
pub fn key_bits(cipher: AlgorithmId) -> Result<u16> {
    match cipher {
        AlgorithmId::Magma | AlgorithmId::Grasshopper => Ok(256),
        AlgorithmId::Aes => Ok(128),
        other => Err(ClientError::InvalidArgument(format!(
            "{other} is not a supported cipher"
        ))),
    }
}

fn name_alg_for_cipher(cipher: AlgorithmId) -> AlgorithmId {
    match cipher {
        AlgorithmId::Magma | AlgorithmId::Grasshopper => AlgorithmId::Gost3411_256,
        _ => AlgorithmId::Sha256,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_template() {
        let template = Template::storage(AlgorithmId::Grasshopper).unwrap();
        let attrs = template.public.attributes;
        assert!(attrs.restricted() && attrs.decrypt() && !attrs.sign());
        assert_eq!(
            template.public.details.symmetric(),
            Some(SymDefObject::cipher(AlgorithmId::Grasshopper, 256, AlgorithmId::Cfb))
        );
        assert_eq!(template.authorization(), Authorization::Empty);
    }

    #[test]
    fn test_symmetric_rejects_non_mode() {
        assert!(Template::symmetric(AlgorithmId::Magma, AlgorithmId::Sha256).is_err());
        assert!(Template::symmetric(AlgorithmId::Sha256, AlgorithmId::Cbc).is_err());
    }

    #[test]
    fn test_gost_signing_picks_hash() {
        let small = Template::gost_signing(EccCurve::Gost256B).unwrap();
        let large = Template::gost_signing(EccCurve::Gost512C).unwrap();
        assert_eq!(small.public.name_alg, AlgorithmId::Gost3411_256);
        assert_eq!(large.public.name_alg, AlgorithmId::Gost3411_512);
        assert!(Template::gost_signing(EccCurve::NistP256).is_err());
    }

    #[test]
    fn test_ecdsa_hash_must_fit_curve() {
        assert!(Template::ecdsa_signing(EccCurve::NistP256, AlgorithmId::Sha256).is_ok());
        assert!(Template::ecdsa_signing(EccCurve::NistP256, AlgorithmId::Sha384).is_err());
    }

    #[test]
    fn test_password_authorization() {
        let template = Template::symmetric(AlgorithmId::Aes, AlgorithmId::Ctr)
            .unwrap()
            .with_auth(Auth::new(b"secret".to_vec()).unwrap());
        assert_eq!(template.authorization().value(), b"secret");
        assert_eq!(template.sensitive().user_auth.as_bytes(), b"secret");
    }
}
