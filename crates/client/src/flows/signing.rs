//! Signing and verification with module-resident ECC keys.

use tpm_protocol::commands::{Sign, VerifySignature};
use tpm_protocol::types::{EccScheme, PublicDetails, SigScheme, Signature, Ticket};
use tpm_protocol::{AlgorithmId, Digest, EccCurve, Hierarchy, ResponseCode};

use crate::error::{ClientError, Result};
use crate::objects::{KeyBlob, Object};
use crate::templates::Template;
use crate::tpm::Tpm;
use crate::transport::Transport;

/// A loaded ECC key with a fixed signature scheme.
#[derive(Debug)]
pub struct SigningKey<'tpm, T: Transport> {
    object: Object<'tpm, T>,
    scheme: AlgorithmId,
    hash: AlgorithmId,
    curve: EccCurve,
}

impl<'tpm, T: Transport> SigningKey<'tpm, T> {
    /// Wrap a loaded object whose public area names a hashed ECC scheme.
    pub fn new(object: Object<'tpm, T>) -> Result<Self> {
        let Some(PublicDetails::Ecc {
            scheme: EccScheme::Hashed { scheme, hash },
            curve,
            ..
        }) = object.public().map(|public| &public.details)
        else {
            return Err(ClientError::InvalidArgument(format!(
                "handle {} is not an ECC signing key",
                object.handle()
            )));
        };
        let (scheme, hash, curve) = (*scheme, *hash, *curve);
        Ok(Self {
            object,
            scheme,
            hash,
            curve,
        })
    }

    pub fn load(tpm: &'tpm Tpm<T>, parent: &Object<'tpm, T>, blob: &KeyBlob) -> Result<Self> {
        Self::new(tpm.load(parent, blob)?)
    }

    pub fn scheme(&self) -> AlgorithmId {
        self.scheme
    }

    /// Hash the digest passed to [`sign`](Self::sign) must come from.
    pub fn hash(&self) -> AlgorithmId {
        self.hash
    }

    pub fn curve(&self) -> EccCurve {
        self.curve
    }

    pub fn object(&self) -> &Object<'tpm, T> {
        &self.object
    }

    /// Sign a digest computed elsewhere.
    pub fn sign(&self, digest: &[u8]) -> Result<Signature> {
        let response = self.object.tpm().execute(&Sign {
            key: self.object.auth_handle(),
            digest: Digest::new(digest.to_vec())?,
            scheme: SigScheme::Hashed {
                scheme: self.scheme,
                hash: self.hash,
            },
            validation: Ticket::null_hashcheck(),
        })?;
        Ok(response.signature)
    }

    /// Check a signature; a bad signature is an error carrying `TPM_RC_SIGNATURE`.
    pub fn verify(&self, digest: &[u8], signature: &Signature) -> Result<Ticket> {
        let response = self.object.tpm().execute(&VerifySignature {
            key: self.object.handle(),
            digest: Digest::new(digest.to_vec())?,
            signature: signature.clone(),
        })?;
        Ok(response.validation)
    }

    /// Like [`verify`](Self::verify) but a rejected signature is `Ok(false)`.
    pub fn is_valid(&self, digest: &[u8], signature: &Signature) -> Result<bool> {
        match self.verify(digest, signature) {
            Ok(_) => Ok(true),
            Err(err) if err.is_code(ResponseCode::SIGNATURE) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn release(self) -> Result<()> {
        self.object.release()
    }
}

/// Outcome of [`sign_and_verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDigest {
    pub signature: Signature,
    pub ticket: Ticket,
}

/// Create a GOST signing key under a fresh primary, sign `digest` and
/// verify the result.
pub fn sign_and_verify<T: Transport>(
    tpm: &Tpm<T>,
    curve: EccCurve,
    digest: &[u8],
) -> Result<SignedDigest> {
    let storage = Template::storage(AlgorithmId::Grasshopper)?;
    let primary = tpm.create_primary(Hierarchy::Owner, &storage)?;
    let blob = tpm.create_object(&primary, &Template::gost_signing(curve)?)?;
    let key = SigningKey::load(tpm, &primary, &blob)?;

    let signature = key.sign(digest)?;
    let ticket = key.verify(digest, &signature)?;

    key.release()?;
    primary.release()?;
    Ok(SignedDigest { signature, ticket })
}
