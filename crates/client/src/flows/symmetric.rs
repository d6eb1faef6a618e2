//! Symmetric encryption with a module-resident key.

use std::cell::Cell;

use tracing::debug;
use tpm_protocol::commands::{EncryptDecrypt, EncryptDecrypt2, EncryptDecryptResponse};
use tpm_protocol::types::{PublicDetails, SymDefObject};
use tpm_protocol::{AlgorithmId, Hierarchy, Iv, MaxBuffer, ResponseCode};

use crate::error::{ClientError, Result};
use crate::objects::{KeyBlob, Object};
use crate::templates::Template;
use crate::tpm::Tpm;
use crate::transport::Transport;

/// A loaded symmetric cipher key.
///
/// Input longer than one `TPM2B_MAX_BUFFER` is sent in 1024-byte pieces,
/// each continuing from the previous piece's `ivOut`. The module does
/// not pad: CBC and ECB input must be a whole number of blocks, or the
/// module answers `TPM_RC_SIZE`. Use the `_padded` variants to apply
/// PKCS#7 on the client side.
#[derive(Debug)]
pub struct SymmetricKey<'tpm, T: Transport> {
    object: Object<'tpm, T>,
    cipher: AlgorithmId,
    mode: AlgorithmId,
    block_size: usize,
    /// Set once the module turns out not to implement `EncryptDecrypt2`.
    legacy: Cell<bool>,
}

impl<'tpm, T: Transport> SymmetricKey<'tpm, T> {
    /// Wrap a loaded object whose public area is a symmetric cipher.
    pub fn new(object: Object<'tpm, T>) -> Result<Self> {
        let Some(PublicDetails::SymCipher {
            symmetric:
                SymDefObject::Cipher {
                    algorithm, mode, ..
                },
            ..
        }) = object.public().map(|public| &public.details)
        else {
            return Err(ClientError::InvalidArgument(format!(
                "handle {} is not a symmetric cipher key",
                object.handle()
            )));
        };
        let (cipher, mode) = (*algorithm, *mode);
        let block_size = cipher.block_size().ok_or_else(|| {
            ClientError::InvalidArgument(format!("{cipher} is not a block cipher"))
        })?;

        Ok(Self {
            object,
            cipher,
            mode,
            block_size,
            legacy: Cell::new(false),
        })
    }

    /// Load a key created with [`Template::symmetric`].
    pub fn load(tpm: &'tpm Tpm<T>, parent: &Object<'tpm, T>, blob: &KeyBlob) -> Result<Self> {
        Self::new(tpm.load(parent, blob)?)
    }

    pub fn cipher(&self) -> AlgorithmId {
        self.cipher
    }

    pub fn mode(&self) -> AlgorithmId {
        self.mode
    }

    /// IV length: the cipher's block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn object(&self) -> &Object<'tpm, T> {
        &self.object
    }

    pub fn encrypt(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.apply(false, iv, plaintext)
    }

    pub fn decrypt(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.apply(true, iv, ciphertext)
    }

    /// Encrypt, padding to the block size first when the mode needs it.
    pub fn encrypt_padded(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.mode.is_block_mode() {
            self.encrypt(iv, &pkcs7_pad(plaintext, self.block_size))
        } else {
            self.encrypt(iv, plaintext)
        }
    }

    pub fn decrypt_padded(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let plaintext = self.decrypt(iv, ciphertext)?;
        if self.mode.is_block_mode() {
            pkcs7_unpad(&plaintext, self.block_size)
        } else {
            Ok(plaintext)
        }
    }

    pub fn release(self) -> Result<()> {
        self.object.release()
    }

    fn apply(&self, decrypt: bool, iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if iv.len() != self.block_size {
            return Err(ClientError::InvalidArgument(format!(
                "{} needs a {}-byte IV, got {}",
                self.cipher,
                self.block_size,
                iv.len()
            )));
        }

        let mut output = Vec::with_capacity(data.len());
        let mut iv = Iv::new(iv.to_vec())?;
        for chunk in data.chunks(MaxBuffer::MAX_SIZE) {
            let response = self.call(decrypt, iv, MaxBuffer::new(chunk.to_vec())?)?;
            output.extend_from_slice(response.out_data.as_bytes());
            iv = response.iv_out;
        }
        Ok(output)
    }

    fn call(&self, decrypt: bool, iv_in: Iv, data: MaxBuffer) -> Result<EncryptDecryptResponse> {
        let tpm = self.object.tpm();
        if !self.legacy.get() {
            let attempt = tpm.execute(&EncryptDecrypt2 {
                key: self.object.auth_handle(),
                data: data.clone(),
                decrypt,
                mode: self.mode,
                iv_in: iv_in.clone(),
            });
            match attempt {
                Err(err) if err.is_code(ResponseCode::COMMAND_CODE) => {
                    debug!("EncryptDecrypt2 unavailable, falling back to EncryptDecrypt");
                    self.legacy.set(true);
                }
                other => return other,
            }
        }
        tpm.execute(&EncryptDecrypt {
            key: self.object.auth_handle(),
            decrypt,
            mode: self.mode,
            iv_in,
            data,
        })
    }
}

/// Result of [`round_trip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTrip {
    pub ciphertext: Vec<u8>,
    pub recovered: Vec<u8>,
}

/// Create a key under a fresh primary, encrypt and decrypt with it, and
/// release both handles.
pub fn round_trip<T: Transport>(
    tpm: &Tpm<T>,
    cipher: AlgorithmId,
    mode: AlgorithmId,
    iv: &[u8],
    plaintext: &[u8],
) -> Result<RoundTrip> {
    let primary = tpm.create_primary(Hierarchy::Owner, &Template::storage(cipher)?)?;
    let blob = tpm.create_object(&primary, &Template::symmetric(cipher, mode)?)?;
    let key = SymmetricKey::load(tpm, &primary, &blob)?;

    let ciphertext = key.encrypt(iv, plaintext)?;
    let recovered = key.decrypt(iv, &ciphertext)?;

    key.release()?;
    primary.release()?;
    Ok(RoundTrip {
        ciphertext,
        recovered,
    })
}

/// A random IV of the cipher's block size.
pub fn random_iv(cipher: AlgorithmId) -> Result<Vec<u8>> {
    let len = cipher.block_size().ok_or_else(|| {
        ClientError::InvalidArgument(format!("{cipher} is not a block cipher"))
    })?;
    Ok((0..len).map(|_| rand::random::<u8>()).collect())
}

/// PKCS#7 padding. Always adds between 1 and `block_size` bytes.
pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad = block_size - data.len() % block_size;
    let mut padded = Vec::with_capacity(data.len() + pad);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad, pad as u8);
    padded
}

pub fn pkcs7_unpad(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    let bad = || ClientError::InvalidArgument("invalid PKCS#7 padding".to_string());
    if data.is_empty() || data.len() % block_size != 0 {
        return Err(bad());
    }
    let pad = usize::from(*data.last().ok_or_else(bad)?);
    if pad == 0 || pad > block_size || data[data.len() - pad..].iter().any(|&b| usize::from(b) != pad) {
        return Err(bad());
    }
    Ok(data[..data.len() - pad].to_vec())
}
