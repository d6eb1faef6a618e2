//! Length-prefixed byte buffers (`TPM2B_*`).
//!
//! Each buffer type enforces its own maximum both when constructed and when
//! decoded, so a value that exists is always encodable.

use crate::error::{ProtocolError, Result};
use crate::marshal::{put_sized, Marshal, Reader, Unmarshal};

macro_rules! sized_buffer {
    ($(#[$doc:meta])* $name:ident, $wire:literal, $max:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
        pub struct $name(Vec<u8>);

        impl $name {
            /// Largest payload this buffer type may carry.
            pub const MAX_SIZE: usize = $max;

            /// Wrap `bytes`, rejecting payloads above [`Self::MAX_SIZE`].
            pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
                let bytes = bytes.into();
                if bytes.len() > Self::MAX_SIZE {
                    return Err(ProtocolError::BufferTooLarge {
                        kind: $wire,
                        len: bytes.len(),
                        max: Self::MAX_SIZE,
                    });
                }
                Ok(Self(bytes))
            }

            /// A zero-length buffer.
            pub fn empty() -> Self {
                Self(Vec::new())
            }

            /// Borrow the payload.
            #[inline]
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Take the payload.
            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }

            /// Payload length.
            #[inline]
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// Whether the payload is empty.
            #[inline]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = ProtocolError;

            fn try_from(bytes: &[u8]) -> Result<Self> {
                Self::new(bytes)
            }
        }

        impl Marshal for $name {
            fn marshal(&self, buf: &mut Vec<u8>) {
                put_sized(buf, &self.0);
            }
        }

        impl Unmarshal for $name {
            fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
                Self::new(reader.sized()?)
            }
        }
    };
}

sized_buffer!(
    /// Hash output (`TPM2B_DIGEST`).
    Digest, "TPM2B_DIGEST", 64
);
sized_buffer!(
    /// Caller-supplied data such as qualifying info (`TPM2B_DATA`).
    Data, "TPM2B_DATA", 64
);
sized_buffer!(
    /// Object or entity name (`TPM2B_NAME`): hash algorithm plus digest, or a handle.
    Name, "TPM2B_NAME", 66
);
sized_buffer!(
    /// Authorization value (`TPM2B_AUTH`).
    Auth, "TPM2B_AUTH", 64
);
sized_buffer!(
    /// Session nonce (`TPM2B_NONCE`).
    Nonce, "TPM2B_NONCE", 64
);
sized_buffer!(
    /// Bulk data for hashing and ciphers (`TPM2B_MAX_BUFFER`).
    MaxBuffer, "TPM2B_MAX_BUFFER", 1024
);
sized_buffer!(
    /// Initial value for a block cipher mode (`TPM2B_IV`).
    Iv, "TPM2B_IV", 16
);
sized_buffer!(
    /// Module-wrapped private area (`TPM2B_PRIVATE`).
    Private, "TPM2B_PRIVATE", 2048
);
sized_buffer!(
    /// RSA modulus or signature (`TPM2B_PUBLIC_KEY_RSA`).
    PublicKeyRsa, "TPM2B_PUBLIC_KEY_RSA", 512
);
sized_buffer!(
    /// One ECC coordinate or scalar (`TPM2B_ECC_PARAMETER`).
    EccParameter, "TPM2B_ECC_PARAMETER", 128
);
sized_buffer!(
    /// Secret material supplied at creation (`TPM2B_SENSITIVE_DATA`).
    SensitiveData, "TPM2B_SENSITIVE_DATA", 256
);
sized_buffer!(
    /// Opaque saved-context payload (`TPM2B_CONTEXT_DATA`).
    ContextData, "TPM2B_CONTEXT_DATA", 2048
);

impl Name {
    /// The name of a permanent entity is its big-endian handle value.
    pub fn from_handle(handle: u32) -> Self {
        Self(handle.to_be_bytes().to_vec())
    }
}
