//! Object attribute bits (`TPMA_OBJECT`).

use crate::error::Result;
use crate::marshal::{Marshal, Reader, Unmarshal};

/// Object attribute flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectAttributes(u32);

impl ObjectAttributes {
    /// The object cannot be duplicated off this module.
    pub const FIXED_TPM: u32 = 1 << 1;
    /// Saved contexts of this object are invalidated on restart.
    pub const ST_CLEAR: u32 = 1 << 2;
    /// The object's parent cannot change.
    pub const FIXED_PARENT: u32 = 1 << 4;
    /// The module generated the sensitive data.
    pub const SENSITIVE_DATA_ORIGIN: u32 = 1 << 5;
    /// User role actions may use the auth value.
    pub const USER_WITH_AUTH: u32 = 1 << 6;
    /// Admin role actions require a policy.
    pub const ADMIN_WITH_POLICY: u32 = 1 << 7;
    /// Not subject to dictionary-attack protection.
    pub const NO_DA: u32 = 1 << 10;
    /// Duplication requires an inner wrapper.
    pub const ENCRYPTED_DUPLICATION: u32 = 1 << 11;
    /// Key use is restricted to module-generated structures.
    pub const RESTRICTED: u32 = 1 << 16;
    /// The key may decrypt.
    pub const DECRYPT: u32 = 1 << 17;
    /// The key may sign (or encrypt, for symmetric keys).
    pub const SIGN: u32 = 1 << 18;
    /// The key may sign certificates.
    pub const X509_SIGN: u32 = 1 << 19;

    /// Bits that must be zero.
    pub const RESERVED: u32 = 0x0000_0001
        | 0x0000_0008
        | 0x0000_0300
        | 0x0000_F000
        | 0xFFF0_0000;

    /// Empty attribute set.
    #[inline]
    pub fn new() -> Self {
        Self(0)
    }

    /// Create from a raw value.
    #[inline]
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw value.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Check whether every bit in `mask` is set.
    #[inline]
    pub fn contains(self, mask: u32) -> bool {
        self.0 & mask == mask
    }

    /// Return a copy with `mask` set or cleared.
    #[inline]
    pub fn with(mut self, mask: u32, on: bool) -> Self {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
        self
    }

    #[inline]
    pub fn fixed_tpm(self) -> bool {
        self.contains(Self::FIXED_TPM)
    }

    #[inline]
    pub fn fixed_parent(self) -> bool {
        self.contains(Self::FIXED_PARENT)
    }

    #[inline]
    pub fn sensitive_data_origin(self) -> bool {
        self.contains(Self::SENSITIVE_DATA_ORIGIN)
    }

    #[inline]
    pub fn user_with_auth(self) -> bool {
        self.contains(Self::USER_WITH_AUTH)
    }

    #[inline]
    pub fn restricted(self) -> bool {
        self.contains(Self::RESTRICTED)
    }

    #[inline]
    pub fn decrypt(self) -> bool {
        self.contains(Self::DECRYPT)
    }

    #[inline]
    pub fn sign(self) -> bool {
        self.contains(Self::SIGN)
    }

    /// Whether any reserved bit is set.
    #[inline]
    pub fn has_reserved_bits(self) -> bool {
        self.0 & Self::RESERVED != 0
    }
}

impl Marshal for ObjectAttributes {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.0.marshal(buf);
    }
}

impl Unmarshal for ObjectAttributes {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self(reader.u32()?))
    }
}
