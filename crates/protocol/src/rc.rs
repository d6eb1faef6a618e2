//! Response codes (`TPM_RC`).
//!
//! # Layout
//!
//! Format-1 codes (bit 7 set) carry an error number in bits 0-5 and point
//! at the offending parameter, handle, or session:
//!
//! ```text
//!  11  10..8   7   6   5..0
//! [S] [ num ] [1] [P] [error]      P=1: parameter number in bits 8-11
//!                                  P=0, S=0: handle number in bits 8-10
//!                                  P=0, S=1: session number in bits 8-10
//! ```
//!
//! Format-0 codes carry the error in bits 0-6, with bit 8 marking a
//! version-1 code and bit 11 turning it into a warning.

use std::fmt;

use crate::error::Result;
use crate::marshal::{Marshal, Reader, Unmarshal};

const FMT1: u32 = 0x080;
const FMT1_PARAMETER: u32 = 0x040;
const FMT1_SESSION: u32 = 0x800;
const VER1: u32 = 0x100;
const WARN: u32 = 0x900;

/// A response code returned in the response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u32);

impl ResponseCode {
    pub const SUCCESS: ResponseCode = ResponseCode(0x000);

    // Format-0
    pub const BAD_TAG: ResponseCode = ResponseCode(0x01E);
    pub const INITIALIZE: ResponseCode = ResponseCode(VER1);
    pub const FAILURE: ResponseCode = ResponseCode(VER1 + 0x001);
    pub const SEQUENCE: ResponseCode = ResponseCode(VER1 + 0x003);
    pub const DISABLED: ResponseCode = ResponseCode(VER1 + 0x020);
    pub const AUTH_TYPE: ResponseCode = ResponseCode(VER1 + 0x024);
    pub const AUTH_MISSING: ResponseCode = ResponseCode(VER1 + 0x025);
    pub const POLICY: ResponseCode = ResponseCode(VER1 + 0x026);
    pub const AUTH_UNAVAILABLE: ResponseCode = ResponseCode(VER1 + 0x02F);
    pub const COMMAND_SIZE: ResponseCode = ResponseCode(VER1 + 0x042);
    pub const COMMAND_CODE: ResponseCode = ResponseCode(VER1 + 0x043);
    pub const AUTHSIZE: ResponseCode = ResponseCode(VER1 + 0x044);
    pub const NO_RESULT: ResponseCode = ResponseCode(VER1 + 0x054);
    pub const SENSITIVE: ResponseCode = ResponseCode(VER1 + 0x055);

    // Format-1 bases
    pub const ASYMMETRIC: ResponseCode = ResponseCode(FMT1 + 0x001);
    pub const ATTRIBUTES: ResponseCode = ResponseCode(FMT1 + 0x002);
    pub const HASH: ResponseCode = ResponseCode(FMT1 + 0x003);
    pub const VALUE: ResponseCode = ResponseCode(FMT1 + 0x004);
    pub const HIERARCHY: ResponseCode = ResponseCode(FMT1 + 0x005);
    pub const KEY_SIZE: ResponseCode = ResponseCode(FMT1 + 0x007);
    pub const MGF: ResponseCode = ResponseCode(FMT1 + 0x008);
    pub const MODE: ResponseCode = ResponseCode(FMT1 + 0x009);
    pub const TYPE: ResponseCode = ResponseCode(FMT1 + 0x00A);
    pub const HANDLE: ResponseCode = ResponseCode(FMT1 + 0x00B);
    pub const KDF: ResponseCode = ResponseCode(FMT1 + 0x00C);
    pub const RANGE: ResponseCode = ResponseCode(FMT1 + 0x00D);
    pub const AUTH_FAIL: ResponseCode = ResponseCode(FMT1 + 0x00E);
    pub const NONCE: ResponseCode = ResponseCode(FMT1 + 0x00F);
    pub const SCHEME: ResponseCode = ResponseCode(FMT1 + 0x012);
    pub const SIZE: ResponseCode = ResponseCode(FMT1 + 0x015);
    pub const SYMMETRIC: ResponseCode = ResponseCode(FMT1 + 0x016);
    pub const TAG: ResponseCode = ResponseCode(FMT1 + 0x017);
    pub const SELECTOR: ResponseCode = ResponseCode(FMT1 + 0x018);
    pub const INSUFFICIENT: ResponseCode = ResponseCode(FMT1 + 0x01A);
    pub const SIGNATURE: ResponseCode = ResponseCode(FMT1 + 0x01B);
    pub const KEY: ResponseCode = ResponseCode(FMT1 + 0x01C);
    pub const POLICY_FAIL: ResponseCode = ResponseCode(FMT1 + 0x01D);
    pub const INTEGRITY: ResponseCode = ResponseCode(FMT1 + 0x01F);
    pub const TICKET: ResponseCode = ResponseCode(FMT1 + 0x020);
    pub const RESERVED_BITS: ResponseCode = ResponseCode(FMT1 + 0x021);
    pub const BAD_AUTH: ResponseCode = ResponseCode(FMT1 + 0x022);
    pub const BINDING: ResponseCode = ResponseCode(FMT1 + 0x025);
    pub const CURVE: ResponseCode = ResponseCode(FMT1 + 0x026);

    // Warnings
    pub const CONTEXT_GAP: ResponseCode = ResponseCode(WARN + 0x001);
    pub const OBJECT_MEMORY: ResponseCode = ResponseCode(WARN + 0x002);
    pub const SESSION_MEMORY: ResponseCode = ResponseCode(WARN + 0x003);
    pub const MEMORY: ResponseCode = ResponseCode(WARN + 0x004);
    pub const OBJECT_HANDLES: ResponseCode = ResponseCode(WARN + 0x006);
    pub const TESTING: ResponseCode = ResponseCode(WARN + 0x00A);
    pub const RETRY: ResponseCode = ResponseCode(WARN + 0x022);

    /// Whether the command succeeded.
    #[inline]
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Whether this is a format-1 code.
    #[inline]
    pub fn is_format_one(self) -> bool {
        self.0 & FMT1 != 0
    }

    /// Whether this is a warning: the command may succeed if retried later.
    pub fn is_warning(self) -> bool {
        !self.is_format_one() && self.0 & WARN == WARN
    }

    /// The code with its parameter, handle, or session number stripped.
    pub fn base(self) -> ResponseCode {
        if self.is_format_one() {
            ResponseCode(FMT1 | (self.0 & 0x03F))
        } else {
            ResponseCode(self.0 & 0x97F)
        }
    }

    /// Parameter number (1-based) the error refers to.
    pub fn parameter(self) -> Option<u8> {
        if self.is_format_one() && self.0 & FMT1_PARAMETER != 0 {
            Some(((self.0 >> 8) & 0xF) as u8)
        } else {
            None
        }
    }

    /// Handle number (1-based) the error refers to.
    pub fn handle(self) -> Option<u8> {
        if self.is_format_one() && self.0 & (FMT1_PARAMETER | FMT1_SESSION) == 0 {
            let n = ((self.0 >> 8) & 0x7) as u8;
            (n != 0).then_some(n)
        } else {
            None
        }
    }

    /// Session number (1-based) the error refers to.
    pub fn session(self) -> Option<u8> {
        if self.is_format_one() && self.0 & FMT1_PARAMETER == 0 && self.0 & FMT1_SESSION != 0 {
            Some(((self.0 >> 8) & 0x7) as u8)
        } else {
            None
        }
    }

    /// Attach a parameter number to a format-1 base code.
    pub fn with_parameter(self, n: u8) -> ResponseCode {
        ResponseCode(self.base().0 | FMT1_PARAMETER | ((n as u32 & 0xF) << 8))
    }

    /// Attach a handle number to a format-1 base code.
    pub fn with_handle(self, n: u8) -> ResponseCode {
        ResponseCode(self.base().0 | ((n as u32 & 0x7) << 8))
    }

    /// Attach a session number to a format-1 base code.
    pub fn with_session(self, n: u8) -> ResponseCode {
        ResponseCode(self.base().0 | FMT1_SESSION | ((n as u32 & 0x7) << 8))
    }

    /// Symbolic name of the base code, if it is a known one.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.base() {
            Self::SUCCESS => "TPM_RC_SUCCESS",
            Self::BAD_TAG => "TPM_RC_BAD_TAG",
            Self::INITIALIZE => "TPM_RC_INITIALIZE",
            Self::FAILURE => "TPM_RC_FAILURE",
            Self::SEQUENCE => "TPM_RC_SEQUENCE",
            Self::DISABLED => "TPM_RC_DISABLED",
            Self::AUTH_TYPE => "TPM_RC_AUTH_TYPE",
            Self::AUTH_MISSING => "TPM_RC_AUTH_MISSING",
            Self::POLICY => "TPM_RC_POLICY",
            Self::AUTH_UNAVAILABLE => "TPM_RC_AUTH_UNAVAILABLE",
            Self::COMMAND_SIZE => "TPM_RC_COMMAND_SIZE",
            Self::COMMAND_CODE => "TPM_RC_COMMAND_CODE",
            Self::AUTHSIZE => "TPM_RC_AUTHSIZE",
            Self::NO_RESULT => "TPM_RC_NO_RESULT",
            Self::SENSITIVE => "TPM_RC_SENSITIVE",
            Self::ASYMMETRIC => "TPM_RC_ASYMMETRIC",
            Self::ATTRIBUTES => "TPM_RC_ATTRIBUTES",
            Self::HASH => "TPM_RC_HASH",
            Self::VALUE => "TPM_RC_VALUE",
            Self::HIERARCHY => "TPM_RC_HIERARCHY",
            Self::KEY_SIZE => "TPM_RC_KEY_SIZE",
            Self::MGF => "TPM_RC_MGF",
            Self::MODE => "TPM_RC_MODE",
            Self::TYPE => "TPM_RC_TYPE",
            Self::HANDLE => "TPM_RC_HANDLE",
            Self::KDF => "TPM_RC_KDF",
            Self::RANGE => "TPM_RC_RANGE",
            Self::AUTH_FAIL => "TPM_RC_AUTH_FAIL",
            Self::NONCE => "TPM_RC_NONCE",
            Self::SCHEME => "TPM_RC_SCHEME",
            Self::SIZE => "TPM_RC_SIZE",
            Self::SYMMETRIC => "TPM_RC_SYMMETRIC",
            Self::TAG => "TPM_RC_TAG",
            Self::SELECTOR => "TPM_RC_SELECTOR",
            Self::INSUFFICIENT => "TPM_RC_INSUFFICIENT",
            Self::SIGNATURE => "TPM_RC_SIGNATURE",
            Self::KEY => "TPM_RC_KEY",
            Self::POLICY_FAIL => "TPM_RC_POLICY_FAIL",
            Self::INTEGRITY => "TPM_RC_INTEGRITY",
            Self::TICKET => "TPM_RC_TICKET",
            Self::RESERVED_BITS => "TPM_RC_RESERVED_BITS",
            Self::BAD_AUTH => "TPM_RC_BAD_AUTH",
            Self::BINDING => "TPM_RC_BINDING",
            Self::CURVE => "TPM_RC_CURVE",
            Self::CONTEXT_GAP => "TPM_RC_CONTEXT_GAP",
            Self::OBJECT_MEMORY => "TPM_RC_OBJECT_MEMORY",
            Self::SESSION_MEMORY => "TPM_RC_SESSION_MEMORY",
            Self::MEMORY => "TPM_RC_MEMORY",
            Self::OBJECT_HANDLES => "TPM_RC_OBJECT_HANDLES",
            Self::TESTING => "TPM_RC_TESTING",
            Self::RETRY => "TPM_RC_RETRY",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name)?,
            None => f.write_str("TPM_RC_UNKNOWN")?,
        }
        if let Some(n) = self.parameter() {
            write!(f, " (parameter {n})")?;
        } else if let Some(n) = self.handle() {
            write!(f, " (handle {n})")?;
        } else if let Some(n) = self.session() {
            write!(f, " (session {n})")?;
        }
        write!(f, " [{:#010x}]", self.0)
    }
}

impl Marshal for ResponseCode {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.0.marshal(buf);
    }
}

impl Unmarshal for ResponseCode {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(ResponseCode(reader.u32()?))
    }
}
