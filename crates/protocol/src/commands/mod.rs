//! Command and response schemas.
//!
//! Each command is a plain struct implementing [`Command`]: it knows its
//! command code, how many handles it carries, how many of those need
//! authorization, and how to write its parameter area. Its response type
//! implements [`Response`]. [`crate::framing`] turns either side into a
//! complete buffer.

use std::fmt;

use crate::error::{ProtocolError, Result};
use crate::handle::Handle;
use crate::marshal::Reader;
use crate::types::{AuthHandle, Authorization};

/// Empty parameter area shared by responses that carry nothing back.
macro_rules! empty_response {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name;

        impl $crate::commands::Response for $name {
            const HANDLES: usize = 0;

            fn handle_area(&self) -> Vec<$crate::handle::Handle> {
                Vec::new()
            }

            fn marshal_parameters(&self, _buf: &mut Vec<u8>) {}

            fn unmarshal(
                _handles: &[$crate::handle::Handle],
                _params: &mut $crate::marshal::Reader<'_>,
            ) -> $crate::error::Result<Self> {
                Ok($name)
            }
        }
    };
}
pub(crate) use empty_response;

mod capability;
mod context;
mod hash;
mod object;
mod signature;
mod symmetric;

pub use capability::{GetCapability, GetCapabilityResponse, GetRandom, GetRandomResponse};
pub use context::{
    ContextLoad, ContextLoadResponse, ContextSave, ContextSaveResponse, FlushContext,
    FlushContextResponse,
};
pub use hash::{
    Hash, HashResponse, HashSequenceStart, HashSequenceStartResponse, SequenceComplete,
    SequenceCompleteResponse, SequenceUpdate, SequenceUpdateResponse,
};
pub use object::{Create, CreatePrimary, CreatePrimaryResponse, CreateResponse, Load, LoadResponse};
pub use signature::{Sign, SignResponse, VerifySignature, VerifySignatureResponse};
pub use symmetric::{EncryptDecrypt, EncryptDecrypt2, EncryptDecryptResponse};

macro_rules! command_codes {
    ($($variant:ident = $value:literal,)+) => {
        /// Command code (`TPM_CC`).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum CommandCode {
            $($variant = $value,)+
        }

        impl CommandCode {
            /// Every supported command.
            pub const ALL: &'static [CommandCode] = &[$(CommandCode::$variant,)+];

            pub fn from_u32(value: u32) -> Option<Self> {
                match value {
                    $($value => Some(CommandCode::$variant),)+
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(CommandCode::$variant => stringify!($variant),)+
                }
            }
        }
    };
}

command_codes! {
    CreatePrimary = 0x0000_0131,
    SequenceComplete = 0x0000_013E,
    Create = 0x0000_0153,
    Load = 0x0000_0157,
    SequenceUpdate = 0x0000_015C,
    Sign = 0x0000_015D,
    ContextLoad = 0x0000_0161,
    ContextSave = 0x0000_0162,
    EncryptDecrypt = 0x0000_0164,
    FlushContext = 0x0000_0165,
    VerifySignature = 0x0000_0177,
    GetCapability = 0x0000_017A,
    GetRandom = 0x0000_017B,
    Hash = 0x0000_017D,
    HashSequenceStart = 0x0000_0186,
    EncryptDecrypt2 = 0x0000_0193,
}

impl CommandCode {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a command's handle area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleSlot {
    pub handle: Handle,
    /// Present for handles that need authorization.
    pub auth: Option<Authorization>,
}

impl HandleSlot {
    pub fn plain(handle: Handle) -> Self {
        Self { handle, auth: None }
    }

    pub fn authorized(auth: &AuthHandle) -> Self {
        Self {
            handle: auth.handle,
            auth: Some(auth.auth.clone()),
        }
    }
}

/// A command the module understands.
pub trait Command: Sized {
    const CODE: CommandCode;
    /// Number of entries in the handle area.
    const HANDLES: usize;
    /// Number of leading handles that need an authorization entry.
    const AUTH_HANDLES: usize;

    type Response: Response;

    /// Handles in schema order.
    fn handle_area(&self) -> Vec<HandleSlot>;

    /// Append the parameter area.
    fn marshal_parameters(&self, buf: &mut Vec<u8>);

    /// Rebuild a command from its decoded handle area and parameter bytes.
    fn unmarshal(handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self>;
}

/// The successful response to a [`Command`].
pub trait Response: Sized {
    /// Number of handles the module returns ahead of the parameters.
    const HANDLES: usize;

    fn handle_area(&self) -> Vec<Handle>;

    fn marshal_parameters(&self, buf: &mut Vec<u8>);

    fn unmarshal(handles: &[Handle], params: &mut Reader<'_>) -> Result<Self>;
}

fn slot(handles: &[HandleSlot], index: usize) -> Result<&HandleSlot> {
    handles.get(index).ok_or(ProtocolError::TruncatedInput {
        needed: (index + 1) * 4,
        remaining: handles.len() * 4,
    })
}

pub(crate) fn auth_handle(handles: &[HandleSlot], index: usize) -> Result<AuthHandle> {
    let slot = slot(handles, index)?;
    let auth = slot.auth.clone().ok_or(ProtocolError::AuthorizationMissing {
        expected: index + 1,
        found: index,
    })?;
    Ok(AuthHandle::from_wire(slot.handle, auth))
}

pub(crate) fn plain_handle(handles: &[HandleSlot], index: usize) -> Result<Handle> {
    Ok(slot(handles, index)?.handle)
}

pub(crate) fn response_handle(handles: &[Handle], index: usize) -> Result<Handle> {
    handles
        .get(index)
        .copied()
        .ok_or(ProtocolError::TruncatedInput {
            needed: (index + 1) * 4,
            remaining: handles.len() * 4,
        })
}

/// Parameter area of `command`, without header or handles.
#[cfg(test)]
pub(crate) fn parameter_bytes<C: Command>(command: &C) -> Vec<u8> {
    let mut buf = Vec::new();
    command.marshal_parameters(&mut buf);
    buf
}

/// Rebuild a command from its own handle and parameter areas.
#[cfg(test)]
pub(crate) fn reparse_command<C: Command>(command: &C) -> C {
    let bytes = parameter_bytes(command);
    let mut reader = Reader::new(&bytes);
    let parsed = C::unmarshal(&command.handle_area(), &mut reader).unwrap();
    assert!(reader.is_empty(), "{} bytes left over", reader.remaining());
    parsed
}

/// Rebuild a response from its own handle and parameter areas.
#[cfg(test)]
pub(crate) fn reparse_response<R: Response>(response: &R) -> R {
    let mut bytes = Vec::new();
    response.marshal_parameters(&mut bytes);
    let mut reader = Reader::new(&bytes);
    let parsed = R::unmarshal(&response.handle_area(), &mut reader).unwrap();
    assert!(reader.is_empty(), "{} bytes left over", reader.remaining());
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code_lookup() {
        for code in CommandCode::ALL {
            assert_eq!(CommandCode::from_u32(code.as_u32()), Some(*code));
        }
        assert_eq!(CommandCode::from_u32(0x144), None);
    }

    #[test]
    fn test_command_code_values() {
        assert_eq!(CommandCode::CreatePrimary.as_u32(), 0x131);
        assert_eq!(CommandCode::FlushContext.as_u32(), 0x165);
        assert_eq!(CommandCode::EncryptDecrypt2.as_u32(), 0x193);
        assert_eq!(CommandCode::VerifySignature.to_string(), "VerifySignature");
    }

    #[test]
    fn test_auth_handle_requires_auth() {
        let slots = [HandleSlot::plain(Handle(0x8000_0000))];
        assert!(matches!(
            auth_handle(&slots, 0),
            Err(ProtocolError::AuthorizationMissing { .. })
        ));
        assert_eq!(plain_handle(&slots, 0).unwrap(), Handle(0x8000_0000));
        assert!(plain_handle(&slots, 1).is_err());
    }
}
