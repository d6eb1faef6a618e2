//! Authorization area structures.
//!
//! Only password sessions (`TPM_RS_PW`) are modelled: the secret travels in
//! the `hmac` field of the command authorization and the response carries
//! an empty acknowledgement.

use crate::buffers::{Auth, Name, Nonce};
use crate::error::Result;
use crate::handle::{Handle, Hierarchy};
use crate::marshal::{Marshal, Reader, Unmarshal};

/// Session attribute bits (`TPMA_SESSION`).
pub mod session_attributes {
    pub const CONTINUE_SESSION: u8 = 0x01;
    pub const AUDIT_EXCLUSIVE: u8 = 0x02;
    pub const AUDIT_RESET: u8 = 0x04;
    pub const DECRYPT: u8 = 0x20;
    pub const ENCRYPT: u8 = 0x40;
    pub const AUDIT: u8 = 0x80;
}

/// How the caller proves knowledge of an entity's auth value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Authorization {
    /// Entity has an empty auth value.
    #[default]
    Empty,
    Password(Auth),
}

impl Authorization {
    /// The auth value this authorization presents.
    pub fn value(&self) -> &[u8] {
        match self {
            Authorization::Empty => &[],
            Authorization::Password(auth) => auth.as_bytes(),
        }
    }

    /// Encode as a password-session command authorization.
    pub fn to_command(&self) -> AuthCommand {
        AuthCommand {
            session: Handle::PASSWORD,
            nonce: Nonce::empty(),
            attributes: session_attributes::CONTINUE_SESSION,
            hmac: match self {
                Authorization::Empty => Auth::empty(),
                Authorization::Password(auth) => auth.clone(),
            },
        }
    }

    /// Recover the authorization from a password-session entry.
    pub fn from_command(command: &AuthCommand) -> Self {
        if command.hmac.is_empty() {
            Authorization::Empty
        } else {
            Authorization::Password(command.hmac.clone())
        }
    }
}

/// One command authorization (`TPMS_AUTH_COMMAND`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCommand {
    pub session: Handle,
    pub nonce: Nonce,
    pub attributes: u8,
    pub hmac: Auth,
}

impl Marshal for AuthCommand {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.session.marshal(buf);
        self.nonce.marshal(buf);
        self.attributes.marshal(buf);
        self.hmac.marshal(buf);
    }
}

impl Unmarshal for AuthCommand {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            session: reader.read()?,
            nonce: reader.read()?,
            attributes: reader.u8()?,
            hmac: reader.read()?,
        })
    }
}

/// One response acknowledgement (`TPMS_AUTH_RESPONSE`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub nonce: Nonce,
    pub attributes: u8,
    pub hmac: Auth,
}

impl AuthResponse {
    /// The acknowledgement a password session returns.
    pub fn password() -> Self {
        Self {
            nonce: Nonce::empty(),
            attributes: session_attributes::CONTINUE_SESSION,
            hmac: Auth::empty(),
        }
    }
}

impl Marshal for AuthResponse {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.nonce.marshal(buf);
        self.attributes.marshal(buf);
        self.hmac.marshal(buf);
    }
}

impl Unmarshal for AuthResponse {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            nonce: reader.read()?,
            attributes: reader.u8()?,
            hmac: reader.read()?,
        })
    }
}

/// A handle that needs authorization, with the name it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHandle {
    pub handle: Handle,
    pub name: Name,
    pub auth: Authorization,
}

impl AuthHandle {
    pub fn new(handle: Handle, name: Name, auth: Authorization) -> Self {
        Self { handle, name, auth }
    }

    /// Authorize a hierarchy; its name is its handle value.
    pub fn hierarchy(hierarchy: Hierarchy, auth: Authorization) -> Self {
        let handle = hierarchy.handle();
        Self {
            handle,
            name: handle.permanent_name(),
            auth,
        }
    }

    /// Rebuild from a decoded handle slot, where only permanent names are known.
    pub fn from_wire(handle: Handle, auth: Authorization) -> Self {
        let name = if handle.is_permanent() {
            handle.permanent_name()
        } else {
            Name::empty()
        };
        Self { handle, name, auth }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::decode_exact;

    #[test]
    fn test_empty_password_session_layout() {
        let bytes = Authorization::Empty.to_command().to_bytes();
        assert_eq!(
            bytes,
            vec![0x40, 0x00, 0x00, 0x09, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_password_roundtrip() {
        let auth = Authorization::Password(Auth::new(b"secret".to_vec()).unwrap());
        let command = auth.to_command();
        let decoded = decode_exact::<AuthCommand>(&command.to_bytes()).unwrap();
        assert_eq!(Authorization::from_command(&decoded), auth);
    }

    #[test]
    fn test_password_response_layout() {
        assert_eq!(AuthResponse::password().to_bytes(), vec![0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_hierarchy_auth_handle_name() {
        let auth = AuthHandle::hierarchy(Hierarchy::Owner, Authorization::Empty);
        assert_eq!(auth.handle, Handle::OWNER);
        assert_eq!(auth.name.as_bytes(), &[0x40, 0, 0, 1]);
    }
}
