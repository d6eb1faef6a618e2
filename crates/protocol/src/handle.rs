//! Handles and hierarchies.

use std::fmt;

use crate::buffers::Name;
use crate::error::{ProtocolError, Result};
use crate::marshal::{Marshal, Reader, Unmarshal};

/// Module-assigned reference to an entity (`TPM_HANDLE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u32);

impl Handle {
    /// Storage hierarchy.
    pub const OWNER: Handle = Handle(0x4000_0001);
    /// The empty hierarchy; tickets produced under it are never valid.
    pub const NULL: Handle = Handle(0x4000_0007);
    /// Password authorization session.
    pub const PASSWORD: Handle = Handle(0x4000_0009);
    /// Endorsement hierarchy.
    pub const ENDORSEMENT: Handle = Handle(0x4000_000B);
    /// Platform hierarchy.
    pub const PLATFORM: Handle = Handle(0x4000_000C);

    /// First handle of the transient object range.
    pub const TRANSIENT_FIRST: Handle = Handle(0x8000_0000);

    /// Handle type byte (the most significant octet).
    #[inline]
    pub fn kind(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Whether this handle names a transient object or sequence.
    #[inline]
    pub fn is_transient(self) -> bool {
        self.kind() == 0x80
    }

    /// Whether this handle names a permanent entity such as a hierarchy.
    #[inline]
    pub fn is_permanent(self) -> bool {
        self.kind() == 0x40
    }

    /// Name of a permanent entity. Transient names come from the module.
    pub fn permanent_name(self) -> Name {
        Name::from_handle(self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl Marshal for Handle {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.0.marshal(buf);
    }
}

impl Unmarshal for Handle {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Handle(reader.u32()?))
    }
}

/// Hierarchy selector (`TPMI_RH_HIERARCHY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hierarchy {
    Owner,
    Endorsement,
    Platform,
    Null,
}

impl Hierarchy {
    /// The permanent handle for this hierarchy.
    pub fn handle(self) -> Handle {
        match self {
            Hierarchy::Owner => Handle::OWNER,
            Hierarchy::Endorsement => Handle::ENDORSEMENT,
            Hierarchy::Platform => Handle::PLATFORM,
            Hierarchy::Null => Handle::NULL,
        }
    }

    /// Map a handle back to its hierarchy.
    pub fn from_handle(handle: Handle) -> Option<Self> {
        match handle {
            Handle::OWNER => Some(Hierarchy::Owner),
            Handle::ENDORSEMENT => Some(Hierarchy::Endorsement),
            Handle::PLATFORM => Some(Hierarchy::Platform),
            Handle::NULL => Some(Hierarchy::Null),
            _ => None,
        }
    }
}

impl Marshal for Hierarchy {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.handle().marshal(buf);
    }
}

impl Unmarshal for Hierarchy {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        let handle = reader.read::<Handle>()?;
        Hierarchy::from_handle(handle).ok_or(ProtocolError::InvalidValue {
            field: "TPMI_RH_HIERARCHY",
            value: handle.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::decode_exact;

    #[test]
    fn test_handle_display() {
        assert_eq!(Handle::OWNER.to_string(), "0x40000001");
        assert_eq!(Handle(0x8000_0002).to_string(), "0x80000002");
    }

    #[test]
    fn test_handle_kinds() {
        assert!(Handle(0x8000_0000).is_transient());
        assert!(Handle::OWNER.is_permanent());
        assert!(!Handle::OWNER.is_transient());
    }

    #[test]
    fn test_hierarchy_codec() {
        let bytes = Hierarchy::Endorsement.to_bytes();
        assert_eq!(bytes, vec![0x40, 0x00, 0x00, 0x0B]);
        assert_eq!(
            decode_exact::<Hierarchy>(&bytes).unwrap(),
            Hierarchy::Endorsement
        );
    }

    #[test]
    fn test_hierarchy_rejects_transient_handle() {
        let bytes = Handle(0x8000_0001).to_bytes();
        assert!(matches!(
            decode_exact::<Hierarchy>(&bytes),
            Err(ProtocolError::InvalidValue {
                value: 0x8000_0001,
                ..
            })
        ));
    }
}
