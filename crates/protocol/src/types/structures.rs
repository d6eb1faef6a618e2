//! Creation data, tickets, PCR selections, and saved contexts.

use crate::algorithm::{read_tag, AlgorithmId, UnionKind};
use crate::buffers::{ContextData, Data, Digest, Name};
use crate::error::{ProtocolError, Result};
use crate::handle::{Handle, Hierarchy};
use crate::marshal::{put_list, Marshal, Reader, Unmarshal};

/// Maximum number of selection bytes per bank.
pub const PCR_SELECT_MAX: usize = 4;

/// Maximum number of banks in a selection list.
pub const HASH_COUNT: usize = 16;

/// PCR selection for one bank (`TPMS_PCR_SELECTION`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PcrSelection {
    pub hash: AlgorithmId,
    /// Bitmap of selected PCRs, byte 0 holding PCR 0..7.
    pub select: Vec<u8>,
}

impl Marshal for PcrSelection {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.hash.marshal(buf);
        (self.select.len() as u8).marshal(buf);
        buf.extend_from_slice(&self.select);
    }
}

impl Unmarshal for PcrSelection {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        let hash = read_tag(reader, UnionKind::Hash)?;
        let size = reader.u8()? as usize;
        if size > PCR_SELECT_MAX {
            return Err(ProtocolError::BufferTooLarge {
                kind: "TPMS_PCR_SELECTION",
                len: size,
                max: PCR_SELECT_MAX,
            });
        }
        Ok(Self {
            hash,
            select: reader.bytes(size)?.to_vec(),
        })
    }
}

/// A `TPML_PCR_SELECTION`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PcrSelectionList(pub Vec<PcrSelection>);

impl Marshal for PcrSelectionList {
    fn marshal(&self, buf: &mut Vec<u8>) {
        put_list(buf, &self.0);
    }
}

impl Unmarshal for PcrSelectionList {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self(reader.list("TPML_PCR_SELECTION", HASH_COUNT)?))
    }
}

/// Creation data returned with a new object (`TPMS_CREATION_DATA`).
///
/// On the wire this travels inside a 16-bit size field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationData {
    pub pcr_select: PcrSelectionList,
    pub pcr_digest: Digest,
    pub locality: u8,
    pub parent_name_alg: AlgorithmId,
    pub parent_name: Name,
    pub parent_qualified_name: Name,
    pub outside_info: Data,
}

impl Marshal for CreationData {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.pcr_select.marshal(buf);
        self.pcr_digest.marshal(buf);
        self.locality.marshal(buf);
        self.parent_name_alg.marshal(buf);
        self.parent_name.marshal(buf);
        self.parent_qualified_name.marshal(buf);
        self.outside_info.marshal(buf);
    }
}

impl Unmarshal for CreationData {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            pcr_select: reader.read()?,
            pcr_digest: reader.read()?,
            locality: reader.u8()?,
            parent_name_alg: read_tag(reader, UnionKind::Hash)?,
            parent_name: reader.read()?,
            parent_qualified_name: reader.read()?,
            outside_info: reader.read()?,
        })
    }
}

/// Ticket structure tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TicketKind {
    Creation = 0x8021,
    Verified = 0x8022,
    HashCheck = 0x8024,
}

impl TicketKind {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x8021 => Some(TicketKind::Creation),
            0x8022 => Some(TicketKind::Verified),
            0x8024 => Some(TicketKind::HashCheck),
            _ => None,
        }
    }
}

/// Module-issued proof of a prior operation (`TPMT_TK_*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub kind: TicketKind,
    pub hierarchy: Hierarchy,
    pub digest: Digest,
}

impl Ticket {
    /// The empty hashcheck ticket used when signing an externally computed digest.
    pub fn null_hashcheck() -> Self {
        Self {
            kind: TicketKind::HashCheck,
            hierarchy: Hierarchy::Null,
            digest: Digest::empty(),
        }
    }
}

impl Marshal for Ticket {
    fn marshal(&self, buf: &mut Vec<u8>) {
        (self.kind as u16).marshal(buf);
        self.hierarchy.marshal(buf);
        self.digest.marshal(buf);
    }
}

impl Unmarshal for Ticket {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        let tag = reader.u16()?;
        let kind = TicketKind::from_u16(tag).ok_or(ProtocolError::InvalidValue {
            field: "ticket tag",
            value: tag as u32,
        })?;
        Ok(Self {
            kind,
            hierarchy: reader.read()?,
            digest: reader.read()?,
        })
    }
}

/// A saved object or sequence context (`TPMS_CONTEXT`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub sequence: u64,
    pub saved_handle: Handle,
    pub hierarchy: Hierarchy,
    pub blob: ContextData,
}

impl Context {
    /// Saved-handle value for a transient object.
    pub const SAVED_OBJECT: Handle = Handle(0x8000_0000);
    /// Saved-handle value for a hash or HMAC sequence.
    pub const SAVED_SEQUENCE: Handle = Handle(0x8000_0001);
}

impl Marshal for Context {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.sequence.marshal(buf);
        self.saved_handle.marshal(buf);
        self.hierarchy.marshal(buf);
        self.blob.marshal(buf);
    }
}

impl Unmarshal for Context {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            sequence: reader.u64()?,
            saved_handle: reader.read()?,
            hierarchy: reader.read()?,
            blob: reader.read()?,
        })
    }
}
