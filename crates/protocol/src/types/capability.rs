//! Capability queries and their result lists.

use crate::algorithm::AlgorithmId;
use crate::error::{ProtocolError, Result};
use crate::handle::Handle;
use crate::marshal::{put_list, Marshal, Reader, Unmarshal};

/// Entry limits for each capability list.
pub const MAX_CAP_ALGS: usize = 169;
pub const MAX_CAP_HANDLES: usize = 254;
pub const MAX_CAP_CC: usize = 254;
pub const MAX_TPM_PROPERTIES: usize = 127;

/// Capability group selector (`TPM_CAP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Capability {
    Algorithms = 0x0000_0000,
    Handles = 0x0000_0001,
    Commands = 0x0000_0002,
    TpmProperties = 0x0000_0006,
}

impl Capability {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Capability::Algorithms),
            1 => Some(Capability::Handles),
            2 => Some(Capability::Commands),
            6 => Some(Capability::TpmProperties),
            _ => None,
        }
    }
}

impl Marshal for Capability {
    fn marshal(&self, buf: &mut Vec<u8>) {
        (*self as u32).marshal(buf);
    }
}

impl Unmarshal for Capability {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        let value = reader.u32()?;
        Capability::from_u32(value).ok_or(ProtocolError::InvalidValue {
            field: "TPM_CAP",
            value,
        })
    }
}

/// Algorithm property bits (`TPMA_ALGORITHM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AlgorithmProperties(pub u32);

impl AlgorithmProperties {
    pub const ASYMMETRIC: u32 = 0x0000_0001;
    pub const SYMMETRIC: u32 = 0x0000_0002;
    pub const HASH: u32 = 0x0000_0004;
    pub const OBJECT: u32 = 0x0000_0008;
    pub const SIGNING: u32 = 0x0000_0100;
    pub const ENCRYPTING: u32 = 0x0000_0200;
    pub const METHOD: u32 = 0x0000_0400;

    #[inline]
    pub fn contains(self, mask: u32) -> bool {
        self.0 & mask == mask
    }
}

/// One entry of the algorithm capability (`TPMS_ALG_PROPERTY`).
///
/// The identifier stays raw so that vendor algorithms outside the known
/// set still decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlgorithmProperty {
    pub id: u16,
    pub properties: AlgorithmProperties,
}

impl AlgorithmProperty {
    /// Known algorithm identifier, if any.
    pub fn algorithm(&self) -> Option<AlgorithmId> {
        AlgorithmId::from_u16(self.id)
    }
}

impl Marshal for AlgorithmProperty {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.id.marshal(buf);
        self.properties.0.marshal(buf);
    }
}

impl Unmarshal for AlgorithmProperty {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            id: reader.u16()?,
            properties: AlgorithmProperties(reader.u32()?),
        })
    }
}

/// A fixed or variable module property (`TPMS_TAGGED_PROPERTY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaggedProperty {
    pub property: u32,
    pub value: u32,
}

impl TaggedProperty {
    /// Largest input buffer accepted by commands.
    pub const INPUT_BUFFER: u32 = 0x0000_010D;
    /// Number of transient objects that fit in module memory.
    pub const HR_TRANSIENT_MIN: u32 = 0x0000_010E;
    pub const MAX_COMMAND_SIZE: u32 = 0x0000_011E;
    pub const MAX_RESPONSE_SIZE: u32 = 0x0000_011F;
    pub const MAX_DIGEST: u32 = 0x0000_0120;
    /// Transient objects currently loaded.
    pub const HR_TRANSIENT_AVAIL: u32 = 0x0000_0207;
}

impl Marshal for TaggedProperty {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.property.marshal(buf);
        self.value.marshal(buf);
    }
}

impl Unmarshal for TaggedProperty {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            property: reader.u32()?,
            value: reader.u32()?,
        })
    }
}

/// Capability union (`TPMS_CAPABILITY_DATA`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityData {
    Algorithms(Vec<AlgorithmProperty>),
    Handles(Vec<Handle>),
    /// Command attribute words (`TPMA_CC`); the low 16 bits are the command index.
    Commands(Vec<u32>),
    TpmProperties(Vec<TaggedProperty>),
}

impl CapabilityData {
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityData::Algorithms(_) => Capability::Algorithms,
            CapabilityData::Handles(_) => Capability::Handles,
            CapabilityData::Commands(_) => Capability::Commands,
            CapabilityData::TpmProperties(_) => Capability::TpmProperties,
        }
    }
}

impl Marshal for CapabilityData {
    fn marshal(&self, buf: &mut Vec<u8>) {
        self.capability().marshal(buf);
        match self {
            CapabilityData::Algorithms(list) => put_list(buf, list),
            CapabilityData::Handles(list) => put_list(buf, list),
            CapabilityData::Commands(list) => put_list(buf, list),
            CapabilityData::TpmProperties(list) => put_list(buf, list),
        }
    }
}

impl Unmarshal for CapabilityData {
    fn unmarshal(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(match reader.read::<Capability>()? {
            Capability::Algorithms => {
                CapabilityData::Algorithms(reader.list("TPML_ALG_PROPERTY", MAX_CAP_ALGS)?)
            }
            Capability::Handles => {
                CapabilityData::Handles(reader.list("TPML_HANDLE", MAX_CAP_HANDLES)?)
            }
            Capability::Commands => CapabilityData::Commands(reader.list("TPML_CCA", MAX_CAP_CC)?),
            Capability::TpmProperties => CapabilityData::TpmProperties(
                reader.list("TPML_TAGGED_TPM_PROPERTY", MAX_TPM_PROPERTIES)?,
            ),
        })
    }
}
