//! Capability queries and the random number generator.

use crate::buffers::Digest;
use crate::error::Result;
use crate::handle::Handle;
use crate::marshal::{Marshal, Reader};
use crate::types::{Capability, CapabilityData};

use super::{Command, CommandCode, HandleSlot, Response};

/// `TPM2_GetCapability`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCapability {
    pub capability: Capability,
    /// First property to return; the meaning depends on `capability`.
    pub property: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetCapabilityResponse {
    pub more_data: bool,
    pub data: CapabilityData,
}

impl Command for GetCapability {
    const CODE: CommandCode = CommandCode::GetCapability;
    const HANDLES: usize = 0;
    const AUTH_HANDLES: usize = 0;

    type Response = GetCapabilityResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.capability.marshal(buf);
        self.property.marshal(buf);
        self.count.marshal(buf);
    }

    fn unmarshal(_handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            capability: params.read()?,
            property: params.u32()?,
            count: params.u32()?,
        })
    }
}

impl Response for GetCapabilityResponse {
    const HANDLES: usize = 0;

    fn handle_area(&self) -> Vec<Handle> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.more_data.marshal(buf);
        self.data.marshal(buf);
    }

    fn unmarshal(_handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            more_data: params.read()?,
            data: params.read()?,
        })
    }
}

/// `TPM2_GetRandom`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRandom {
    pub bytes_requested: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRandomResponse {
    /// May be shorter than requested; never longer than the largest digest.
    pub random_bytes: Digest,
}

impl Command for GetRandom {
    const CODE: CommandCode = CommandCode::GetRandom;
    const HANDLES: usize = 0;
    const AUTH_HANDLES: usize = 0;

    type Response = GetRandomResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.bytes_requested.marshal(buf);
    }

    fn unmarshal(_handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            bytes_requested: params.u16()?,
        })
    }
}

impl Response for GetRandomResponse {
    const HANDLES: usize = 0;

    fn handle_area(&self) -> Vec<Handle> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.random_bytes.marshal(buf);
    }

    fn unmarshal(_handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            random_bytes: params.read()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{parameter_bytes, reparse_command, reparse_response};
    use crate::types::{AlgorithmProperties, AlgorithmProperty};

    #[test]
    fn test_get_capability_parameter_layout() {
        let command = GetCapability {
            capability: Capability::Algorithms,
            property: 0x0090,
            count: 1,
        };
        assert_eq!(
            parameter_bytes(&command),
            vec![0, 0, 0, 0, 0, 0, 0, 0x90, 0, 0, 0, 1]
        );
        assert_eq!(reparse_command(&command), command);
    }

    #[test]
    fn test_algorithm_list_response_layout() {
        let response = GetCapabilityResponse {
            more_data: false,
            data: CapabilityData::Algorithms(vec![AlgorithmProperty {
                id: 0x0092,
                properties: AlgorithmProperties(AlgorithmProperties::SYMMETRIC),
            }]),
        };
        let mut bytes = Vec::new();
        response.marshal_parameters(&mut bytes);
        assert_eq!(
            bytes,
            vec![
                0x00, // more data
                0, 0, 0, 0, // algorithms
                0, 0, 0, 1, // count
                0x00, 0x92, 0, 0, 0, 0x02,
            ]
        );
        assert_eq!(reparse_response(&response), response);
    }

    #[test]
    fn test_handle_list_response_layout() {
        let response = GetCapabilityResponse {
            more_data: true,
            data: CapabilityData::Handles(vec![Handle(0x8000_0000), Handle(0x8000_0001)]),
        };
        let mut bytes = Vec::new();
        response.marshal_parameters(&mut bytes);
        assert_eq!(
            bytes,
            vec![
                0x01, 0, 0, 0, 1, 0, 0, 0, 2, 0x80, 0, 0, 0, 0x80, 0, 0, 1,
            ]
        );
        assert_eq!(reparse_response(&response), response);
    }

    #[test]
    fn test_empty_list_is_valid() {
        let response = GetCapabilityResponse {
            more_data: false,
            data: CapabilityData::Algorithms(Vec::new()),
        };
        assert_eq!(reparse_response(&response), response);
    }

    #[test]
    fn test_get_random_roundtrip() {
        let command = GetRandom { bytes_requested: 32 };
        assert_eq!(reparse_command(&command), command);
        let response = GetRandomResponse {
            random_bytes: Digest::new(vec![7; 32]).unwrap(),
        };
        assert_eq!(reparse_response(&response), response);
    }
}
