//! One-shot hashing and hash sequences.

use crate::algorithm::{read_tag, AlgorithmId, UnionKind};
use crate::buffers::{Auth, Digest, MaxBuffer};
use crate::error::Result;
use crate::handle::{Handle, Hierarchy};
use crate::marshal::{Marshal, Reader};
use crate::types::{AuthHandle, Ticket};

use super::{
    auth_handle, empty_response, response_handle, Command, CommandCode, HandleSlot, Response,
};

/// Hash at most one buffer of data (`TPM2_Hash`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hash {
    pub data: MaxBuffer,
    pub hash_alg: AlgorithmId,
    pub hierarchy: Hierarchy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashResponse {
    pub out_hash: Digest,
    pub validation: Ticket,
}

impl Command for Hash {
    const CODE: CommandCode = CommandCode::Hash;
    const HANDLES: usize = 0;
    const AUTH_HANDLES: usize = 0;

    type Response = HashResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.data.marshal(buf);
        self.hash_alg.marshal(buf);
        self.hierarchy.marshal(buf);
    }

    fn unmarshal(_handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            data: params.read()?,
            hash_alg: read_tag(params, UnionKind::Hash)?,
            hierarchy: params.read()?,
        })
    }
}

impl Response for HashResponse {
    const HANDLES: usize = 0;

    fn handle_area(&self) -> Vec<Handle> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.out_hash.marshal(buf);
        self.validation.marshal(buf);
    }

    fn unmarshal(_handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            out_hash: params.read()?,
            validation: params.read()?,
        })
    }
}

/// Start a hash sequence (`TPM2_HashSequenceStart`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSequenceStart {
    /// Auth value for later use of the sequence handle.
    pub auth: Auth,
    pub hash_alg: AlgorithmId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSequenceStartResponse {
    pub sequence_handle: Handle,
}

impl Command for HashSequenceStart {
    const CODE: CommandCode = CommandCode::HashSequenceStart;
    const HANDLES: usize = 0;
    const AUTH_HANDLES: usize = 0;

    type Response = HashSequenceStartResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.auth.marshal(buf);
        self.hash_alg.marshal(buf);
    }

    fn unmarshal(_handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            auth: params.read()?,
            hash_alg: read_tag(params, UnionKind::Hash)?,
        })
    }
}

impl Response for HashSequenceStartResponse {
    const HANDLES: usize = 1;

    fn handle_area(&self) -> Vec<Handle> {
        vec![self.sequence_handle]
    }

    fn marshal_parameters(&self, _buf: &mut Vec<u8>) {}

    fn unmarshal(handles: &[Handle], _params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            sequence_handle: response_handle(handles, 0)?,
        })
    }
}

/// Feed a chunk into a running sequence (`TPM2_SequenceUpdate`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceUpdate {
    pub sequence: AuthHandle,
    pub buffer: MaxBuffer,
}

empty_response!(SequenceUpdateResponse);

impl Command for SequenceUpdate {
    const CODE: CommandCode = CommandCode::SequenceUpdate;
    const HANDLES: usize = 1;
    const AUTH_HANDLES: usize = 1;

    type Response = SequenceUpdateResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        vec![HandleSlot::authorized(&self.sequence)]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.buffer.marshal(buf);
    }

    fn unmarshal(handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            sequence: auth_handle(handles, 0)?,
            buffer: params.read()?,
        })
    }
}

/// Finish a sequence and return the digest (`TPM2_SequenceComplete`).
///
/// The module flushes the sequence object on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceComplete {
    pub sequence: AuthHandle,
    pub buffer: MaxBuffer,
    pub hierarchy: Hierarchy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCompleteResponse {
    pub result: Digest,
    pub validation: Ticket,
}

impl Command for SequenceComplete {
    const CODE: CommandCode = CommandCode::SequenceComplete;
    const HANDLES: usize = 1;
    const AUTH_HANDLES: usize = 1;

    type Response = SequenceCompleteResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        vec![HandleSlot::authorized(&self.sequence)]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.buffer.marshal(buf);
        self.hierarchy.marshal(buf);
    }

    fn unmarshal(handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            sequence: auth_handle(handles, 0)?,
            buffer: params.read()?,
            hierarchy: params.read()?,
        })
    }
}

impl Response for SequenceCompleteResponse {
    const HANDLES: usize = 0;

    fn handle_area(&self) -> Vec<Handle> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.result.marshal(buf);
        self.validation.marshal(buf);
    }

    fn unmarshal(_handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            result: params.read()?,
            validation: params.read()?,
        })
    }
}
