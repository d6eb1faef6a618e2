//! Object creation and loading.

use crate::buffers::{Data, Digest, Name, Private};
use crate::error::Result;
use crate::handle::Handle;
use crate::marshal::{put_sized_struct, Marshal, Reader};
use crate::types::{AuthHandle, CreationData, PcrSelectionList, PublicArea, SensitiveCreate, Ticket};

use super::{auth_handle, response_handle, Command, CommandCode, HandleSlot, Response};

/// Derive a primary object from a hierarchy seed (`TPM2_CreatePrimary`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrimary {
    pub primary: AuthHandle,
    pub sensitive: SensitiveCreate,
    pub public: PublicArea,
    pub outside_info: Data,
    pub creation_pcr: PcrSelectionList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePrimaryResponse {
    pub object_handle: Handle,
    pub out_public: PublicArea,
    pub creation_data: CreationData,
    pub creation_hash: Digest,
    pub creation_ticket: Ticket,
    pub name: Name,
}

impl Command for CreatePrimary {
    const CODE: CommandCode = CommandCode::CreatePrimary;
    const HANDLES: usize = 1;
    const AUTH_HANDLES: usize = 1;

    type Response = CreatePrimaryResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        vec![HandleSlot::authorized(&self.primary)]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        put_sized_struct(buf, &self.sensitive);
        put_sized_struct(buf, &self.public);
        self.outside_info.marshal(buf);
        self.creation_pcr.marshal(buf);
    }

    fn unmarshal(handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            primary: auth_handle(handles, 0)?,
            sensitive: params.sized_struct("TPM2B_SENSITIVE_CREATE")?,
            public: params.sized_struct("TPM2B_PUBLIC")?,
            outside_info: params.read()?,
            creation_pcr: params.read()?,
        })
    }
}

impl Response for CreatePrimaryResponse {
    const HANDLES: usize = 1;

    fn handle_area(&self) -> Vec<Handle> {
        vec![self.object_handle]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        put_sized_struct(buf, &self.out_public);
        put_sized_struct(buf, &self.creation_data);
        self.creation_hash.marshal(buf);
        self.creation_ticket.marshal(buf);
        self.name.marshal(buf);
    }

    fn unmarshal(handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            object_handle: response_handle(handles, 0)?,
            out_public: params.sized_struct("TPM2B_PUBLIC")?,
            creation_data: params.sized_struct("TPM2B_CREATION_DATA")?,
            creation_hash: params.read()?,
            creation_ticket: params.read()?,
            name: params.read()?,
        })
    }
}

/// Create an ordinary object under a loaded parent (`TPM2_Create`).
///
/// The result is a wrapped key blob; nothing is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Create {
    pub parent: AuthHandle,
    pub sensitive: SensitiveCreate,
    pub public: PublicArea,
    pub outside_info: Data,
    pub creation_pcr: PcrSelectionList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResponse {
    pub out_private: Private,
    pub out_public: PublicArea,
    pub creation_data: CreationData,
    pub creation_hash: Digest,
    pub creation_ticket: Ticket,
}

impl Command for Create {
    const CODE: CommandCode = CommandCode::Create;
    const HANDLES: usize = 1;
    const AUTH_HANDLES: usize = 1;

    type Response = CreateResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        vec![HandleSlot::authorized(&self.parent)]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        put_sized_struct(buf, &self.sensitive);
        put_sized_struct(buf, &self.public);
        self.outside_info.marshal(buf);
        self.creation_pcr.marshal(buf);
    }

    fn unmarshal(handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            parent: auth_handle(handles, 0)?,
            sensitive: params.sized_struct("TPM2B_SENSITIVE_CREATE")?,
            public: params.sized_struct("TPM2B_PUBLIC")?,
            outside_info: params.read()?,
            creation_pcr: params.read()?,
        })
    }
}

impl Response for CreateResponse {
    const HANDLES: usize = 0;

    fn handle_area(&self) -> Vec<Handle> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.out_private.marshal(buf);
        put_sized_struct(buf, &self.out_public);
        put_sized_struct(buf, &self.creation_data);
        self.creation_hash.marshal(buf);
        self.creation_ticket.marshal(buf);
    }

    fn unmarshal(_handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            out_private: params.read()?,
            out_public: params.sized_struct("TPM2B_PUBLIC")?,
            creation_data: params.sized_struct("TPM2B_CREATION_DATA")?,
            creation_hash: params.read()?,
            creation_ticket: params.read()?,
        })
    }
}

/// Load a wrapped object under its parent (`TPM2_Load`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Load {
    pub parent: AuthHandle,
    pub in_private: Private,
    pub in_public: PublicArea,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResponse {
    pub object_handle: Handle,
    pub name: Name,
}

impl Command for Load {
    const CODE: CommandCode = CommandCode::Load;
    const HANDLES: usize = 1;
    const AUTH_HANDLES: usize = 1;

    type Response = LoadResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        vec![HandleSlot::authorized(&self.parent)]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.in_private.marshal(buf);
        put_sized_struct(buf, &self.in_public);
    }

    fn unmarshal(handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            parent: auth_handle(handles, 0)?,
            in_private: params.read()?,
            in_public: params.sized_struct("TPM2B_PUBLIC")?,
        })
    }
}

impl Response for LoadResponse {
    const HANDLES: usize = 1;

    fn handle_area(&self) -> Vec<Handle> {
        vec![self.object_handle]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.name.marshal(buf);
    }

    fn unmarshal(handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            object_handle: response_handle(handles, 0)?,
            name: params.read()?,
        })
    }
}
