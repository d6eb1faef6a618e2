//! Symmetric encryption with a loaded key.
//!
//! `EncryptDecrypt2` carries the same fields as `EncryptDecrypt` but puts
//! the data buffer first, which lets it be parameter-encrypted. Both share
//! one response type.

use crate::algorithm::{read_tag, AlgorithmId, UnionKind};
use crate::buffers::{Iv, MaxBuffer};
use crate::error::Result;
use crate::handle::Handle;
use crate::marshal::{Marshal, Reader};
use crate::types::AuthHandle;

use super::{auth_handle, Command, CommandCode, HandleSlot, Response};

/// `TPM2_EncryptDecrypt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptDecrypt {
    pub key: AuthHandle,
    pub decrypt: bool,
    /// Cipher mode, or `Null` for the key's default.
    pub mode: AlgorithmId,
    pub iv_in: Iv,
    pub data: MaxBuffer,
}

/// `TPM2_EncryptDecrypt2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptDecrypt2 {
    pub key: AuthHandle,
    pub data: MaxBuffer,
    pub decrypt: bool,
    pub mode: AlgorithmId,
    pub iv_in: Iv,
}

impl From<EncryptDecrypt2> for EncryptDecrypt {
    fn from(cmd: EncryptDecrypt2) -> Self {
        Self {
            key: cmd.key,
            decrypt: cmd.decrypt,
            mode: cmd.mode,
            iv_in: cmd.iv_in,
            data: cmd.data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptDecryptResponse {
    pub out_data: MaxBuffer,
    /// Chaining value for the next call.
    pub iv_out: Iv,
}

impl Command for EncryptDecrypt {
    const CODE: CommandCode = CommandCode::EncryptDecrypt;
    const HANDLES: usize = 1;
    const AUTH_HANDLES: usize = 1;

    type Response = EncryptDecryptResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        vec![HandleSlot::authorized(&self.key)]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.decrypt.marshal(buf);
        self.mode.marshal(buf);
        self.iv_in.marshal(buf);
        self.data.marshal(buf);
    }

    fn unmarshal(handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            key: auth_handle(handles, 0)?,
            decrypt: params.read()?,
            mode: read_tag(params, UnionKind::CipherMode)?,
            iv_in: params.read()?,
            data: params.read()?,
        })
    }
}

impl Command for EncryptDecrypt2 {
    const CODE: CommandCode = CommandCode::EncryptDecrypt2;
    const HANDLES: usize = 1;
    const AUTH_HANDLES: usize = 1;

    type Response = EncryptDecryptResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        vec![HandleSlot::authorized(&self.key)]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.data.marshal(buf);
        self.decrypt.marshal(buf);
        self.mode.marshal(buf);
        self.iv_in.marshal(buf);
    }

    fn unmarshal(handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            key: auth_handle(handles, 0)?,
            data: params.read()?,
            decrypt: params.read()?,
            mode: read_tag(params, UnionKind::CipherMode)?,
            iv_in: params.read()?,
        })
    }
}

impl Response for EncryptDecryptResponse {
    const HANDLES: usize = 0;

    fn handle_area(&self) -> Vec<Handle> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.out_data.marshal(buf);
        self.iv_out.marshal(buf);
    }

    fn unmarshal(_handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            out_data: params.read()?,
            iv_out: params.read()?,
        })
    }
}
