//! Signing and signature verification.

use crate::buffers::Digest;
use crate::error::Result;
use crate::handle::Handle;
use crate::marshal::{Marshal, Reader};
use crate::types::{AuthHandle, SigScheme, Signature, Ticket};

use super::{auth_handle, plain_handle, Command, CommandCode, HandleSlot, Response};

/// Sign an externally computed digest (`TPM2_Sign`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sign {
    pub key: AuthHandle,
    pub digest: Digest,
    pub scheme: SigScheme,
    /// Proof the digest came from the module; a null ticket for unrestricted keys.
    pub validation: Ticket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResponse {
    pub signature: Signature,
}

impl Command for Sign {
    const CODE: CommandCode = CommandCode::Sign;
    const HANDLES: usize = 1;
    const AUTH_HANDLES: usize = 1;

    type Response = SignResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        vec![HandleSlot::authorized(&self.key)]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.digest.marshal(buf);
        self.scheme.marshal(buf);
        self.validation.marshal(buf);
    }

    fn unmarshal(handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            key: auth_handle(handles, 0)?,
            digest: params.read()?,
            scheme: params.read()?,
            validation: params.read()?,
        })
    }
}

impl Response for SignResponse {
    const HANDLES: usize = 0;

    fn handle_area(&self) -> Vec<Handle> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.signature.marshal(buf);
    }

    fn unmarshal(_handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            signature: params.read()?,
        })
    }
}

/// Check a signature with a loaded public key (`TPM2_VerifySignature`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySignature {
    pub key: Handle,
    pub digest: Digest,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySignatureResponse {
    pub validation: Ticket,
}

impl Command for VerifySignature {
    const CODE: CommandCode = CommandCode::VerifySignature;
    const HANDLES: usize = 1;
    const AUTH_HANDLES: usize = 0;

    type Response = VerifySignatureResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        vec![HandleSlot::plain(self.key)]
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.digest.marshal(buf);
        self.signature.marshal(buf);
    }

    fn unmarshal(handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            key: plain_handle(handles, 0)?,
            digest: params.read()?,
            signature: params.read()?,
        })
    }
}

impl Response for VerifySignatureResponse {
    const HANDLES: usize = 0;

    fn handle_area(&self) -> Vec<Handle> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.validation.marshal(buf);
    }

    fn unmarshal(_handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            validation: params.read()?,
        })
    }
}
