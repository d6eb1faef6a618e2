//! Context management: flush, save, and load.

use crate::error::Result;
use crate::handle::Handle;
use crate::marshal::{Marshal, Reader};
use crate::types::Context;

use super::{empty_response, plain_handle, response_handle, Command, CommandCode, HandleSlot, Response};

/// Remove a transient object or sequence from module memory (`TPM2_FlushContext`).
///
/// The handle travels in the parameter area, so no authorization is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushContext {
    pub flush_handle: Handle,
}

empty_response!(FlushContextResponse);

impl Command for FlushContext {
    const CODE: CommandCode = CommandCode::FlushContext;
    const HANDLES: usize = 0;
    const AUTH_HANDLES: usize = 0;

    type Response = FlushContextResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.flush_handle.marshal(buf);
    }

    fn unmarshal(_handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            flush_handle: params.read()?,
        })
    }
}

/// Export a loaded object or sequence as a context blob (`TPM2_ContextSave`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSave {
    pub save_handle: Handle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSaveResponse {
    pub context: Context,
}

impl Command for ContextSave {
    const CODE: CommandCode = CommandCode::ContextSave;
    const HANDLES: usize = 1;
    const AUTH_HANDLES: usize = 0;

    type Response = ContextSaveResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        vec![HandleSlot::plain(self.save_handle)]
    }

    fn marshal_parameters(&self, _buf: &mut Vec<u8>) {}

    fn unmarshal(handles: &[HandleSlot], _params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            save_handle: plain_handle(handles, 0)?,
        })
    }
}

impl Response for ContextSaveResponse {
    const HANDLES: usize = 0;

    fn handle_area(&self) -> Vec<Handle> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.context.marshal(buf);
    }

    fn unmarshal(_handles: &[Handle], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            context: params.read()?,
        })
    }
}

/// Reload a saved context under a fresh handle (`TPM2_ContextLoad`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLoad {
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLoadResponse {
    pub loaded_handle: Handle,
}

impl Command for ContextLoad {
    const CODE: CommandCode = CommandCode::ContextLoad;
    const HANDLES: usize = 0;
    const AUTH_HANDLES: usize = 0;

    type Response = ContextLoadResponse;

    fn handle_area(&self) -> Vec<HandleSlot> {
        Vec::new()
    }

    fn marshal_parameters(&self, buf: &mut Vec<u8>) {
        self.context.marshal(buf);
    }

    fn unmarshal(_handles: &[HandleSlot], params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            context: params.read()?,
        })
    }
}

impl Response for ContextLoadResponse {
    const HANDLES: usize = 1;

    fn handle_area(&self) -> Vec<Handle> {
        vec![self.loaded_handle]
    }

    fn marshal_parameters(&self, _buf: &mut Vec<u8>) {}

    fn unmarshal(handles: &[Handle], _params: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            loaded_handle: response_handle(handles, 0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::ContextData;
    use crate::commands::{parameter_bytes, reparse_command, reparse_response};
    use crate::handle::Hierarchy;

    fn saved() -> Context {
        Context {
            sequence: 5,
            saved_handle: Context::SAVED_SEQUENCE,
            hierarchy: Hierarchy::Owner,
            blob: ContextData::new(vec![0xC0, 0xDE]).unwrap(),
        }
    }

    fn saved_bytes() -> Vec<u8> {
        vec![
            0, 0, 0, 0, 0, 0, 0, 5, // sequence
            0x80, 0x00, 0x00, 0x01, // saved sequence handle
            0x40, 0x00, 0x00, 0x01, // owner
            0x00, 0x02, 0xC0, 0xDE,
        ]
    }

    #[test]
    fn test_context_save_handle_only() {
        let command = ContextSave {
            save_handle: Handle(0x8000_0003),
        };
        assert!(parameter_bytes(&command).is_empty());
        assert_eq!(command.handle_area(), vec![HandleSlot::plain(Handle(0x8000_0003))]);
        assert_eq!(reparse_command(&command), command);

        let response = ContextSaveResponse { context: saved() };
        let mut bytes = Vec::new();
        response.marshal_parameters(&mut bytes);
        assert_eq!(bytes, saved_bytes());
        assert_eq!(reparse_response(&response), response);
    }

    #[test]
    fn test_context_load_parameter_layout() {
        let command = ContextLoad { context: saved() };
        assert!(command.handle_area().is_empty());
        assert_eq!(parameter_bytes(&command), saved_bytes());
        assert_eq!(reparse_command(&command), command);

        let response = ContextLoadResponse {
            loaded_handle: Handle(0x8000_0000),
        };
        assert_eq!(response.handle_area(), vec![Handle(0x8000_0000)]);
        assert_eq!(reparse_response(&response), response);
    }

    #[test]
    fn test_flush_roundtrip() {
        let command = FlushContext {
            flush_handle: Handle(0x8000_0001),
        };
        assert_eq!(reparse_command(&command), command);
        assert_eq!(reparse_response(&FlushContextResponse), FlushContextResponse);
    }

    #[test]
    fn test_context_with_unknown_hierarchy_rejected() {
        let mut bytes = saved_bytes();
        bytes[15] = 0x02;
        let mut reader = Reader::new(&bytes);
        assert!(ContextLoad::unmarshal(&[], &mut reader).is_err());
    }
}
