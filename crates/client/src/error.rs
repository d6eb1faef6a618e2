//! Error types for the client crate.

use std::io;

use thiserror::Error;
use tpm_protocol::{ProtocolError, ResponseCode};

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Everything a client operation can fail with.
///
/// Codec and framing errors pass through unchanged as
/// [`ClientError::Protocol`]. Module rejections that flows need to tell
/// apart get their own variants; every other module answer is
/// [`ClientError::Module`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The byte channel failed. The session cannot be used afterwards.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    #[error("module error: {0}")]
    Module(ResponseCode),

    #[error("template rejected: {0}")]
    TemplateRejected(ResponseCode),

    #[error("load rejected: {0}")]
    LoadRejected(ResponseCode),

    /// The context blob was already consumed or came from another session.
    #[error("stale context: {0}")]
    ContextStale(ResponseCode),

    #[error("{kind} too large: {len} bytes exceeds maximum of {max} bytes")]
    InputTooLarge {
        kind: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClientError {
    /// The module's response code, for any module-originated error.
    pub fn code(&self) -> Option<ResponseCode> {
        match self {
            ClientError::Module(code)
            | ClientError::TemplateRejected(code)
            | ClientError::LoadRejected(code)
            | ClientError::ContextStale(code) => Some(*code),
            _ => None,
        }
    }

    /// Whether the module answered with `code`, ignoring parameter, handle,
    /// and session numbers.
    pub fn is_code(&self, code: ResponseCode) -> bool {
        self.code().is_some_and(|c| c.base() == code.base())
    }

    /// Reclassify a module rejection of an object template.
    pub(crate) fn into_template_error(self) -> Self {
        match self {
            ClientError::Module(code) if is_object_rejection(code) => {
                ClientError::TemplateRejected(code)
            }
            other => other,
        }
    }

    /// Reclassify a module rejection of a private/public pair.
    pub(crate) fn into_load_error(self) -> Self {
        match self {
            ClientError::Module(code) if is_object_rejection(code) => {
                ClientError::LoadRejected(code)
            }
            other => other,
        }
    }

    /// Reclassify a module rejection of a context blob.
    ///
    /// Warnings such as `TPM_RC_OBJECT_MEMORY` stay plain module errors:
    /// the blob is fine and the load can be retried once a slot frees up.
    pub(crate) fn into_context_error(self) -> Self {
        match self {
            ClientError::Module(code) if code.is_format_one() => ClientError::ContextStale(code),
            other => other,
        }
    }
}

/// Format-1 errors that point at a parameter rather than at a handle or
/// an authorization session.
fn is_object_rejection(code: ResponseCode) -> bool {
    code.is_format_one() && code.handle().is_none() && code.session().is_none()
}
