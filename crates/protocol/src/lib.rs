//! # gost-tpm Protocol Library
//!
//! Wire codec and command framing for TPM 2.0 security modules that carry
//! the GOST algorithm family (Streebog, Magma, Kuznyechik, GOST R 34.10).
//!
//! ## Overview
//!
//! This crate is pure data transformation with no I/O:
//!
//! - **Codec**: big-endian integers, `TPM2B_*` sized buffers, sized
//!   structures, count-prefixed lists, and algorithm-tagged unions
//! - **Commands**: typed request/response schemas for the supported command set
//! - **Framing**: header, handle area, authorization area, and parameter
//!   area assembly, plus the inverse for responses
//! - **Response codes**: format-0/format-1 decoding of `TPM_RC` values
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Typed commands / responses       │  commands::*
//! ├─────────────────────────────────────────┤
//! │                Framing                  │  header, handles, auth area
//! ├─────────────────────────────────────────┤
//! │              Binary codec               │  Marshal / Unmarshal
//! ├─────────────────────────────────────────┤
//! │     Transport (character device, sim)   │  outside this crate
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use tpm_protocol::commands::{GetRandom, GetRandomResponse};
//! use tpm_protocol::{Digest, FrameCodec};
//!
//! let codec = FrameCodec::new();
//! let command = codec.encode_command(&GetRandom { bytes_requested: 8 }).unwrap();
//! assert_eq!(command.len(), 12);
//!
//! // A module would answer with something like this
//! let answer = GetRandomResponse {
//!     random_bytes: Digest::new(vec![4; 8]).unwrap(),
//! };
//! let bytes = codec.encode_response(&answer, 0).unwrap();
//!
//! let decoded = codec.decode_response::<GetRandom>(&bytes).unwrap().unwrap();
//! assert_eq!(decoded.random_bytes.len(), 8);
//! ```
//!
//! ## Modules
//!
//! - [`marshal`]: `Marshal`/`Unmarshal` traits and the `Reader` cursor
//! - [`buffers`]: sized byte buffers
//! - [`algorithm`]: algorithm identifiers, curves, and the union tag registry
//! - [`handle`]: handles and hierarchies
//! - [`types`]: structured wire types
//! - [`commands`]: command schemas
//! - [`framing`]: command/response buffer assembly
//! - [`rc`]: response codes
//! - [`error`]: error types

pub mod algorithm;
pub mod buffers;
pub mod commands;
pub mod error;
pub mod framing;
pub mod handle;
pub mod marshal;
pub mod rc;
pub mod types;

pub use algorithm::{AlgorithmId, EccCurve, UnionKind};
pub use buffers::{
    Auth, ContextData, Data, Digest, EccParameter, Iv, MaxBuffer, Name, Nonce, Private,
    PublicKeyRsa, SensitiveData,
};
pub use commands::{Command, CommandCode, HandleSlot, Response};
pub use error::{ProtocolError, Result};
pub use framing::{
    DecodedCommand, FrameCodec, Header, Outcome, SessionTag, HEADER_SIZE, MAX_FRAME_SIZE,
};
pub use handle::{Handle, Hierarchy};
pub use marshal::{decode, decode_exact, Marshal, Reader, Unmarshal};
pub use rc::ResponseCode;
