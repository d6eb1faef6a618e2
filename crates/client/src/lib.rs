//! # gost-tpm Client Library
//!
//! Drives a TPM 2.0 module that implements the GOST algorithm family.
//!
//! ## Overview
//!
//! - **Engine**: [`Tpm`] encodes a typed command, sends it over a
//!   [`Transport`], and decodes exactly one response
//! - **Lifecycle**: primaries, child objects, loading, context save/load,
//!   and release, with every handle held in an [`Object`] guard
//! - **Flows**: symmetric round trips, one-shot and interruptible hashing,
//!   GOST signing and verification, capability queries
//! - **Configuration**: TOML settings for the `gost-tpm` binary
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                  Flows                  │  flows::*
//! ├─────────────────────────────────────────┤
//! │        Object lifecycle and guards      │  objects, templates
//! ├─────────────────────────────────────────┤
//! │             Command engine              │  Tpm::execute
//! ├─────────────────────────────────────────┤
//! │   tpm-protocol codec and framing        │
//! ├─────────────────────────────────────────┤
//! │   Transport: /dev/tpmrm0 or simulator   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use tpm_client::flows::{hash_chunked, round_trip};
//! use tpm_client::Tpm;
//! use tpm_protocol::AlgorithmId;
//! use tpm_simulator::SimulatorChannel;
//!
//! let tpm = Tpm::new(SimulatorChannel::default());
//!
//! let result = round_trip(&tpm, AlgorithmId::Magma, AlgorithmId::Ctr, &[0; 8], b"message").unwrap();
//! assert_eq!(result.recovered, b"message");
//!
//! let digest = hash_chunked(&tpm, AlgorithmId::Gost3411_256, b"abcdef", 2).unwrap();
//! assert_eq!(digest.len(), 32);
//! ```

pub mod config;
pub mod error;
pub mod flows;
pub mod objects;
pub mod templates;
pub mod tpm;
pub mod transport;

pub use tpm_protocol as protocol;

pub use config::{Config, ConfigError};
pub use error::{ClientError, Result};
pub use objects::{ContextBlob, KeyBlob, Object};
pub use templates::Template;
pub use tpm::Tpm;
pub use transport::{Device, Transport, DEFAULT_DEVICE_PATH};
