//! # gost-tpm Simulator
//!
//! An in-process software security module that answers the command set
//! of `tpm-protocol`. It backs the client's tests and the CLI's
//! `--simulator` mode when no hardware device is present.
//!
//! The simulator keeps a small transient object table, issues
//! integrity-protected saved contexts, and carries real Streebog, Magma,
//! Kuznyechik, and AES implementations. Asymmetric keys are modeled: the
//! public point is derived from the secret and signatures are keyed
//! digests of the right shape, verifiable only by the instance that made
//! them.
//!
//! ```rust
//! use std::io::{Read, Write};
//! use tpm_protocol::commands::GetRandom;
//! use tpm_protocol::FrameCodec;
//! use tpm_simulator::SimulatorChannel;
//!
//! let codec = FrameCodec::new();
//! let mut device = SimulatorChannel::default();
//! device.write_all(&codec.encode_command(&GetRandom { bytes_requested: 16 }).unwrap()).unwrap();
//!
//! let mut response = Vec::new();
//! device.read_to_end(&mut response).unwrap();
//! let random = codec.decode_response::<GetRandom>(&response).unwrap().unwrap();
//! assert_eq!(random.random_bytes.len(), 16);
//! ```

pub mod channel;
pub mod crypto;
pub mod keys;
pub mod objects;
pub mod simulator;

pub use channel::SimulatorChannel;
pub use simulator::{Simulator, SimulatorConfig, DEFAULT_MAX_OBJECTS, DEFAULT_MAX_SAVED_CONTEXTS};
