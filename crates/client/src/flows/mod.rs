//! Multi-command operations built on the lifecycle manager.
//!
//! Each flow is a fixed sequence of commands with no retries. Handles
//! created along the way are held in [`Object`](crate::objects::Object)
//! guards, so an error at any step still releases them.

pub mod capability;
pub mod hashing;
pub mod signing;
pub mod symmetric;

pub use capability::{algorithms, get_random, has_algorithm, loaded_handles, tpm_properties};
pub use hashing::{
    hash, hash_chunked, hash_interruptible, hash_with_ticket, HashSequence, SuspendedSequence,
    TicketedDigest,
};
pub use signing::{sign_and_verify, SignedDigest, SigningKey};
pub use symmetric::{pkcs7_pad, pkcs7_unpad, random_iv, round_trip, RoundTrip, SymmetricKey};
