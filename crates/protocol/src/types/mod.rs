//! Structured wire types.

pub mod attributes;
pub mod auth;
pub mod capability;
pub mod public;
pub mod schemes;
pub mod signature;
pub mod structures;

pub use attributes::ObjectAttributes;
pub use auth::{session_attributes, AuthCommand, AuthHandle, AuthResponse, Authorization};
pub use capability::{
    AlgorithmProperties, AlgorithmProperty, Capability, CapabilityData, TaggedProperty,
};
pub use public::{EccPoint, PublicArea, PublicDetails, SensitiveCreate};
pub use schemes::{EccScheme, KdfScheme, KeyedHashScheme, RsaScheme, SigScheme, SymDefObject};
pub use signature::{HashValue, Signature};
pub use structures::{
    Context, CreationData, PcrSelection, PcrSelectionList, Ticket, TicketKind,
};
