//! Error types for the protocol crate.

use thiserror::Error;

use crate::algorithm::UnionKind;

/// Protocol error type covering every codec and framing failure.
///
/// Decoding never mutates the caller's cursor on failure, so any of these
/// errors is local to the single decode call that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    // Codec errors
    /// Input ended before a fixed-width field could be read.
    #[error("truncated input: need {needed} bytes, have {remaining}")]
    TruncatedInput {
        /// Bytes the field required.
        needed: usize,
        /// Bytes left in the input.
        remaining: usize,
    },

    /// A sized buffer declared more bytes than the input holds.
    #[error("malformed length: declared {declared} bytes, only {remaining} remain")]
    MalformedLength {
        /// Length from the 16-bit size field.
        declared: usize,
        /// Bytes left in the input after the size field.
        remaining: usize,
    },

    /// A union tag is not registered for the union being decoded.
    #[error("unknown algorithm tag {tag:#06x} for {context}")]
    UnknownAlgorithmTag {
        /// Union context the tag appeared in.
        context: UnionKind,
        /// Raw tag value.
        tag: u16,
    },

    /// A field holds a value outside its permitted set.
    #[error("invalid {field}: {value:#x}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Raw value.
        value: u32,
    },

    /// A structure did not consume all of its bounded input.
    #[error("trailing bytes: {count} unread bytes after {context}")]
    TrailingBytes {
        /// Structure that left bytes behind.
        context: &'static str,
        /// Number of unread bytes.
        count: usize,
    },

    /// A buffer exceeds the maximum size of its wire type.
    #[error("{kind} too large: {len} bytes exceeds maximum of {max} bytes")]
    BufferTooLarge {
        /// Wire type name.
        kind: &'static str,
        /// Actual length.
        len: usize,
        /// Maximum permitted length.
        max: usize,
    },

    /// A count-prefixed list is longer than its wire type allows.
    #[error("{kind} too long: {count} entries exceeds maximum of {max}")]
    ListTooLong {
        /// Wire type name.
        kind: &'static str,
        /// Declared entry count.
        count: usize,
        /// Maximum permitted entries.
        max: usize,
    },

    // Frame errors
    /// Header size field disagrees with the bytes actually present.
    #[error("size mismatch: header declares {declared} bytes, buffer holds {actual}")]
    SizeMismatch {
        /// Size from the header.
        declared: usize,
        /// Real buffer length.
        actual: usize,
    },

    /// Frame exceeds the maximum allowed size.
    #[error("frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Header carries a structure tag that is not a session tag.
    #[error("invalid header tag: {0:#06x}")]
    InvalidTag(u16),

    /// Command code is not part of the supported command set.
    #[error("unsupported command code: {0:#010x}")]
    UnsupportedCommand(u32),

    /// The authorization area does not cover every handle that needs one.
    #[error("authorization missing: {expected} required, {found} supplied")]
    AuthorizationMissing {
        /// Authorizations the command schema requires.
        expected: usize,
        /// Authorizations present in the buffer.
        found: usize,
    },
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
