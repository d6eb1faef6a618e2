//! One-shot and sequence hashing.
//!
//! A sequence occupies a transient slot for as long as it is live. Long
//! inputs that arrive in pieces can [`suspend`](HashSequence::suspend)
//! the sequence between pieces so the slot is free for other work, then
//! [`resume`](SuspendedSequence::resume) it when the next piece arrives.

use tracing::debug;
use tpm_protocol::commands::{Hash, HashSequenceStart, SequenceComplete, SequenceUpdate};
use tpm_protocol::types::{Authorization, Ticket};
use tpm_protocol::{AlgorithmId, Auth, Digest, Hierarchy, MaxBuffer, Name};

use crate::error::{ClientError, Result};
use crate::objects::{ContextBlob, Object};
use crate::tpm::Tpm;
use crate::transport::Transport;

/// Hash a buffer that fits in one command.
///
/// Hashes under the owner hierarchy, so the module also produces a
/// hashcheck ticket; use [`hash_with_ticket`] to keep it.
pub fn hash<T: Transport>(tpm: &Tpm<T>, algorithm: AlgorithmId, data: &[u8]) -> Result<Digest> {
    Ok(hash_with_ticket(tpm, algorithm, data, Hierarchy::Owner)?.digest)
}

/// A digest together with the module's ticket for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketedDigest {
    pub digest: Digest,
    /// Null under the null hierarchy, otherwise proof that the module
    /// computed `digest` itself.
    pub validation: Ticket,
}

/// Hash a buffer that fits in one command under `hierarchy`.
pub fn hash_with_ticket<T: Transport>(
    tpm: &Tpm<T>,
    algorithm: AlgorithmId,
    data: &[u8],
    hierarchy: Hierarchy,
) -> Result<TicketedDigest> {
    if data.len() > MaxBuffer::MAX_SIZE {
        return Err(ClientError::InputTooLarge {
            kind: "hash input",
            len: data.len(),
            max: MaxBuffer::MAX_SIZE,
        });
    }
    let response = tpm.execute(&Hash {
        data: MaxBuffer::new(data.to_vec())?,
        hash_alg: algorithm,
        hierarchy,
    })?;
    Ok(TicketedDigest {
        digest: response.out_hash,
        validation: response.validation,
    })
}

/// A live hash sequence.
#[derive(Debug)]
pub struct HashSequence<'tpm, T: Transport> {
    object: Object<'tpm, T>,
    algorithm: AlgorithmId,
}

impl<'tpm, T: Transport> HashSequence<'tpm, T> {
    pub fn start(tpm: &'tpm Tpm<T>, algorithm: AlgorithmId) -> Result<Self> {
        let response = tpm.execute(&HashSequenceStart {
            auth: Auth::empty(),
            hash_alg: algorithm,
        })?;
        debug!(handle = %response.sequence_handle, alg = %algorithm, "hash sequence started");
        let object = Object::new(
            tpm,
            response.sequence_handle,
            Name::empty(),
            Authorization::Empty,
            None,
        );
        Ok(Self { object, algorithm })
    }

    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }

    /// Feed data of any length.
    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        for piece in data.chunks(MaxBuffer::MAX_SIZE) {
            self.object.tpm().execute(&SequenceUpdate {
                sequence: self.object.auth_handle(),
                buffer: MaxBuffer::new(piece.to_vec())?,
            })?;
        }
        Ok(())
    }

    /// Save the sequence state and free its slot.
    pub fn suspend(self) -> Result<SuspendedSequence> {
        let tpm = self.object.tpm();
        let blob = tpm.save_context(self.object)?;
        Ok(SuspendedSequence {
            blob,
            algorithm: self.algorithm,
        })
    }

    /// Finish with a last piece of at most one buffer and return the digest.
    ///
    /// On success the module retires the sequence handle itself. On failure
    /// the guard still flushes it.
    pub fn complete(self, last: &[u8]) -> Result<Digest> {
        if last.len() > MaxBuffer::MAX_SIZE {
            return Err(ClientError::InputTooLarge {
                kind: "final sequence buffer",
                len: last.len(),
                max: MaxBuffer::MAX_SIZE,
            });
        }
        let response = self.object.tpm().execute(&SequenceComplete {
            sequence: self.object.auth_handle(),
            buffer: MaxBuffer::new(last.to_vec())?,
            hierarchy: Hierarchy::Null,
        })?;
        let handle = self.object.consumed();
        debug!(handle = %handle, "hash sequence completed");
        Ok(response.result)
    }
}

/// A hash sequence saved between pieces of input.
#[derive(Debug, Clone)]
pub struct SuspendedSequence {
    blob: ContextBlob,
    algorithm: AlgorithmId,
}

impl SuspendedSequence {
    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }

    pub fn resume<T: Transport>(self, tpm: &Tpm<T>) -> Result<HashSequence<'_, T>> {
        let object = tpm.load_context(self.blob)?;
        Ok(HashSequence {
            object,
            algorithm: self.algorithm,
        })
    }
}

enum Stage<'tpm, T: Transport> {
    Live(HashSequence<'tpm, T>),
    Suspended(SuspendedSequence),
}

impl<'tpm, T: Transport> Stage<'tpm, T> {
    fn into_live(self, tpm: &'tpm Tpm<T>) -> Result<HashSequence<'tpm, T>> {
        match self {
            Stage::Live(sequence) => Ok(sequence),
            Stage::Suspended(suspended) => suspended.resume(tpm),
        }
    }
}

/// Hash a stream of pieces, suspending the sequence between pieces.
///
/// The digest equals hashing the concatenation in one go.
pub fn hash_interruptible<'a, T, I>(tpm: &Tpm<T>, algorithm: AlgorithmId, chunks: I) -> Result<Digest>
where
    T: Transport,
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut stage = Stage::Live(HashSequence::start(tpm, algorithm)?);
    for chunk in chunks {
        let mut sequence = stage.into_live(tpm)?;
        sequence.update(chunk)?;
        stage = Stage::Suspended(sequence.suspend()?);
    }
    stage.into_live(tpm)?.complete(&[])
}

/// Hash `data` in pieces of `chunk_size`, suspending between pieces.
pub fn hash_chunked<T: Transport>(
    tpm: &Tpm<T>,
    algorithm: AlgorithmId,
    data: &[u8],
    chunk_size: usize,
) -> Result<Digest> {
    if chunk_size == 0 {
        return Err(ClientError::InvalidArgument(
            "chunk size must be positive".to_string(),
        ));
    }
    hash_interruptible(tpm, algorithm, data.chunks(chunk_size))
}
