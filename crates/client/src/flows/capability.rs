//! Capability queries and module randomness.

use tpm_protocol::commands::{GetCapability, GetRandom};
use tpm_protocol::types::{AlgorithmProperty, Capability, CapabilityData, TaggedProperty};
use tpm_protocol::{AlgorithmId, Handle, ProtocolError};

use crate::error::{ClientError, Result};
use crate::tpm::Tpm;
use crate::transport::Transport;

/// Most random bytes requested in one `GetRandom`.
const RANDOM_CHUNK: usize = 64;

fn query<T: Transport>(
    tpm: &Tpm<T>,
    capability: Capability,
    property: u32,
    count: u32,
) -> Result<(CapabilityData, bool)> {
    let response = tpm.execute(&GetCapability {
        capability,
        property,
        count,
    })?;
    Ok((response.data, response.more_data))
}

/// The module answered about a different capability than asked.
fn mismatch(capability: Capability) -> ClientError {
    ClientError::Protocol(ProtocolError::InvalidValue {
        field: "capability",
        value: capability as u32,
    })
}

/// Up to `count` algorithms with an identifier of at least `start`, in
/// identifier order. Past the last algorithm the list is empty.
pub fn algorithms<T: Transport>(
    tpm: &Tpm<T>,
    start: u16,
    count: u32,
) -> Result<Vec<AlgorithmProperty>> {
    match query(tpm, Capability::Algorithms, u32::from(start), count)? {
        (CapabilityData::Algorithms(list), _) => Ok(list),
        (other, _) => Err(mismatch(other.capability())),
    }
}

/// Whether the module implements `algorithm`.
pub fn has_algorithm<T: Transport>(tpm: &Tpm<T>, algorithm: AlgorithmId) -> Result<bool> {
    let list = algorithms(tpm, algorithm.as_u16(), 1)?;
    Ok(list.first().is_some_and(|entry| entry.id == algorithm.as_u16()))
}

/// Every transient handle currently loaded, following `more_data`.
pub fn loaded_handles<T: Transport>(tpm: &Tpm<T>) -> Result<Vec<Handle>> {
    let mut handles = Vec::new();
    let mut next = Handle::TRANSIENT_FIRST.0;
    loop {
        let (data, more) = query(tpm, Capability::Handles, next, u32::MAX)?;
        let CapabilityData::Handles(page) = data else {
            return Err(mismatch(data.capability()));
        };
        let Some(last) = page.last().copied() else {
            break;
        };
        handles.extend(page);
        if !more {
            break;
        }
        match last.0.checked_add(1) {
            Some(after) => next = after,
            None => break,
        }
    }
    Ok(handles)
}

/// Fixed and variable module properties from `start`.
pub fn tpm_properties<T: Transport>(
    tpm: &Tpm<T>,
    start: u32,
    count: u32,
) -> Result<Vec<TaggedProperty>> {
    match query(tpm, Capability::TpmProperties, start, count)? {
        (CapabilityData::TpmProperties(list), _) => Ok(list),
        (other, _) => Err(mismatch(other.capability())),
    }
}

/// `n` bytes from the module's generator.
///
/// The module may answer with fewer bytes than asked, so this keeps
/// asking until it has enough.
pub fn get_random<T: Transport>(tpm: &Tpm<T>, n: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(n);
    while bytes.len() < n {
        let want = (n - bytes.len()).min(RANDOM_CHUNK);
        let response = tpm.execute(&GetRandom {
            bytes_requested: want as u16,
        })?;
        if response.random_bytes.is_empty() {
            return Err(ClientError::Protocol(ProtocolError::InvalidValue {
                field: "randomBytes size",
                value: 0,
            }));
        }
        let take = response.random_bytes.len().min(n - bytes.len());
        bytes.extend_from_slice(&response.random_bytes.as_bytes()[..take]);
    }
    Ok(bytes)
}
