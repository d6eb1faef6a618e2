//! The transient object table.

use std::collections::BTreeMap;

use tpm_protocol::types::{Context, PublicArea};
use tpm_protocol::{AlgorithmId, Handle, Hierarchy, Name, ResponseCode};

use crate::crypto::Hasher;

/// A loaded key.
#[derive(Debug, Clone)]
pub struct KeyObject {
    pub public: PublicArea,
    pub name: Name,
    /// Key bytes, ECC scalar, or storage seed depending on the type.
    pub secret: Vec<u8>,
    pub auth: Vec<u8>,
    pub hierarchy: Hierarchy,
}

/// An in-progress hash sequence.
#[derive(Debug, Clone)]
pub struct SequenceObject {
    pub hash_alg: AlgorithmId,
    pub hasher: Hasher,
    pub auth: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum Entry {
    Key(KeyObject),
    Sequence(SequenceObject),
}

impl Entry {
    pub fn auth(&self) -> &[u8] {
        match self {
            Entry::Key(key) => &key.auth,
            Entry::Sequence(seq) => &seq.auth,
        }
    }

    /// The handle a saved context of this entry reports.
    pub fn saved_handle(&self) -> Handle {
        match self {
            Entry::Key(_) => Context::SAVED_OBJECT,
            Entry::Sequence(_) => Context::SAVED_SEQUENCE,
        }
    }

    pub fn hierarchy(&self) -> Hierarchy {
        match self {
            Entry::Key(key) => key.hierarchy,
            Entry::Sequence(_) => Hierarchy::Null,
        }
    }
}

/// Fixed-capacity table of transient objects keyed by handle.
#[derive(Debug)]
pub struct ObjectTable {
    capacity: usize,
    slots: BTreeMap<u32, Entry>,
}

impl ObjectTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.capacity - self.slots.len()
    }

    /// Place `entry` in the lowest free slot.
    pub fn insert(&mut self, entry: Entry) -> Result<Handle, ResponseCode> {
        let first = Handle::TRANSIENT_FIRST.0;
        let free = (0..self.capacity as u32)
            .map(|i| first + i)
            .find(|handle| !self.slots.contains_key(handle))
            .ok_or(ResponseCode::OBJECT_MEMORY)?;
        self.slots.insert(free, entry);
        Ok(Handle(free))
    }

    pub fn get(&self, handle: Handle) -> Option<&Entry> {
        self.slots.get(&handle.0)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Entry> {
        self.slots.get_mut(&handle.0)
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Entry> {
        self.slots.remove(&handle.0)
    }

    /// Loaded handles in ascending order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.slots.keys().map(|&h| Handle(h))
    }
}
