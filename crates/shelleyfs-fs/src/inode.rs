//! Stable inode allocation: a hash of
//! `(type-tag, conversation_local_id?, sequence_id?, field_name?)`, memoized
//! so two independent Lookups for the same logical child return the same
//! inode number.

use std::hash::Hasher;

use dashmap::DashMap;
use fnv::FnvHasher;

/// The inode number the root node is always assigned, per FUSE convention.
pub const ROOT_INODE: u64 = 1;

/// The logical identity of a synthesized node, used to derive a stable
/// inode number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InodeKey {
    pub type_tag: &'static str,
    pub conversation_local_id: Option<String>,
    pub sequence_id: Option<u64>,
    pub field_name: Option<String>,
}

impl InodeKey {
    #[must_use]
    pub fn new(type_tag: &'static str) -> Self {
        Self {
            type_tag,
            conversation_local_id: None,
            sequence_id: None,
            field_name: None,
        }
    }

    #[must_use]
    pub fn with_conversation(mut self, local_id: impl Into<String>) -> Self {
        self.conversation_local_id = Some(local_id.into());
        self
    }

    #[must_use]
    pub fn with_sequence(mut self, sequence_id: u64) -> Self {
        self.sequence_id = Some(sequence_id);
        self
    }

    #[must_use]
    pub fn with_field(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    fn hash64(&self) -> u64 {
        let mut h = FnvHasher::default();
        h.write(self.type_tag.as_bytes());
        h.write_u8(0);
        if let Some(id) = &self.conversation_local_id {
            h.write(id.as_bytes());
        }
        h.write_u8(0);
        if let Some(seq) = self.sequence_id {
            h.write_u64(seq);
        }
        h.write_u8(0);
        if let Some(field) = &self.field_name {
            h.write(field.as_bytes());
        }
        h.finish()
    }
}

/// Maps [`InodeKey`]s to `u64` inode numbers, assigning on first sight and
/// returning the same number for every subsequent Lookup of the same key.
pub struct InodeTable {
    forward: DashMap<InodeKey, u64>,
    reverse: DashMap<u64, InodeKey>,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            forward: DashMap::new(),
            reverse: DashMap::new(),
        }
    }

    /// Returns the inode for `key`, allocating one if this is the first
    /// time this logical identity has been seen. A raw FNV collision with a
    /// distinct key is resolved by linear probing.
    pub fn get_or_assign(&self, key: InodeKey) -> u64 {
        if let Some(ino) = self.forward.get(&key) {
            return *ino;
        }

        let mut candidate = key.hash64().max(ROOT_INODE + 1);
        loop {
            match self.reverse.entry(candidate) {
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(key.clone());
                    self.forward.insert(key, candidate);
                    return candidate;
                }
                dashmap::mapref::entry::Entry::Occupied(slot) => {
                    if *slot.get() == key {
                        return candidate;
                    }
                    candidate = candidate.wrapping_add(1).max(ROOT_INODE + 1);
                }
            }
        }
    }

    #[must_use]
    pub fn key_for(&self, ino: u64) -> Option<InodeKey> {
        self.reverse.get(&ino).map(|e| e.clone())
    }
}
