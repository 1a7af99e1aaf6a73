//! Symbol dictionary: named button packets
//!
//! Bidirectional store mapping symbolic button names to one or more raw
//! packet shapes. Shape lookup is a deliberate O(n) first-hit scan in
//! insertion order; n is tens of buttons, not a performance path.

use std::collections::HashMap;

use crate::ir::{packets_match, Packet};

/// One registered shape for a button.
#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub name: String,
    pub packet: Packet,
}

/// Insertion-ordered collection of symbol entries plus a name index.
///
/// Many entries may share a name: remotes emit alternate raw shapes for the
/// same logical button. The first insertion under a name is the canonical
/// packet for transmission; later insertions only extend shape matching.
#[derive(Debug, Default)]
pub struct SymbolDictionary {
    entries: Vec<SymbolEntry>,
    by_name: HashMap<String, usize>,
    jitter: u16,
}

impl SymbolDictionary {
    pub fn new(jitter: u16) -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
            jitter,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a packet shape under `name`.
    pub fn insert(&mut self, name: impl Into<String>, packet: Packet) {
        let name = name.into();
        let index = self.entries.len();
        self.by_name.entry(name.clone()).or_insert(index);
        self.entries.push(SymbolEntry { name, packet });
    }

    /// Canonical packet for a button name.
    pub fn lookup_by_name(&self, name: &str) -> Option<&Packet> {
        self.by_name.get(name).map(|&i| &self.entries[i].packet)
    }

    /// Name of the first registered shape matching `packet` within the
    /// configured jitter, in insertion order.
    pub fn lookup_by_shape(&self, packet: &Packet) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| packets_match(&entry.packet, packet, self.jitter))
            .map(|entry| entry.name.as_str())
    }

    /// All registered entries in insertion order (dictionary dumps).
    pub fn entries(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.iter()
    }
}
