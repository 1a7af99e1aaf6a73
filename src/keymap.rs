//! Keymaps and actions
//!
//! A keymap binds button symbols to action sequences and may inherit from
//! another keymap by name. Resolution walks the inheritance chain; the walk
//! is iterative with a visited set, so a mis-configured loop is reported
//! instead of recursing.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// One step of a bound action sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Inject a synthetic keypress.
    Keypress(String),
    /// Advance the multi-tap text entry cycle for a phone-pad digit.
    Multitap(char),
    /// Send a text command to a named remote-control peer.
    Remote { target: String, command: String },
    /// Transmit the stored packet for a button name.
    Transmit(String),
    /// Switch the current keymap.
    SetKeymap(String),
    /// Run an external command through the shell.
    Script(String),
}

/// A named symbol-to-actions table with an optional parent.
#[derive(Debug, Clone)]
pub struct Keymap {
    pub name: String,
    /// Parent keymap name; resolved against the registry during lookup.
    pub inherit: Option<String>,
    mapping: HashMap<String, Vec<Action>>,
}

impl Keymap {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inherit: None,
            mapping: HashMap::new(),
        }
    }

    pub fn bind(&mut self, symbol: impl Into<String>, actions: Vec<Action>) {
        self.mapping.insert(symbol.into(), actions);
    }

    pub fn get(&self, symbol: &str) -> Option<&[Action]> {
        self.mapping.get(symbol).map(Vec::as_slice)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeymapError {
    /// A keymap name was referenced (inherit, set_keymap) but never defined.
    /// This is a configuration error, not a runtime-recoverable one.
    #[error("unknown keymap '{0}'")]
    Unknown(String),
    #[error("keymap inheritance loop: '{from}' leads back to '{to}'")]
    InheritanceLoop { from: String, to: String },
}

/// Registry of keymaps plus the current-keymap pointer.
#[derive(Debug, Default)]
pub struct KeymapSet {
    maps: HashMap<String, Keymap>,
    current: Option<String>,
}

impl KeymapSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a keymap. The most recently registered keymap becomes
    /// current, so a config file's last `keymap` block is the startup map.
    pub fn register(&mut self, keymap: Keymap) {
        self.current = Some(keymap.name.clone());
        self.maps.insert(keymap.name.clone(), keymap);
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Switch the current keymap, failing on an unregistered name.
    pub fn set_current(&mut self, name: &str) -> Result<(), KeymapError> {
        if !self.maps.contains_key(name) {
            return Err(KeymapError::Unknown(name.to_string()));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    /// Resolve a symbol through the current keymap and its inheritance
    /// chain. Returns `None` when no keymap in the chain binds the symbol;
    /// the caller then consults the built-in fallback table.
    pub fn resolve(&self, symbol: &str) -> Result<Option<Vec<Action>>, KeymapError> {
        let Some(start) = self.current.as_deref() else {
            return Ok(None);
        };
        let mut visited = HashSet::new();
        visited.insert(start.to_string());
        let mut name = start.to_string();
        loop {
            let keymap = self
                .maps
                .get(&name)
                .ok_or_else(|| KeymapError::Unknown(name.clone()))?;
            if let Some(actions) = keymap.get(symbol) {
                return Ok(Some(actions.to_vec()));
            }
            match &keymap.inherit {
                Some(parent) => {
                    if parent == start || !visited.insert(parent.clone()) {
                        return Err(KeymapError::InheritanceLoop {
                            from: name,
                            to: parent.clone(),
                        });
                    }
                    name = parent.clone();
                }
                None => return Ok(None),
            }
        }
    }
}
