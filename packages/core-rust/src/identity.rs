//! Stable identifiers for published step templates.
//!
//! The registry remembers one `(version, id)` slot per command. Asking again
//! for the same pair returns the same id; asking with a different version
//! issues a fresh id and forgets the previous one. Identifiers are only stable
//! for the lifetime of one registry, so anything that must survive across
//! generator runs has to be persisted by whoever saves the generated document.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

/// Current identity slot for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepIdentity {
    pub version: u32,
    pub id: Uuid,
}

/// Assigns identifiers to `(command, version)` pairs.
#[derive(Debug, Default)]
pub struct StepIdentityRegistry {
    slots: Mutex<HashMap<String, StepIdentity>>,
}

impl StepIdentityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the identifier for `command` at `version`, issuing one if the
    /// command is unknown or its remembered version differs.
    pub fn get(&self, command: &str, version: u32) -> Uuid {
        let mut slots = self.slots.lock();
        match slots.get_mut(command) {
            Some(slot) if slot.version == version => slot.id,
            Some(slot) => {
                *slot = StepIdentity {
                    version,
                    id: Uuid::new_v4(),
                };
                slot.id
            }
            None => {
                let id = Uuid::new_v4();
                slots.insert(command.to_string(), StepIdentity { version, id });
                id
            }
        }
    }

    /// The slot currently held for `command`, if any.
    #[must_use]
    pub fn current(&self, command: &str) -> Option<StepIdentity> {
        self.slots.lock().get(command).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
