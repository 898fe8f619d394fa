//! In-memory table of known consoles

use std::sync::Arc;

use parking_lot::Mutex;

use crate::console::record::Console;

/// Insertion-ordered table of consoles, keyed by name.
///
/// The registry itself does no I/O and owns no threads. It is shared between
/// the discovery listener (writer) and observers through [`SharedRegistry`];
/// the mutex serializes writers, which the record layer relies on.
#[derive(Debug, Default)]
pub struct ConsoleRegistry {
    consoles: Vec<Console>,
}

impl ConsoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create-or-return the console with the given name. Idempotent: a
    /// second call with the same name yields the same record, untouched.
    pub fn upsert(&mut self, name: &str) -> &mut Console {
        match self.consoles.iter().position(|c| c.name() == name) {
            Some(idx) => &mut self.consoles[idx],
            None => {
                self.consoles.push(Console::new(name));
                let idx = self.consoles.len() - 1;
                &mut self.consoles[idx]
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<&Console> {
        self.consoles.iter().find(|c| c.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Console> {
        self.consoles.iter_mut().find(|c| c.name() == name)
    }

    /// All known consoles in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Console> {
        self.consoles.iter()
    }

    pub fn len(&self) -> usize {
        self.consoles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consoles.is_empty()
    }
}

/// Registry handle shared between the discovery listener and observers.
pub type SharedRegistry = Arc<Mutex<ConsoleRegistry>>;

/// Create a new shared registry.
pub fn shared_registry() -> SharedRegistry {
    Arc::new(Mutex::new(ConsoleRegistry::new()))
}
