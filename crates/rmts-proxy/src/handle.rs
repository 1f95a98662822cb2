//! Per-connection handle table.
//!
//! A handle is `(generation << 32) | index`. Each connection seeds its own
//! generation, so a handle copied from another connection, or kept across
//! a reconnect, resolves as stale instead of reaching some other command.

use crate::error::ProxyError;
use rmts_types::CommandKind;

/// What a handle points at.
///
/// Targets are names, not command objects: the command is looked up at
/// execute time, so a handle never keeps a disconnected clone alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub component: String,
    pub interface: String,
    pub kind: CommandKind,
    pub name: String,
}

/// Handle table of one connection.
#[derive(Debug)]
pub struct HandleTable {
    generation: u32,
    entries: Vec<Target>,
}

impl HandleTable {
    /// Creates an empty table stamping handles with `generation`.
    #[must_use]
    pub fn new(generation: u32) -> Self {
        Self {
            generation,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handle of `target`, issuing a new one on first sight.
    pub fn intern(&mut self, target: Target) -> u64 {
        let index = match self.entries.iter().position(|t| *t == target) {
            Some(index) => index,
            None => {
                self.entries.push(target);
                self.entries.len() - 1
            }
        };
        self.pack(u32::try_from(index).unwrap_or(u32::MAX))
    }

    /// Resolves `handle` to its target.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::StaleHandle`] if the generation is not this table's
    /// - [`ProxyError::UnknownHandle`] if the index was never issued
    pub fn resolve(&self, handle: u64) -> Result<&Target, ProxyError> {
        let (generation, index) = unpack(handle);
        if generation != self.generation {
            return Err(ProxyError::StaleHandle { handle });
        }
        self.entries
            .get(index as usize)
            .ok_or(ProxyError::UnknownHandle { handle })
    }

    fn pack(&self, index: u32) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(index)
    }
}

fn unpack(handle: u64) -> (u32, u32) {
    #[allow(clippy::cast_possible_truncation)]
    ((handle >> 32) as u32, handle as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str) -> Target {
        Target {
            component: "robot".into(),
            interface: "Robot".into(),
            kind: CommandKind::Write,
            name: name.into(),
        }
    }

    #[test]
    fn intern_is_stable() {
        let mut table = HandleTable::new(5);
        let a = table.intern(target("SetGoal"));
        let b = table.intern(target("Stop"));
        assert_ne!(a, b);
        assert_eq!(table.intern(target("SetGoal")), a);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(b).expect("resolve").name, "Stop");
    }

    #[test]
    fn other_generation_is_stale() {
        let mut first = HandleTable::new(1);
        let mut second = HandleTable::new(2);
        let handle = first.intern(target("SetGoal"));
        second.intern(target("SetGoal"));
        assert!(matches!(
            second.resolve(handle),
            Err(ProxyError::StaleHandle { .. })
        ));
    }

    #[test]
    fn unissued_index_is_unknown() {
        let mut table = HandleTable::new(9);
        let handle = table.intern(target("SetGoal"));
        let err = table.resolve(handle + 1).expect_err("unknown");
        assert_eq!(err.wire_code(), "PROXY_UNKNOWN_HANDLE");
        assert!(table.resolve(handle).is_ok());
    }

    #[test]
    fn generation_lives_in_high_bits() {
        let mut table = HandleTable::new(0xABCD);
        let handle = table.intern(target("SetGoal"));
        assert_eq!(handle >> 32, 0xABCD);
        assert_eq!(table.generation(), 0xABCD);
    }
}
