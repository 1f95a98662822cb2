//! Identifier types.
//!
//! Components and their provided interfaces live in an arena owned by the
//! component manager and are addressed by stable indices. An end-user
//! clone refers back to its original interface through an [`InterfaceId`],
//! never through an owning pointer.
//!
//! Remote peers are identified by a random [`ClientId`] assigned when
//! they register with a proxy server.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Arena index of a component inside one component manager.
///
/// Indices are never reused while the manager is alive.
///
/// # Example
///
/// ```
/// use rmts_types::ComponentId;
///
/// let id = ComponentId::new(3);
/// assert_eq!(id.index(), 3);
/// assert_eq!(id.to_string(), "component#3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Wraps a raw arena index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}

/// Stable address of an original provided interface.
///
/// `(component, slot)` where `slot` is the position of the interface in
/// the component's provided-interface list. Clones carry the id of the
/// original they were created from.
///
/// # Example
///
/// ```
/// use rmts_types::{ComponentId, InterfaceId};
///
/// let id = InterfaceId::new(ComponentId::new(1), 0);
/// assert_eq!(id.component(), ComponentId::new(1));
/// assert_eq!(id.slot(), 0);
/// assert_eq!(id.to_string(), "component#1/provided#0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceId {
    component: ComponentId,
    slot: u32,
}

impl InterfaceId {
    /// Creates an interface address.
    #[must_use]
    pub const fn new(component: ComponentId, slot: u32) -> Self {
        Self { component, slot }
    }

    /// Returns the owning component.
    #[must_use]
    pub const fn component(self) -> ComponentId {
        self.component
    }

    /// Returns the slot within the owning component.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/provided#{}", self.component, self.slot)
    }
}

/// Identity handed to a remote peer when it registers with a proxy server.
///
/// Random (UUID v4) so that ids from different server runs never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Creates a fresh random client id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client:{}", self.0)
    }
}
