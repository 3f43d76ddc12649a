//! In-memory ownership model: which resource owns which routing slot
//!
//! Resources live in an arena keyed by [`ResourceId`]; slot indices only
//! hold identities, never snapshots, so a resource is stored exactly once.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::references::ReferenceChecker;
use crate::resource::{Resource, ResourceId, RoutingResource};

/// A `(listener, host)` pair; an empty host is its own claim on the listener
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerHostKey {
    pub listener: String,
    pub host: String,
}

impl ListenerHostKey {
    pub fn new(listener: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            host: host.into(),
        }
    }

    /// Host as shown in messages
    pub fn host_display(&self) -> &str {
        if self.host.is_empty() {
            "empty host"
        } else {
            &self.host
        }
    }
}

impl fmt::Display for ListenerHostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener {} with host {}", self.listener, self.host_display())
    }
}

/// Something resources compete for
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    Host(String),
    Listener(ListenerHostKey),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Host(host) => write!(f, "host {}", host),
            Slot::Listener(key) => write!(f, "{}", key),
        }
    }
}

/// Slot ownership plus the arena of owning resources
#[derive(Clone, Debug, Default)]
pub struct ResourceModel {
    resources: BTreeMap<ResourceId, Resource>,
    hosts: BTreeMap<String, ResourceId>,
    listener_hosts: BTreeMap<ListenerHostKey, ResourceId>,
    /// Reverse index of the two slot maps
    owned: BTreeMap<ResourceId, BTreeSet<Slot>>,
}

impl ResourceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `resource` as the owner of `slot`, replacing its stored snapshot.
    ///
    /// Returns the previous owner when it was a different resource. The previous
    /// owner stays in the arena while it still owns other slots.
    pub fn put(&mut self, slot: Slot, resource: Resource) -> Option<Resource> {
        let id = resource.id();
        let previous = match &slot {
            Slot::Host(host) => self.hosts.insert(host.clone(), id.clone()),
            Slot::Listener(key) => self.listener_hosts.insert(key.clone(), id.clone()),
        };
        self.resources.insert(id.clone(), resource);
        self.owned.entry(id.clone()).or_default().insert(slot.clone());

        let previous = previous.filter(|p| *p != id)?;
        self.release(&previous, &slot)
    }

    /// Frees `slot`. The owner is dropped from the arena once it owns nothing else.
    pub fn remove(&mut self, slot: &Slot) -> Option<Resource> {
        let owner = match slot {
            Slot::Host(host) => self.hosts.remove(host),
            Slot::Listener(key) => self.listener_hosts.remove(key),
        }?;

        self.release(&owner, slot)
    }

    pub fn lookup(&self, slot: &Slot) -> Option<&Resource> {
        let owner = match slot {
            Slot::Host(host) => self.hosts.get(host),
            Slot::Listener(key) => self.listener_hosts.get(key),
        }?;
        self.resources.get(owner)
    }

    pub fn owner(&self, slot: &Slot) -> Option<&ResourceId> {
        match slot {
            Slot::Host(host) => self.hosts.get(host),
            Slot::Listener(key) => self.listener_hosts.get(key),
        }
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn get_mut(&mut self, id: &ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Replaces the snapshot of a resource that already owns slots
    pub fn refresh(&mut self, resource: Resource) {
        if let Some(stored) = self.resources.get_mut(&resource.id()) {
            *stored = resource;
        }
    }

    /// Owning resources, ordered by `namespace/name` then kind
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// All occupied slots: host slots first, then listener slots, each sorted
    pub fn slots(&self) -> impl Iterator<Item = (Slot, &ResourceId)> {
        self.hosts
            .iter()
            .map(|(host, id)| (Slot::Host(host.clone()), id))
            .chain(
                self.listener_hosts
                    .iter()
                    .map(|(key, id)| (Slot::Listener(key.clone()), id)),
            )
    }

    /// Slots owned by `id`, in [`ResourceModel::slots`] order
    pub fn slots_of(&self, id: &ResourceId) -> Vec<Slot> {
        self.owned
            .get(id)
            .map(|slots| slots.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Resources that reference `namespace/name` according to `checker`
    pub fn resources_referencing(
        &self,
        checker: &dyn ReferenceChecker,
        namespace: &str,
        name: &str,
    ) -> Vec<Resource> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();

        for (_, id) in self.slots() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(resource) = self.resources.get(id) else {
                continue;
            };
            if checker.references(resource, namespace, name) {
                result.push(resource.clone());
            }
        }

        result
    }

    /// Drops `slot` from `owner`'s index entry; the owner leaves the arena
    /// with its last slot
    fn release(&mut self, owner: &ResourceId, slot: &Slot) -> Option<Resource> {
        let remaining = match self.owned.get_mut(owner) {
            Some(slots) => {
                slots.remove(slot);
                slots.len()
            }
            None => 0,
        };

        if remaining > 0 {
            self.resources.get(owner).cloned()
        } else {
            self.owned.remove(owner);
            self.resources.remove(owner)
        }
    }
}
