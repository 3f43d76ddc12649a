//! Change sets handed to the config generator

use serde::Serialize;

use crate::resource::{Resource, ResourceId, RoutingResource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ChangeOp {
    AddOrUpdate,
    Delete,
}

/// One instruction for the config generator
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceChange {
    pub op: ChangeOp,
    pub resource: Resource,
    /// Validation error that caused a `Delete`
    pub error: Option<String>,
}

impl ResourceChange {
    pub fn add_or_update(resource: Resource) -> Self {
        Self {
            op: ChangeOp::AddOrUpdate,
            resource,
            error: None,
        }
    }

    pub fn delete(resource: Resource, error: Option<String>) -> Self {
        Self {
            op: ChangeOp::Delete,
            resource,
            error,
        }
    }
}

/// Collects change events of one mutation and squashes them per resource.
///
/// The last event for an identity wins. Deletes are emitted before
/// updates so the generator never sees two owners of one slot; within each
/// group identities keep the order of their first event.
#[derive(Debug, Default)]
pub struct ChangeSetBuilder {
    events: Vec<ResourceChange>,
}

impl ChangeSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: ResourceChange) {
        self.events.push(change);
    }

    pub fn add_or_update(&mut self, resource: Resource) {
        self.push(ResourceChange::add_or_update(resource));
    }

    pub fn delete(&mut self, resource: Resource, error: Option<String>) {
        self.push(ResourceChange::delete(resource, error));
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn build(self) -> Vec<ResourceChange> {
        let mut order: Vec<ResourceId> = Vec::new();
        let mut latest: Vec<ResourceChange> = Vec::new();

        for event in self.events {
            let id = event.resource.id();
            match order.iter().position(|seen| *seen == id) {
                Some(i) => latest[i] = event,
                None => {
                    order.push(id);
                    latest.push(event);
                }
            }
        }

        let (deletes, updates): (Vec<_>, Vec<_>) = latest
            .into_iter()
            .partition(|change| change.op == ChangeOp::Delete);

        deletes.into_iter().chain(updates).collect()
    }
}

/// Squashes an existing change list
pub fn squash(changes: Vec<ResourceChange>) -> Vec<ResourceChange> {
    let mut builder = ChangeSetBuilder::new();
    for change in changes {
        builder.push(change);
    }
    builder.build()
}
