//! Slot conflict resolution
//!
//! When two resources claim one slot, the winner is decided by:
//!   1. class rank: HTTP routers (Ingress, VirtualServer) outrank TransportServers
//!   2. age: the older creation timestamp wins, a missing timestamp counts as youngest
//!   3. UID: the lower UID wins
//!   4. `namespace/name` and kind, so the order is total
//!
//! The order does not depend on the order in which resources were added.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use crate::model::{ResourceModel, Slot};
use crate::resource::{ObjectKey, Resource, ResourceId, RoutingResource};

/// Outcome of a claim on a slot
#[derive(Debug, PartialEq)]
pub enum Resolution {
    /// The slot was free or already held by the candidate
    Accepted,
    /// The candidate took the slot from `previous`. `displaced` carries the
    /// previous owner's final snapshot when it lost its last slot.
    Evicted {
        previous: ResourceId,
        displaced: Option<Resource>,
    },
    /// `owner` keeps the slot
    Rejected { owner: ResourceId },
}

fn class_rank(resource: &Resource) -> u8 {
    match resource {
        Resource::Ingress(_) | Resource::VirtualServer(_) => 1,
        Resource::TransportServer(_) => 0,
    }
}

fn created_at(meta: &ObjectMeta) -> Option<DateTime<Utc>> {
    meta.creation_timestamp.as_ref().map(|t| t.0)
}

/// `Some` sorts before `None`
fn some_first<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Orders objects oldest first, then by UID, then by `namespace/name`
pub fn compare_age(a: &ObjectMeta, b: &ObjectMeta) -> Ordering {
    some_first(created_at(a), created_at(b))
        .then_with(|| some_first(a.uid.as_deref(), b.uid.as_deref()))
        .then_with(|| ObjectKey::from_meta(a).cmp(&ObjectKey::from_meta(b)))
}

/// Orders two claimants of a slot; `Less` means `a` wins
pub fn compare_claims(a: &Resource, b: &Resource) -> Ordering {
    class_rank(b)
        .cmp(&class_rank(a))
        .then_with(|| compare_age(a.meta(), b.meta()))
        .then_with(|| a.kind().cmp(&b.kind()))
}

/// Whether `a` takes a contested slot from `b`
pub fn outranks(a: &Resource, b: &Resource) -> bool {
    compare_claims(a, b) == Ordering::Less
}

/// Warning attached to a resource that lost `slot`
pub fn taken_warning(slot: &Slot) -> String {
    match slot {
        Slot::Host(host) => format!("host {} is taken by another resource", host),
        Slot::Listener(key) => format!(
            "listener {} with host {} is taken by another resource",
            key.listener,
            key.host_display()
        ),
    }
}

fn release(resource: &mut Resource, slot: &Slot) {
    if let Slot::Host(host) = slot {
        resource.release_host(host);
    }
    resource.add_warning(taken_warning(slot));
}

/// Decides whether `candidate` may claim `slot`.
///
/// A weaker owner is evicted from the slot and marked as having lost it. A
/// rejected candidate is marked the same way. The slot is not installed here;
/// accepted candidates are stored with [`ResourceModel::put`] once all their
/// slots are resolved.
pub fn resolve(model: &mut ResourceModel, slot: &Slot, candidate: &mut Resource) -> Resolution {
    let Some(owner) = model.lookup(slot) else {
        return Resolution::Accepted;
    };

    if owner.is_same(candidate) {
        return Resolution::Accepted;
    }

    let owner_id = owner.id();
    if !candidate.wins(owner) {
        debug!(slot = %slot, owner = %owner_id, candidate = %candidate.id(), "Slot claim rejected");
        release(candidate, slot);
        return Resolution::Rejected { owner: owner_id };
    }

    debug!(slot = %slot, previous = %owner_id, candidate = %candidate.id(), "Evicting slot owner");
    let removed = model.remove(slot);
    let displaced = match model.get_mut(&owner_id) {
        Some(stored) => {
            release(stored, slot);
            None
        }
        None => removed.map(|mut r| {
            release(&mut r, slot);
            r
        }),
    };

    Resolution::Evicted {
        previous: owner_id,
        displaced,
    }
}
