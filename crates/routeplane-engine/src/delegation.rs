//! Parent/delegate resolution
//!
//! VirtualServers delegate path prefixes to VirtualServerRoutes by name or by
//! label selector; master Ingresses collect the minions that share their host.
//! Parents only store the identities of their delegates, all lookups go
//! through the maps passed in, so there are no back-pointers to maintain.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use k8s_openapi::api::networking::v1::Ingress;
use routeplane_common::{FieldError, FieldErrors, FieldPath};
use tracing::debug;

use crate::conflict::compare_age;
use crate::crd::{VirtualServer, VirtualServerRoute};
use crate::ingress;
use crate::resource::{MinionConfiguration, ObjectKey};
use crate::validation::ResourceValidator;

/// Delegates attached to one VirtualServer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Delegation {
    pub routes: Vec<Arc<VirtualServerRoute>>,
    pub selectors: BTreeMap<String, Vec<String>>,
    pub warnings: Vec<String>,
}

impl Delegation {
    pub fn attached_keys(&self) -> impl Iterator<Item = ObjectKey> + '_ {
        self.routes.iter().map(|vsr| ObjectKey::from_meta(&vsr.metadata))
    }
}

struct DelegationState<'a> {
    vs: &'a VirtualServer,
    validator: &'a dyn ResourceValidator,
    attached: BTreeSet<ObjectKey>,
    taken_paths: BTreeSet<String>,
    result: Delegation,
}

impl DelegationState<'_> {
    /// Attaches `vsr` under `prefix`; returns false when it was refused
    fn try_attach(&mut self, key: &ObjectKey, vsr: &Arc<VirtualServerRoute>, prefix: &str) -> bool {
        if let Err(e) = self.check(vsr, prefix) {
            debug!(virtual_server_route = %key, error = %e, "Delegate refused");
            self.result
                .warnings
                .push(format!("VirtualServerRoute {} is invalid: {}", key, e));
            return false;
        }

        self.taken_paths
            .extend(vsr.spec.subroutes.iter().map(|s| s.path.clone()));
        self.attached.insert(key.clone());
        self.result.routes.push(vsr.clone());
        true
    }

    fn check(&self, vsr: &VirtualServerRoute, prefix: &str) -> Result<(), FieldErrors> {
        self.validator
            .validate_virtual_server_route_for_parent(vsr, &self.vs.spec.host, prefix)?;

        let subroutes_path = FieldPath::new("spec").child("subroutes");
        let mut errors = FieldErrors::new();
        for (i, subroute) in vsr.spec.subroutes.iter().enumerate() {
            if self.taken_paths.contains(&subroute.path) {
                errors.push(FieldError::duplicate(
                    &subroutes_path.index(i).child("path"),
                    subroute.path.as_str(),
                ));
            }
        }
        errors.into_result()
    }
}

/// Attaches VirtualServerRoutes to `vs` following its routes in declaration order.
///
/// `delegates` holds the VirtualServerRoutes that passed standalone validation.
/// A delegate is attached at most once; the first route naming or selecting it wins.
pub fn attach_virtual_server_routes(
    vs: &VirtualServer,
    delegates: &BTreeMap<ObjectKey, Arc<VirtualServerRoute>>,
    validator: &dyn ResourceValidator,
) -> Delegation {
    let namespace = vs.metadata.namespace.clone().unwrap_or_default();
    let mut state = DelegationState {
        vs,
        validator,
        attached: BTreeSet::new(),
        taken_paths: BTreeSet::new(),
        result: Delegation::default(),
    };

    for route in &vs.spec.routes {
        if let Some(reference) = &route.route {
            let key = ObjectKey::resolve(reference, &namespace);
            if state.attached.contains(&key) {
                continue;
            }
            match delegates.get(&key) {
                Some(vsr) => {
                    state.try_attach(&key, vsr, &route.path);
                }
                None => state
                    .result
                    .warnings
                    .push(format!("VirtualServerRoute {} doesn't exist or invalid", key)),
            }
        } else if let Some(selector) = &route.route_selector {
            let mut selected = Vec::new();
            // BTreeMap iteration keeps selector matches in namespace/name order
            for (key, vsr) in delegates {
                if !selector.matches(vsr.metadata.labels.as_ref()) || state.attached.contains(key) {
                    continue;
                }
                if state.try_attach(key, vsr, &route.path) {
                    selected.push(key.to_string());
                }
            }
            state
                .result
                .selectors
                .insert(selector.selector_string(), selected);
        }
    }

    state.result
}

/// Minions of one master with their warnings
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MinionGroup {
    pub minions: Vec<MinionConfiguration>,
    /// Keyed by minion `namespace/name`
    pub child_warnings: BTreeMap<String, Vec<String>>,
}

/// Orders `minions` oldest first and hands out paths; a path already served by
/// an older minion is dropped from the younger one with a warning.
pub fn attach_minions(minions: &[Arc<Ingress>]) -> MinionGroup {
    let mut ordered: Vec<&Arc<Ingress>> = minions.iter().collect();
    ordered.sort_by(|a, b| compare_age(&a.metadata, &b.metadata));

    let mut taken = BTreeSet::new();
    let mut group = MinionGroup::default();

    for minion in ordered {
        let key = ObjectKey::from_meta(&minion.metadata).to_string();
        let mut valid_paths = BTreeSet::new();

        for path in ingress::paths(minion) {
            if taken.insert(path.clone()) {
                valid_paths.insert(path);
            } else if !valid_paths.contains(&path) {
                group
                    .child_warnings
                    .entry(key.clone())
                    .or_default()
                    .push(format!("path {} is taken by another resource", path));
            }
        }

        group.minions.push(MinionConfiguration {
            ingress: minion.clone(),
            valid_paths,
        });
    }

    group
}
