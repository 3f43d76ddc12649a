//! Routing resources tracked by the engine
//!
//! A [`Resource`] is the engine's view of one routing object: the object
//! itself plus everything computed while placing it (valid hosts, attached
//! delegates, resolved listener ports, warnings). Snapshots are replaced
//! wholesale on every rebuild; nothing here is mutated across mutations.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;

use crate::crd::{TransportServer, VirtualServer, VirtualServerRoute};
use crate::ingress;

/// `namespace/name` of an object
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_meta(meta: &ObjectMeta) -> Self {
        Self {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    /// Resolves `name` or `namespace/name` relative to `namespace`
    pub fn resolve(reference: &str, namespace: &str) -> Self {
        match reference.split_once('/') {
            Some((ns, name)) => Self::new(ns, name),
            None => Self::new(namespace, reference),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResourceKind {
    Ingress,
    VirtualServer,
    VirtualServerRoute,
    TransportServer,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Ingress => "Ingress",
            ResourceKind::VirtualServer => "VirtualServer",
            ResourceKind::VirtualServerRoute => "VirtualServerRoute",
            ResourceKind::TransportServer => "TransportServer",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a resource. Orders by key first so listings read `namespace/name` sorted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ResourceId {
    pub key: ObjectKey,
    pub kind: ResourceKind,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, key: ObjectKey) -> Self {
        Self { key, kind }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// A watched object as handed to the engine
#[derive(Clone, Debug, PartialEq)]
pub enum KubeObject {
    Ingress(Arc<Ingress>),
    VirtualServer(Arc<VirtualServer>),
    VirtualServerRoute(Arc<VirtualServerRoute>),
    TransportServer(Arc<TransportServer>),
}

impl KubeObject {
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            KubeObject::Ingress(o) => &o.metadata,
            KubeObject::VirtualServer(o) => &o.metadata,
            KubeObject::VirtualServerRoute(o) => &o.metadata,
            KubeObject::TransportServer(o) => &o.metadata,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            KubeObject::Ingress(_) => ResourceKind::Ingress,
            KubeObject::VirtualServer(_) => ResourceKind::VirtualServer,
            KubeObject::VirtualServerRoute(_) => ResourceKind::VirtualServerRoute,
            KubeObject::TransportServer(_) => ResourceKind::TransportServer,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::from_meta(self.meta())
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.key())
    }
}

/// Capability shared by every resource variant
pub trait RoutingResource {
    fn meta(&self) -> &ObjectMeta;

    fn kind(&self) -> ResourceKind;

    fn key(&self) -> ObjectKey {
        ObjectKey::from_meta(self.meta())
    }

    fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.key())
    }

    fn warnings(&self) -> &[String];

    fn add_warning(&mut self, warning: String);

    /// Marks `host` as served by this resource
    fn acquire_host(&mut self, _host: &str) {}

    /// Marks `host` as lost to another resource
    fn release_host(&mut self, _host: &str) {}
}

/// Generation, annotations and spec equal; ignores status and bookkeeping fields
fn same_object<S: PartialEq>(a_meta: &ObjectMeta, a_spec: &S, b_meta: &ObjectMeta, b_spec: &S) -> bool {
    a_meta.generation == b_meta.generation
        && a_meta.annotations == b_meta.annotations
        && a_meta.labels == b_meta.labels
        && a_spec == b_spec
}

/// A minion attached to a master Ingress
#[derive(Clone, Debug, PartialEq)]
pub struct MinionConfiguration {
    pub ingress: Arc<Ingress>,
    /// Paths this minion serves; paths taken by an older minion are absent
    pub valid_paths: BTreeSet<String>,
}

impl MinionConfiguration {
    fn is_equal(&self, other: &MinionConfiguration) -> bool {
        same_object(
            &self.ingress.metadata,
            &self.ingress.spec,
            &other.ingress.metadata,
            &other.ingress.spec,
        ) && self.valid_paths == other.valid_paths
    }
}

/// A regular or master Ingress
#[derive(Clone, Debug, PartialEq)]
pub struct IngressConfiguration {
    pub ingress: Arc<Ingress>,
    pub is_master: bool,
    pub minions: Vec<MinionConfiguration>,
    /// Every host of the Ingress; `false` when another resource holds it
    pub valid_hosts: BTreeMap<String, bool>,
    pub warnings: Vec<String>,
    /// Warnings about minions, keyed by minion `namespace/name`
    pub child_warnings: BTreeMap<String, Vec<String>>,
}

impl IngressConfiguration {
    pub fn regular(ingress: Arc<Ingress>) -> Self {
        let valid_hosts = ingress::hosts(&ingress)
            .into_iter()
            .map(|h| (h, true))
            .collect();
        Self {
            ingress,
            is_master: false,
            minions: Vec::new(),
            valid_hosts,
            warnings: Vec::new(),
            child_warnings: BTreeMap::new(),
        }
    }

    pub fn master(
        ingress: Arc<Ingress>,
        minions: Vec<MinionConfiguration>,
        child_warnings: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            is_master: true,
            minions,
            child_warnings,
            ..Self::regular(ingress)
        }
    }

    /// Hosts this Ingress claims, sorted
    pub fn hosts(&self) -> Vec<String> {
        self.valid_hosts.keys().cloned().collect()
    }

    pub fn is_equal(&self, other: &IngressConfiguration) -> bool {
        same_object(
            &self.ingress.metadata,
            &self.ingress.spec,
            &other.ingress.metadata,
            &other.ingress.spec,
        ) && self.is_master == other.is_master
            && self.valid_hosts == other.valid_hosts
            && self.minions.len() == other.minions.len()
            && self
                .minions
                .iter()
                .zip(&other.minions)
                .all(|(a, b)| a.is_equal(b))
            && self.warnings == other.warnings
            && self.child_warnings == other.child_warnings
    }
}

impl RoutingResource for IngressConfiguration {
    fn meta(&self) -> &ObjectMeta {
        &self.ingress.metadata
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Ingress
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    fn acquire_host(&mut self, host: &str) {
        self.valid_hosts.insert(host.to_string(), true);
    }

    fn release_host(&mut self, host: &str) {
        self.valid_hosts.insert(host.to_string(), false);
    }
}

/// A VirtualServer with its attached VirtualServerRoutes and resolved listeners
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualServerConfiguration {
    pub virtual_server: Arc<VirtualServer>,
    /// Attached delegates in route declaration order
    pub virtual_server_routes: Vec<Arc<VirtualServerRoute>>,
    /// Delegates attached through each selector, keyed by `k=v` selector string
    pub virtual_server_route_selectors: BTreeMap<String, Vec<String>>,
    /// Custom HTTP listener port; `None` uses the default listener
    pub http_port: Option<u16>,
    pub https_port: Option<u16>,
    pub warnings: Vec<String>,
}

impl VirtualServerConfiguration {
    pub fn new(virtual_server: Arc<VirtualServer>) -> Self {
        Self {
            virtual_server,
            virtual_server_routes: Vec::new(),
            virtual_server_route_selectors: BTreeMap::new(),
            http_port: None,
            https_port: None,
            warnings: Vec::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.virtual_server.spec.host
    }

    pub fn is_equal(&self, other: &VirtualServerConfiguration) -> bool {
        let vs_equal = same_object(
            &self.virtual_server.metadata,
            &self.virtual_server.spec,
            &other.virtual_server.metadata,
            &other.virtual_server.spec,
        );
        let routes_equal = self.virtual_server_routes.len() == other.virtual_server_routes.len()
            && self
                .virtual_server_routes
                .iter()
                .zip(&other.virtual_server_routes)
                .all(|(a, b)| {
                    ObjectKey::from_meta(&a.metadata) == ObjectKey::from_meta(&b.metadata)
                        && same_object(&a.metadata, &a.spec, &b.metadata, &b.spec)
                });

        vs_equal
            && routes_equal
            && self.virtual_server_route_selectors == other.virtual_server_route_selectors
            && self.http_port == other.http_port
            && self.https_port == other.https_port
            && self.warnings == other.warnings
    }
}

impl RoutingResource for VirtualServerConfiguration {
    fn meta(&self) -> &ObjectMeta {
        &self.virtual_server.metadata
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::VirtualServer
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

/// A TransportServer bound to a listener (or to a host, for TLS passthrough)
#[derive(Clone, Debug, PartialEq)]
pub struct TransportServerConfiguration {
    pub transport_server: Arc<TransportServer>,
    /// Resolved listener port; `None` for TLS passthrough
    pub listener_port: Option<u16>,
    pub warnings: Vec<String>,
}

impl TransportServerConfiguration {
    pub fn new(transport_server: Arc<TransportServer>, listener_port: Option<u16>) -> Self {
        Self {
            transport_server,
            listener_port,
            warnings: Vec::new(),
        }
    }

    pub fn is_equal(&self, other: &TransportServerConfiguration) -> bool {
        same_object(
            &self.transport_server.metadata,
            &self.transport_server.spec,
            &other.transport_server.metadata,
            &other.transport_server.spec,
        ) && self.listener_port == other.listener_port
            && self.warnings == other.warnings
    }
}

impl RoutingResource for TransportServerConfiguration {
    fn meta(&self) -> &ObjectMeta {
        &self.transport_server.metadata
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::TransportServer
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

/// Closed set of resources that can own a slot
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Ingress(IngressConfiguration),
    VirtualServer(VirtualServerConfiguration),
    TransportServer(TransportServerConfiguration),
}

impl Resource {
    fn inner(&self) -> &dyn RoutingResource {
        match self {
            Resource::Ingress(r) => r,
            Resource::VirtualServer(r) => r,
            Resource::TransportServer(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn RoutingResource {
        match self {
            Resource::Ingress(r) => r,
            Resource::VirtualServer(r) => r,
            Resource::TransportServer(r) => r,
        }
    }

    /// Same kind and key
    pub fn is_same(&self, other: &Resource) -> bool {
        self.id() == other.id()
    }

    /// Deep comparison of everything the config generator consumes
    pub fn is_equal(&self, other: &Resource) -> bool {
        match (self, other) {
            (Resource::Ingress(a), Resource::Ingress(b)) => a.is_equal(b),
            (Resource::VirtualServer(a), Resource::VirtualServer(b)) => a.is_equal(b),
            (Resource::TransportServer(a), Resource::TransportServer(b)) => a.is_equal(b),
            _ => false,
        }
    }

    /// Whether this resource takes a contested slot from `other`
    pub fn wins(&self, other: &Resource) -> bool {
        crate::conflict::outranks(self, other)
    }

    /// The watched object behind this resource
    pub fn object(&self) -> KubeObject {
        match self {
            Resource::Ingress(r) => KubeObject::Ingress(r.ingress.clone()),
            Resource::VirtualServer(r) => KubeObject::VirtualServer(r.virtual_server.clone()),
            Resource::TransportServer(r) => KubeObject::TransportServer(r.transport_server.clone()),
        }
    }
}

impl RoutingResource for Resource {
    fn meta(&self) -> &ObjectMeta {
        self.inner().meta()
    }

    fn kind(&self) -> ResourceKind {
        self.inner().kind()
    }

    fn warnings(&self) -> &[String] {
        self.inner().warnings()
    }

    fn add_warning(&mut self, warning: String) {
        self.inner_mut().add_warning(warning);
    }

    fn acquire_host(&mut self, host: &str) {
        self.inner_mut().acquire_host(host);
    }

    fn release_host(&mut self, host: &str) {
        self.inner_mut().release_host(host);
    }
}
