//! The `Configuration` facade
//!
//! Every mutation stores (or forgets) the object and recomputes the whole
//! ownership model from the stored objects. The new model is compared with the
//! previous one to produce the change set, and the recomputed problems are
//! passed through the [`ProblemReporter`] so only new diagnostics surface.
//!
//! Build order is fixed: Ingresses, then VirtualServers (with their delegates
//! and listeners), then TLS passthrough TransportServers, then listener-bound
//! TransportServers, each kind in `namespace/name` order. Conflict resolution
//! does not depend on that order, only on [`crate::conflict::compare_claims`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use k8s_openapi::api::networking::v1::Ingress;
use routeplane_common::FieldErrors;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::changes::{ChangeSetBuilder, ResourceChange};
use crate::config::EngineConfig;
use crate::conflict::{self, Resolution};
use crate::crd::{GlobalConfiguration, TransportServer, VirtualServer, VirtualServerRoute};
use crate::delegation;
use crate::error::ConfigurationError;
use crate::ingress;
use crate::listeners::{
    ListenerRegistry, ListenerValidator, PROTOCOL_HTTP, PROTOCOL_TCP, PROTOCOL_UDP,
};
use crate::model::{ListenerHostKey, ResourceModel, Slot};
use crate::problems::{ConfigurationProblem, ProblemReason, ProblemReporter, ProblemSeverity};
use crate::references::{
    PolicyReferenceChecker, ReferenceChecker, SecretReferenceChecker, ServiceReferenceChecker,
};
use crate::resource::{
    IngressConfiguration, KubeObject, ObjectKey, Resource, ResourceId, RoutingResource,
    TransportServerConfiguration, VirtualServerConfiguration,
};
use crate::validation::{DefaultValidator, ResourceValidator};

/// Changes for the config generator and problems for the status layer
pub type MutationResult = (Vec<ResourceChange>, Vec<ConfigurationProblem>);

/// Which kinds [`Configuration::get_resources_with_filter`] returns
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub ingresses: bool,
    pub virtual_servers: bool,
    pub transport_servers: bool,
}

impl ResourceFilter {
    pub fn all() -> Self {
        Self {
            ingresses: true,
            virtual_servers: true,
            transport_servers: true,
        }
    }

    fn matches(&self, resource: &Resource) -> bool {
        match resource {
            Resource::Ingress(_) => self.ingresses,
            Resource::VirtualServer(_) => self.virtual_servers,
            Resource::TransportServer(_) => self.transport_servers,
        }
    }
}

/// Counts of TransportServers currently owning a slot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransportServerMetrics {
    pub total_tls_passthrough: usize,
    pub total_tcp: usize,
    pub total_udp: usize,
}

/// Result of one full recomputation
#[derive(Default)]
struct Build {
    model: ResourceModel,
    /// Built resources that ended up without any slot, with their final warnings
    slotless: BTreeMap<ResourceId, Resource>,
    /// Validation errors of rejected objects
    errors: BTreeMap<ResourceId, String>,
    problems: BTreeMap<ResourceId, ConfigurationProblem>,
}

impl Build {
    /// Claims `slots` for `resource`; it is stored only if it wins at least one
    fn claim(&mut self, mut resource: Resource, slots: Vec<Slot>) {
        let mut won = Vec::new();

        for slot in slots {
            match conflict::resolve(&mut self.model, &slot, &mut resource) {
                Resolution::Accepted => won.push(slot),
                Resolution::Evicted { displaced, .. } => {
                    if let Some(displaced) = displaced {
                        self.slotless.insert(displaced.id(), displaced);
                    }
                    won.push(slot);
                }
                Resolution::Rejected { .. } => {}
            }
        }

        if won.is_empty() {
            self.slotless.insert(resource.id(), resource);
            return;
        }
        for slot in won {
            self.model.put(slot, resource.clone());
        }
    }

    fn problem(&mut self, object: KubeObject, severity: ProblemSeverity, reason: ProblemReason, message: String) {
        self.problems
            .insert(object.id(), ConfigurationProblem::new(object, severity, reason, message));
    }

    fn reject(&mut self, object: KubeObject, error: &FieldErrors, message: String) {
        self.errors.insert(object.id(), error.to_string());
        self.problem(object, ProblemSeverity::Error, ProblemReason::Rejected, message);
    }
}

/// Reconciliation engine facade. Callers serialize access; every method runs
/// to completion without I/O.
pub struct Configuration {
    config: EngineConfig,
    validator: Box<dyn ResourceValidator + Send + Sync>,
    listener_validator: ListenerValidator,

    ingresses: BTreeMap<ObjectKey, Arc<Ingress>>,
    virtual_servers: BTreeMap<ObjectKey, Arc<VirtualServer>>,
    virtual_server_routes: BTreeMap<ObjectKey, Arc<VirtualServerRoute>>,
    transport_servers: BTreeMap<ObjectKey, Arc<TransportServer>>,
    global_configuration: Option<Arc<GlobalConfiguration>>,
    listeners: ListenerRegistry,

    model: ResourceModel,
    problems: ProblemReporter,
}

impl Configuration {
    pub fn new(config: EngineConfig) -> Self {
        let validator = Box::new(DefaultValidator::new(&config));
        Self::with_validator(config, validator)
    }

    pub fn with_validator(config: EngineConfig, validator: Box<dyn ResourceValidator + Send + Sync>) -> Self {
        let listener_validator = ListenerValidator::new(&config.forbidden_listener_ports);
        Self {
            config,
            validator,
            listener_validator,
            ingresses: BTreeMap::new(),
            virtual_servers: BTreeMap::new(),
            virtual_server_routes: BTreeMap::new(),
            transport_servers: BTreeMap::new(),
            global_configuration: None,
            listeners: ListenerRegistry::empty(),
            model: ResourceModel::new(),
            problems: ProblemReporter::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn has_correct_class(&self, class: Option<&str>) -> bool {
        class.map_or(true, |c| c.is_empty() || c == self.config.ingress_class)
    }

    #[instrument(skip(self, ing), fields(
        namespace = %ing.metadata.namespace.as_deref().unwrap_or_default(),
        name = %ing.metadata.name.as_deref().unwrap_or_default(),
    ))]
    pub fn add_or_update_ingress(&mut self, ing: Arc<Ingress>) -> MutationResult {
        let key = ObjectKey::from_meta(&ing.metadata);
        if self.has_correct_class(ingress::ingress_class(&ing)) {
            self.ingresses.insert(key, ing);
        } else {
            debug!("Ingress class does not match, dropping");
            self.ingresses.remove(&key);
        }
        self.rebuild()
    }

    #[instrument(skip_all, fields(key = %key))]
    pub fn delete_ingress(&mut self, key: &ObjectKey) -> MutationResult {
        self.ingresses.remove(key);
        self.rebuild()
    }

    #[instrument(skip(self, vs), fields(
        namespace = %vs.metadata.namespace.as_deref().unwrap_or_default(),
        name = %vs.metadata.name.as_deref().unwrap_or_default(),
    ))]
    pub fn add_or_update_virtual_server(&mut self, vs: Arc<VirtualServer>) -> MutationResult {
        let key = ObjectKey::from_meta(&vs.metadata);
        if self.has_correct_class(vs.spec.ingress_class_name.as_deref()) {
            self.virtual_servers.insert(key, vs);
        } else {
            debug!("VirtualServer class does not match, dropping");
            self.virtual_servers.remove(&key);
        }
        self.rebuild()
    }

    #[instrument(skip_all, fields(key = %key))]
    pub fn delete_virtual_server(&mut self, key: &ObjectKey) -> MutationResult {
        self.virtual_servers.remove(key);
        self.rebuild()
    }

    #[instrument(skip(self, vsr), fields(
        namespace = %vsr.metadata.namespace.as_deref().unwrap_or_default(),
        name = %vsr.metadata.name.as_deref().unwrap_or_default(),
    ))]
    pub fn add_or_update_virtual_server_route(&mut self, vsr: Arc<VirtualServerRoute>) -> MutationResult {
        let key = ObjectKey::from_meta(&vsr.metadata);
        if self.has_correct_class(vsr.spec.ingress_class_name.as_deref()) {
            self.virtual_server_routes.insert(key, vsr);
        } else {
            debug!("VirtualServerRoute class does not match, dropping");
            self.virtual_server_routes.remove(&key);
        }
        self.rebuild()
    }

    #[instrument(skip_all, fields(key = %key))]
    pub fn delete_virtual_server_route(&mut self, key: &ObjectKey) -> MutationResult {
        self.virtual_server_routes.remove(key);
        self.rebuild()
    }

    #[instrument(skip(self, ts), fields(
        namespace = %ts.metadata.namespace.as_deref().unwrap_or_default(),
        name = %ts.metadata.name.as_deref().unwrap_or_default(),
    ))]
    pub fn add_or_update_transport_server(&mut self, ts: Arc<TransportServer>) -> MutationResult {
        let key = ObjectKey::from_meta(&ts.metadata);
        if self.has_correct_class(ts.spec.ingress_class_name.as_deref()) {
            self.transport_servers.insert(key, ts);
        } else {
            debug!("TransportServer class does not match, dropping");
            self.transport_servers.remove(&key);
        }
        self.rebuild()
    }

    #[instrument(skip_all, fields(key = %key))]
    pub fn delete_transport_server(&mut self, key: &ObjectKey) -> MutationResult {
        self.transport_servers.remove(key);
        self.rebuild()
    }

    /// Replaces the listener registry and re-resolves every listener reference.
    ///
    /// Invalid listeners are dropped and reported in the returned error; the
    /// valid ones take effect regardless.
    #[instrument(skip(self, gc), fields(
        namespace = %gc.metadata.namespace.as_deref().unwrap_or_default(),
        name = %gc.metadata.name.as_deref().unwrap_or_default(),
    ))]
    pub fn add_or_update_global_configuration(
        &mut self,
        gc: Arc<GlobalConfiguration>,
    ) -> (Vec<ResourceChange>, Vec<ConfigurationProblem>, Result<(), ConfigurationError>) {
        let (validated, errors) = self.listener_validator.validate(&gc);
        if !errors.is_empty() {
            debug!(error = %errors, "Dropping invalid listeners");
        }

        self.listeners = ListenerRegistry::from_listeners(&validated.spec.listeners);
        self.global_configuration = Some(Arc::new(validated));

        let (changes, problems) = self.rebuild();
        let result = errors.into_result().map_err(ConfigurationError::InvalidListeners);
        (changes, problems, result)
    }

    #[instrument(skip_all)]
    pub fn delete_global_configuration(&mut self) -> MutationResult {
        self.global_configuration = None;
        self.listeners = ListenerRegistry::empty();
        self.rebuild()
    }

    /// Stored GlobalConfiguration, reduced to its valid listeners
    pub fn get_global_configuration(&self) -> Option<Arc<GlobalConfiguration>> {
        self.global_configuration.clone()
    }

    /// Resources owning at least one slot, ordered by `namespace/name` then kind
    pub fn get_resources(&self) -> Vec<Resource> {
        self.get_resources_with_filter(ResourceFilter::all())
    }

    pub fn get_resources_with_filter(&self, filter: ResourceFilter) -> Vec<Resource> {
        self.model
            .resources()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    pub fn get_transport_server_metrics(&self) -> TransportServerMetrics {
        let mut metrics = TransportServerMetrics::default();

        for resource in self.model.resources() {
            let Resource::TransportServer(cfg) = resource else {
                continue;
            };
            let ts = &cfg.transport_server;
            if ts.is_tls_passthrough() {
                metrics.total_tls_passthrough += 1;
            } else if ts.spec.listener.protocol == PROTOCOL_TCP {
                metrics.total_tcp += 1;
            } else if ts.spec.listener.protocol == PROTOCOL_UDP {
                metrics.total_udp += 1;
            }
        }

        metrics
    }

    pub fn find_resources_for_secret(&self, namespace: &str, name: &str) -> Vec<Resource> {
        self.find_resources_for_resource_reference(namespace, name, &SecretReferenceChecker)
    }

    pub fn find_resources_for_policy(&self, namespace: &str, name: &str) -> Vec<Resource> {
        self.find_resources_for_resource_reference(namespace, name, &PolicyReferenceChecker)
    }

    pub fn find_resources_for_service(&self, namespace: &str, name: &str) -> Vec<Resource> {
        self.find_resources_for_resource_reference(namespace, name, &ServiceReferenceChecker)
    }

    pub fn find_resources_for_resource_reference(
        &self,
        namespace: &str,
        name: &str,
        checker: &dyn ReferenceChecker,
    ) -> Vec<Resource> {
        self.model.resources_referencing(checker, namespace, name)
    }

    fn rebuild(&mut self) -> MutationResult {
        let build = self.build();
        let changes = self.diff(&build);
        let problems = self.problems.report(build.problems);

        debug!(
            resources = build.model.len(),
            changes = changes.len(),
            problems = problems.len(),
            "Rebuilt configuration"
        );

        self.model = build.model;
        (changes, problems)
    }

    fn build(&self) -> Build {
        let mut build = Build::default();

        let minions = self.build_ingresses(&mut build);
        let delegates = self.build_virtual_servers(&mut build);
        self.build_transport_servers(&mut build);

        self.report_orphan_minions(&mut build, &minions);
        self.report_orphan_delegates(&mut build, &delegates);
        report_slotless(&mut build);

        build
    }

    /// Builds regular and master Ingresses; returns the valid minions
    fn build_ingresses(&self, build: &mut Build) -> Vec<Arc<Ingress>> {
        let mut minions_by_host: BTreeMap<String, Vec<Arc<Ingress>>> = BTreeMap::new();
        let mut minions = Vec::new();
        let mut candidates = Vec::new();

        for ing in self.ingresses.values() {
            if let Err(e) = self.validator.validate_ingress(ing) {
                build.reject(KubeObject::Ingress(ing.clone()), &e, e.to_string());
                continue;
            }

            if ingress::is_minion(ing) {
                if let Some(host) = ingress::hosts(ing).into_iter().next() {
                    minions_by_host.entry(host).or_default().push(ing.clone());
                }
                minions.push(ing.clone());
            } else {
                candidates.push(ing.clone());
            }
        }

        for ing in candidates {
            let hosts = ingress::hosts(&ing);

            let config = if ingress::is_master(&ing) {
                let group_minions = hosts
                    .first()
                    .and_then(|h| minions_by_host.get(h))
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let group = delegation::attach_minions(group_minions);
                IngressConfiguration::master(ing.clone(), group.minions, group.child_warnings)
            } else {
                IngressConfiguration::regular(ing.clone())
            };

            let slots = hosts.into_iter().map(Slot::Host).collect();
            build.claim(Resource::Ingress(config), slots);
        }

        minions
    }

    /// Builds VirtualServers; returns the VirtualServerRoutes valid on their own
    fn build_virtual_servers(&self, build: &mut Build) -> BTreeMap<ObjectKey, Arc<VirtualServerRoute>> {
        let mut delegates = BTreeMap::new();

        for (key, vsr) in &self.virtual_server_routes {
            match self.validator.validate_virtual_server_route(vsr) {
                Ok(()) => {
                    delegates.insert(key.clone(), vsr.clone());
                }
                Err(e) => build.reject(
                    KubeObject::VirtualServerRoute(vsr.clone()),
                    &e,
                    format!("VirtualServerRoute {} was rejected with error: {}", key, e),
                ),
            }
        }

        for (key, vs) in &self.virtual_servers {
            if let Err(e) = self.validator.validate_virtual_server(vs) {
                build.reject(
                    KubeObject::VirtualServer(vs.clone()),
                    &e,
                    format!("VirtualServer {} was rejected with error: {}", key, e),
                );
                continue;
            }

            let delegation = delegation::attach_virtual_server_routes(vs, &delegates, self.validator.as_ref());
            let mut config = VirtualServerConfiguration::new(vs.clone());
            config.virtual_server_routes = delegation.routes;
            config.virtual_server_route_selectors = delegation.selectors;
            config.warnings = delegation.warnings;
            self.resolve_listeners(&mut config);

            let slot = Slot::Host(vs.spec.host.clone());
            build.claim(Resource::VirtualServer(config), vec![slot]);
        }

        delegates
    }

    /// Resolves custom HTTP/HTTPS listeners to ports, warning about unusable ones
    fn resolve_listeners(&self, config: &mut VirtualServerConfiguration) {
        if !self.config.custom_listeners {
            return;
        }
        let Some(listener) = config.virtual_server.spec.listener.clone() else {
            return;
        };
        let http = listener.http.filter(|n| !n.is_empty());
        let https = listener.https.filter(|n| !n.is_empty());
        if http.is_none() && https.is_none() {
            return;
        }

        if !self.listeners.is_deployed() {
            config
                .warnings
                .push("Listeners defined, but no GlobalConfiguration is deployed".to_string());
            return;
        }

        if let Some(name) = http {
            match self.listeners.get(&name).filter(|l| l.protocol == PROTOCOL_HTTP) {
                Some(l) if !l.ssl => config.http_port = Some(l.port),
                Some(_) => config.warnings.push(format!(
                    "Listener {} can't be use in `listener.http` context as SSL is enabled for that listener.",
                    name
                )),
                None => config
                    .warnings
                    .push(format!("Listener {} is not defined in GlobalConfiguration", name)),
            }
        }

        if let Some(name) = https {
            match self.listeners.get(&name).filter(|l| l.protocol == PROTOCOL_HTTP) {
                Some(l) if l.ssl => config.https_port = Some(l.port),
                Some(_) => config.warnings.push(format!(
                    "Listener {} can't be use in `listener.https` context as SSL is not enabled for that listener.",
                    name
                )),
                None => config
                    .warnings
                    .push(format!("Listener {} is not defined in GlobalConfiguration", name)),
            }
        }
    }

    fn build_transport_servers(&self, build: &mut Build) {
        let mut passthrough = Vec::new();
        let mut bound = Vec::new();

        for (key, ts) in &self.transport_servers {
            if let Err(e) = self.validator.validate_transport_server(ts) {
                build.reject(
                    KubeObject::TransportServer(ts.clone()),
                    &e,
                    format!("TransportServer {} was rejected with error: {}", key, e),
                );
                continue;
            }

            if ts.is_tls_passthrough() {
                passthrough.push(ts.clone());
            } else {
                bound.push(ts.clone());
            }
        }

        for ts in passthrough {
            let slot = Slot::Host(ts.spec.host.clone());
            let config = TransportServerConfiguration::new(ts, None);
            build.claim(Resource::TransportServer(config), vec![slot]);
        }

        for ts in bound {
            let name = &ts.spec.listener.name;
            let protocol = &ts.spec.listener.protocol;

            let port = match self.listeners.get(name) {
                Some(l) if l.protocol == *protocol => l.port,
                Some(_) => {
                    build.problem(
                        KubeObject::TransportServer(ts.clone()),
                        ProblemSeverity::Warning,
                        ProblemReason::Rejected,
                        format!("Listener {} with protocol {} doesn't exist", name, protocol),
                    );
                    continue;
                }
                None => {
                    build.problem(
                        KubeObject::TransportServer(ts.clone()),
                        ProblemSeverity::Warning,
                        ProblemReason::Rejected,
                        format!("Listener {} doesn't exist", name),
                    );
                    continue;
                }
            };

            let slot = Slot::Listener(ListenerHostKey::new(name.as_str(), ts.spec.host.as_str()));
            let config = TransportServerConfiguration::new(ts.clone(), Some(port));
            build.claim(Resource::TransportServer(config), vec![slot]);
        }
    }

    fn report_orphan_minions(&self, build: &mut Build, minions: &[Arc<Ingress>]) {
        for minion in minions {
            let key = ObjectKey::from_meta(&minion.metadata);
            let attached = ingress::hosts(minion)
                .into_iter()
                .next()
                .and_then(|host| build.model.lookup(&Slot::Host(host)))
                .is_some_and(|owner| match owner {
                    Resource::Ingress(cfg) => {
                        cfg.is_master
                            && cfg
                                .minions
                                .iter()
                                .any(|m| ObjectKey::from_meta(&m.ingress.metadata) == key)
                    }
                    _ => false,
                });

            if !attached {
                build.problem(
                    KubeObject::Ingress(minion.clone()),
                    ProblemSeverity::Info,
                    ProblemReason::NoIngressMasterFound,
                    "Ingress master is invalid or doesn't exist".to_string(),
                );
            }
        }
    }

    fn report_orphan_delegates(&self, build: &mut Build, delegates: &BTreeMap<ObjectKey, Arc<VirtualServerRoute>>) {
        let attached: BTreeSet<ObjectKey> = build
            .model
            .resources()
            .filter_map(|r| match r {
                Resource::VirtualServer(cfg) => Some(cfg),
                _ => None,
            })
            .flat_map(|cfg| {
                cfg.virtual_server_routes
                    .iter()
                    .map(|vsr| ObjectKey::from_meta(&vsr.metadata))
            })
            .collect();

        for (key, vsr) in delegates {
            if attached.contains(key) {
                continue;
            }

            let (reason, message) = match build.model.lookup(&Slot::Host(vsr.spec.host.clone())) {
                Some(Resource::VirtualServer(cfg)) => (
                    ProblemReason::Ignored,
                    format!(
                        "VirtualServer {} ignores VirtualServerRoute",
                        ObjectKey::from_meta(&cfg.virtual_server.metadata)
                    ),
                ),
                _ => (
                    ProblemReason::NoVirtualServerFound,
                    "VirtualServer is invalid or doesn't exist".to_string(),
                ),
            };
            build.problem(
                KubeObject::VirtualServerRoute(vsr.clone()),
                ProblemSeverity::Info,
                reason,
                message,
            );
        }
    }

    /// Compares the current model with `build`, per slot, hosts first
    fn diff(&self, build: &Build) -> Vec<ResourceChange> {
        let slots: BTreeSet<Slot> = self
            .model
            .slots()
            .map(|(slot, _)| slot)
            .chain(build.model.slots().map(|(slot, _)| slot))
            .collect();

        let mut changes = ChangeSetBuilder::new();
        for slot in &slots {
            if let Some(old_id) = self.model.owner(slot) {
                if !build.model.contains(old_id) {
                    let snapshot = build
                        .slotless
                        .get(old_id)
                        .or_else(|| self.model.get(old_id))
                        .cloned();
                    if let Some(snapshot) = snapshot {
                        changes.delete(snapshot, build.errors.get(old_id).cloned());
                    }
                }
            }

            if let Some(current) = build.model.lookup(slot) {
                let unchanged = self
                    .model
                    .get(&current.id())
                    .is_some_and(|previous| previous.is_equal(current));
                if !unchanged {
                    changes.add_or_update(current.clone());
                }
            }
        }

        changes.build()
    }
}

/// Problems for built resources that lost every slot they claimed
fn report_slotless(build: &mut Build) {
    let slotless: Vec<Resource> = build.slotless.values().cloned().collect();

    for resource in slotless {
        let message = match &resource {
            Resource::Ingress(_) => "All hosts are taken by other resources".to_string(),
            Resource::VirtualServer(_) => "Host is taken by another resource".to_string(),
            Resource::TransportServer(cfg) if cfg.transport_server.is_tls_passthrough() => {
                "Host is taken by another resource".to_string()
            }
            Resource::TransportServer(cfg) => {
                let spec = &cfg.transport_server.spec;
                format!(
                    "{} is taken by another resource",
                    ListenerHostKey::new(spec.listener.name.as_str(), spec.host.as_str())
                )
            }
        };
        build.problem(resource.object(), ProblemSeverity::Warning, ProblemReason::Rejected, message);
    }
}
