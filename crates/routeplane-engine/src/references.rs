//! Reference checks used to find resources affected by a Secret, Policy or Service

use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::crd::{PolicyReference, TransportServer, Upstream, VirtualServer, VirtualServerRoute};
use crate::ingress;
use crate::resource::Resource;

/// Answers whether a resource references the object `namespace/name`
pub trait ReferenceChecker {
    fn is_referenced_by_ingress(&self, ing: &Ingress, namespace: &str, name: &str) -> bool;

    fn is_referenced_by_minion(&self, ing: &Ingress, namespace: &str, name: &str) -> bool;

    fn is_referenced_by_virtual_server(&self, vs: &VirtualServer, namespace: &str, name: &str) -> bool;

    fn is_referenced_by_virtual_server_route(
        &self,
        vsr: &VirtualServerRoute,
        namespace: &str,
        name: &str,
    ) -> bool;

    fn is_referenced_by_transport_server(&self, ts: &TransportServer, namespace: &str, name: &str) -> bool;

    /// Checks a resource including its minions or attached delegates
    fn references(&self, resource: &Resource, namespace: &str, name: &str) -> bool {
        match resource {
            Resource::Ingress(cfg) => {
                self.is_referenced_by_ingress(&cfg.ingress, namespace, name)
                    || cfg
                        .minions
                        .iter()
                        .any(|m| self.is_referenced_by_minion(&m.ingress, namespace, name))
            }
            Resource::VirtualServer(cfg) => {
                self.is_referenced_by_virtual_server(&cfg.virtual_server, namespace, name)
                    || cfg
                        .virtual_server_routes
                        .iter()
                        .any(|vsr| self.is_referenced_by_virtual_server_route(vsr, namespace, name))
            }
            Resource::TransportServer(cfg) => {
                self.is_referenced_by_transport_server(&cfg.transport_server, namespace, name)
            }
        }
    }
}

fn in_namespace(meta: &ObjectMeta, namespace: &str) -> bool {
    meta.namespace.as_deref().unwrap_or_default() == namespace
}

/// TLS secrets
#[derive(Clone, Copy, Debug, Default)]
pub struct SecretReferenceChecker;

impl ReferenceChecker for SecretReferenceChecker {
    fn is_referenced_by_ingress(&self, ing: &Ingress, namespace: &str, name: &str) -> bool {
        in_namespace(&ing.metadata, namespace) && ingress::tls_secrets(ing).iter().any(|s| s == name)
    }

    fn is_referenced_by_minion(&self, _ing: &Ingress, _namespace: &str, _name: &str) -> bool {
        false
    }

    fn is_referenced_by_virtual_server(&self, vs: &VirtualServer, namespace: &str, name: &str) -> bool {
        in_namespace(&vs.metadata, namespace) && vs.spec.tls.as_ref().is_some_and(|tls| tls.secret == name)
    }

    fn is_referenced_by_virtual_server_route(
        &self,
        _vsr: &VirtualServerRoute,
        _namespace: &str,
        _name: &str,
    ) -> bool {
        false
    }

    fn is_referenced_by_transport_server(&self, ts: &TransportServer, namespace: &str, name: &str) -> bool {
        in_namespace(&ts.metadata, namespace) && ts.spec.tls.as_ref().is_some_and(|tls| tls.secret == name)
    }
}

/// Policy references; a reference without namespace points at the resource's namespace
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyReferenceChecker;

fn policy_matches(policies: &[PolicyReference], owner_namespace: &str, namespace: &str, name: &str) -> bool {
    policies.iter().any(|p| {
        p.name == name && p.namespace.as_deref().unwrap_or(owner_namespace) == namespace
    })
}

fn annotation_policy_matches(ing: &Ingress, namespace: &str, name: &str) -> bool {
    ingress::policies(ing)
        .iter()
        .any(|(ns, n)| ns == namespace && n == name)
}

impl ReferenceChecker for PolicyReferenceChecker {
    fn is_referenced_by_ingress(&self, ing: &Ingress, namespace: &str, name: &str) -> bool {
        annotation_policy_matches(ing, namespace, name)
    }

    fn is_referenced_by_minion(&self, ing: &Ingress, namespace: &str, name: &str) -> bool {
        annotation_policy_matches(ing, namespace, name)
    }

    fn is_referenced_by_virtual_server(&self, vs: &VirtualServer, namespace: &str, name: &str) -> bool {
        let owner_namespace = vs.metadata.namespace.as_deref().unwrap_or_default();
        policy_matches(&vs.spec.policies, owner_namespace, namespace, name)
            || vs
                .spec
                .routes
                .iter()
                .any(|r| policy_matches(&r.policies, owner_namespace, namespace, name))
    }

    fn is_referenced_by_virtual_server_route(
        &self,
        vsr: &VirtualServerRoute,
        namespace: &str,
        name: &str,
    ) -> bool {
        let owner_namespace = vsr.metadata.namespace.as_deref().unwrap_or_default();
        vsr.spec
            .subroutes
            .iter()
            .any(|r| policy_matches(&r.policies, owner_namespace, namespace, name))
    }

    fn is_referenced_by_transport_server(&self, _ts: &TransportServer, _namespace: &str, _name: &str) -> bool {
        false
    }
}

/// Backend services
#[derive(Clone, Copy, Debug, Default)]
pub struct ServiceReferenceChecker;

fn upstream_matches(upstreams: &[Upstream], name: &str) -> bool {
    upstreams.iter().any(|u| u.service == name)
}

impl ReferenceChecker for ServiceReferenceChecker {
    fn is_referenced_by_ingress(&self, ing: &Ingress, namespace: &str, name: &str) -> bool {
        in_namespace(&ing.metadata, namespace) && ingress::backend_services(ing).iter().any(|s| s == name)
    }

    fn is_referenced_by_minion(&self, ing: &Ingress, namespace: &str, name: &str) -> bool {
        self.is_referenced_by_ingress(ing, namespace, name)
    }

    fn is_referenced_by_virtual_server(&self, vs: &VirtualServer, namespace: &str, name: &str) -> bool {
        in_namespace(&vs.metadata, namespace) && upstream_matches(&vs.spec.upstreams, name)
    }

    fn is_referenced_by_virtual_server_route(
        &self,
        vsr: &VirtualServerRoute,
        namespace: &str,
        name: &str,
    ) -> bool {
        in_namespace(&vsr.metadata, namespace) && upstream_matches(&vsr.spec.upstreams, name)
    }

    fn is_referenced_by_transport_server(&self, ts: &TransportServer, namespace: &str, name: &str) -> bool {
        in_namespace(&ts.metadata, namespace) && upstream_matches(&ts.spec.upstreams, name)
    }
}
