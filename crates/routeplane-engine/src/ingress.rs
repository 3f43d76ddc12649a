//! Helpers for reading networking.k8s.io/v1 Ingress objects

use k8s_openapi::api::networking::v1::Ingress;

use crate::config::annotations;

const MASTER: &str = "master";
const MINION: &str = "minion";

/// Role of an Ingress in a mergeable group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeableType {
    Master,
    Minion,
}

fn annotation<'a>(ingress: &'a Ingress, name: &str) -> Option<&'a str> {
    ingress
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(name))
        .map(String::as_str)
}

/// Reads the mergeable annotation; unknown values mean a regular Ingress
pub fn mergeable_type(ingress: &Ingress) -> Option<MergeableType> {
    match annotation(ingress, annotations::MERGEABLE_INGRESS_TYPE) {
        Some(MASTER) => Some(MergeableType::Master),
        Some(MINION) => Some(MergeableType::Minion),
        _ => None,
    }
}

pub fn is_master(ingress: &Ingress) -> bool {
    mergeable_type(ingress) == Some(MergeableType::Master)
}

pub fn is_minion(ingress: &Ingress) -> bool {
    mergeable_type(ingress) == Some(MergeableType::Minion)
}

/// Class from the legacy annotation, falling back to `spec.ingressClassName`
pub fn ingress_class(ingress: &Ingress) -> Option<&str> {
    annotation(ingress, annotations::INGRESS_CLASS).or_else(|| {
        ingress
            .spec
            .as_ref()
            .and_then(|s| s.ingress_class_name.as_deref())
    })
}

/// Hosts of all rules in declaration order, empty hosts skipped
pub fn hosts(ingress: &Ingress) -> Vec<String> {
    let mut hosts = Vec::new();

    if let Some(rules) = ingress.spec.as_ref().and_then(|s| s.rules.as_ref()) {
        for rule in rules {
            if let Some(host) = rule.host.as_ref().filter(|h| !h.is_empty()) {
                hosts.push(host.clone());
            }
        }
    }

    hosts
}

/// Paths across all rules in declaration order
pub fn paths(ingress: &Ingress) -> Vec<String> {
    let mut paths = Vec::new();

    if let Some(rules) = ingress.spec.as_ref().and_then(|s| s.rules.as_ref()) {
        for rule in rules {
            if let Some(http) = &rule.http {
                for path in &http.paths {
                    paths.push(path.path.clone().unwrap_or_else(|| "/".to_string()));
                }
            }
        }
    }

    paths
}

/// Services referenced by the default backend and every path backend
pub fn backend_services(ingress: &Ingress) -> Vec<String> {
    let mut services = Vec::new();
    let Some(spec) = &ingress.spec else {
        return services;
    };

    if let Some(svc) = spec.default_backend.as_ref().and_then(|b| b.service.as_ref()) {
        services.push(svc.name.clone());
    }

    for rule in spec.rules.iter().flatten() {
        for path in rule.http.iter().flat_map(|h| h.paths.iter()) {
            if let Some(svc) = &path.backend.service {
                services.push(svc.name.clone());
            }
        }
    }

    services
}

/// TLS secret names in declaration order
pub fn tls_secrets(ingress: &Ingress) -> Vec<String> {
    ingress
        .spec
        .iter()
        .flat_map(|s| s.tls.iter().flatten())
        .filter_map(|tls| tls.secret_name.clone())
        .collect()
}

/// Policy references from the policies annotation as `(namespace, name)`
pub fn policies(ingress: &Ingress) -> Vec<(String, String)> {
    let namespace = ingress.metadata.namespace.clone().unwrap_or_default();
    annotation(ingress, annotations::POLICIES)
        .map(|value| parse_policy_list(value, &namespace))
        .unwrap_or_default()
}

fn parse_policy_list(value: &str, default_namespace: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|reference| match reference.split_once('/') {
            Some((ns, name)) => (ns.to_string(), name.to_string()),
            None => (default_namespace.to_string(), reference.to_string()),
        })
        .collect()
}
