//! Per-kind resource validation
//!
//! The engine only consumes the [`ResourceValidator`] trait; [`DefaultValidator`]
//! covers the checks placement depends on (hosts, paths, upstream references,
//! listener shape). Listener existence is resolved by the engine itself.

use std::collections::BTreeSet;

use k8s_openapi::api::networking::v1::Ingress;
use routeplane_common::{
    validate_dns1035_label, validate_hostname, FieldError, FieldErrors, FieldPath,
};

use crate::config::EngineConfig;
use crate::crd::{
    Route, TransportServer, Upstream, VirtualServer, VirtualServerRoute,
    TLS_PASSTHROUGH_LISTENER_PROTOCOL,
};
use crate::ingress::{self, MergeableType};
use crate::listeners::{PROTOCOL_TCP, PROTOCOL_UDP};

/// Validation of each watched kind
pub trait ResourceValidator {
    fn validate_ingress(&self, ingress: &Ingress) -> Result<(), FieldErrors>;

    fn validate_virtual_server(&self, vs: &VirtualServer) -> Result<(), FieldErrors>;

    fn validate_virtual_server_route(&self, vsr: &VirtualServerRoute) -> Result<(), FieldErrors>;

    /// Checks a delegate against the parent host and the delegating route path
    fn validate_virtual_server_route_for_parent(
        &self,
        vsr: &VirtualServerRoute,
        parent_host: &str,
        path_prefix: &str,
    ) -> Result<(), FieldErrors>;

    fn validate_transport_server(&self, ts: &TransportServer) -> Result<(), FieldErrors>;
}

#[derive(Clone, Debug, Default)]
pub struct DefaultValidator {
    tls_passthrough: bool,
}

impl DefaultValidator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tls_passthrough: config.tls_passthrough,
        }
    }
}

fn validate_host(host: &str, path: &FieldPath, errors: &mut FieldErrors) {
    if host.is_empty() {
        errors.push(FieldError::required(path, ""));
    } else if let Err(e) = validate_hostname(host) {
        errors.push(FieldError::invalid(path, host, e.to_string()));
    }
}

fn validate_path(value: &str, path: &FieldPath, errors: &mut FieldErrors) {
    if !value.starts_with('/') {
        errors.push(FieldError::invalid(path, value, "must start with '/'"));
    }
}

/// Returns the names of the valid upstreams
fn validate_upstreams(upstreams: &[Upstream], path: &FieldPath, errors: &mut FieldErrors) -> BTreeSet<String> {
    let mut names = BTreeSet::new();

    for (i, upstream) in upstreams.iter().enumerate() {
        let idx_path = path.index(i);

        if let Err(e) = validate_dns1035_label(&upstream.name) {
            errors.push(FieldError::invalid(
                &idx_path.child("name"),
                upstream.name.as_str(),
                e.to_string(),
            ));
        } else if !names.insert(upstream.name.clone()) {
            errors.push(FieldError::duplicate(&idx_path.child("name"), upstream.name.as_str()));
        }

        if upstream.service.is_empty() {
            errors.push(FieldError::required(&idx_path.child("service"), ""));
        }
        if upstream.port == 0 {
            errors.push(FieldError::invalid(
                &idx_path.child("port"),
                i64::from(upstream.port),
                "must be between 1 and 65535, inclusive",
            ));
        }
    }

    names
}

fn validate_action_pass(route: &Route, upstreams: &BTreeSet<String>, path: &FieldPath, errors: &mut FieldErrors) {
    if let Some(pass) = route.action.as_ref().and_then(|a| a.pass.as_deref()) {
        if !upstreams.contains(pass) {
            errors.push(FieldError::not_found(&path.child("action").child("pass"), pass));
        }
    }
}

impl ResourceValidator for DefaultValidator {
    fn validate_ingress(&self, ing: &Ingress) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        let rules_path = FieldPath::new("spec").child("rules");
        let rules = ing
            .spec
            .as_ref()
            .and_then(|s| s.rules.as_deref())
            .unwrap_or_default();

        if rules.is_empty() {
            errors.push(FieldError::required(&rules_path, ""));
        }

        let mut hosts = BTreeSet::new();
        for (i, rule) in rules.iter().enumerate() {
            let host_path = rules_path.index(i).child("host");
            let host = rule.host.as_deref().unwrap_or_default();

            validate_host(host, &host_path, &mut errors);
            if !host.is_empty() && !hosts.insert(host.to_string()) {
                errors.push(FieldError::duplicate(&host_path, host));
            }

            let paths_path = rules_path.index(i).child("http").child("paths");
            for (j, p) in rule.http.iter().flat_map(|h| h.paths.iter()).enumerate() {
                if let Some(value) = &p.path {
                    validate_path(value, &paths_path.index(j).child("path"), &mut errors);
                }
            }
        }

        match ingress::mergeable_type(ing) {
            Some(MergeableType::Master) => {
                if rules.len() != 1 {
                    errors.push(FieldError::invalid(
                        &rules_path,
                        rules.len() as i64,
                        "must include exactly one host for a master",
                    ));
                }
                if !ingress::paths(ing).is_empty() {
                    errors.push(FieldError::forbidden(
                        &rules_path.index(0).child("http").child("paths"),
                        "paths are not allowed in a master",
                    ));
                }
            }
            Some(MergeableType::Minion) => {
                if rules.len() != 1 {
                    errors.push(FieldError::invalid(
                        &rules_path,
                        rules.len() as i64,
                        "must include exactly one host for a minion",
                    ));
                }
                if ingress::paths(ing).is_empty() {
                    errors.push(FieldError::required(
                        &rules_path.index(0).child("http").child("paths"),
                        "must include at least one path for a minion",
                    ));
                }
                if !ingress::tls_secrets(ing).is_empty() {
                    errors.push(FieldError::forbidden(
                        &FieldPath::new("spec").child("tls"),
                        "TLS is not allowed in a minion",
                    ));
                }
            }
            None => {}
        }

        errors.into_result()
    }

    fn validate_virtual_server(&self, vs: &VirtualServer) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        let spec_path = FieldPath::new("spec");

        validate_host(&vs.spec.host, &spec_path.child("host"), &mut errors);

        if let Some(listener) = &vs.spec.listener {
            if let (Some(http), Some(https)) = (&listener.http, &listener.https) {
                if !http.is_empty() && http == https {
                    errors.push(FieldError::invalid(
                        &spec_path.child("listener").child("https"),
                        https.as_str(),
                        "must be different from the http listener",
                    ));
                }
            }
        }

        let upstreams = validate_upstreams(&vs.spec.upstreams, &spec_path.child("upstreams"), &mut errors);

        let routes_path = spec_path.child("routes");
        let mut paths = BTreeSet::new();
        for (i, route) in vs.spec.routes.iter().enumerate() {
            let idx_path = routes_path.index(i);

            validate_path(&route.path, &idx_path.child("path"), &mut errors);
            if !paths.insert(route.path.clone()) {
                errors.push(FieldError::duplicate(&idx_path.child("path"), route.path.as_str()));
            }

            let targets = [
                route.action.is_some(),
                route.route.is_some(),
                route.route_selector.is_some(),
            ]
            .iter()
            .filter(|set| **set)
            .count();
            match targets {
                0 => errors.push(FieldError::required(
                    &idx_path,
                    "must specify exactly one of: `action`, `route` or `routeSelector`",
                )),
                1 => {}
                _ => errors.push(FieldError::forbidden(
                    &idx_path,
                    "must specify exactly one of: `action`, `route` or `routeSelector`",
                )),
            }

            if let Some(selector) = &route.route_selector {
                if selector.match_labels.is_empty() {
                    errors.push(FieldError::required(
                        &idx_path.child("routeSelector").child("matchLabels"),
                        "",
                    ));
                }
            }

            validate_action_pass(route, &upstreams, &idx_path, &mut errors);
        }

        errors.into_result()
    }

    fn validate_virtual_server_route(&self, vsr: &VirtualServerRoute) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        let spec_path = FieldPath::new("spec");

        validate_host(&vsr.spec.host, &spec_path.child("host"), &mut errors);

        let upstreams = validate_upstreams(&vsr.spec.upstreams, &spec_path.child("upstreams"), &mut errors);

        let subroutes_path = spec_path.child("subroutes");
        let mut paths = BTreeSet::new();
        for (i, subroute) in vsr.spec.subroutes.iter().enumerate() {
            let idx_path = subroutes_path.index(i);

            validate_path(&subroute.path, &idx_path.child("path"), &mut errors);
            if !paths.insert(subroute.path.clone()) {
                errors.push(FieldError::duplicate(&idx_path.child("path"), subroute.path.as_str()));
            }

            if subroute.route.is_some() || subroute.route_selector.is_some() {
                errors.push(FieldError::forbidden(&idx_path, "delegation is not allowed in a subroute"));
            }
            if subroute.action.is_none() {
                errors.push(FieldError::required(&idx_path.child("action"), ""));
            }

            validate_action_pass(subroute, &upstreams, &idx_path, &mut errors);
        }

        errors.into_result()
    }

    fn validate_virtual_server_route_for_parent(
        &self,
        vsr: &VirtualServerRoute,
        parent_host: &str,
        path_prefix: &str,
    ) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        let spec_path = FieldPath::new("spec");

        if vsr.spec.host != parent_host {
            errors.push(FieldError::invalid(
                &spec_path.child("host"),
                vsr.spec.host.as_str(),
                format!("must be equal to '{}'", parent_host),
            ));
        }

        let subroutes_path = spec_path.child("subroutes");
        for (i, subroute) in vsr.spec.subroutes.iter().enumerate() {
            if !subroute.path.starts_with(path_prefix) {
                errors.push(FieldError::invalid(
                    &subroutes_path.index(i),
                    subroute.path.as_str(),
                    format!("must start with '{}'", path_prefix),
                ));
            }
        }

        errors.into_result()
    }

    fn validate_transport_server(&self, ts: &TransportServer) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        let spec_path = FieldPath::new("spec");
        let listener_path = spec_path.child("listener");

        if ts.spec.listener.name.is_empty() {
            errors.push(FieldError::required(&listener_path.child("name"), ""));
        }
        if ts.spec.listener.protocol.is_empty() {
            errors.push(FieldError::required(&listener_path.child("protocol"), ""));
        }

        if ts.is_tls_passthrough() {
            if !self.tls_passthrough {
                errors.push(FieldError::forbidden(
                    &listener_path.child("name"),
                    "TLS passthrough is not enabled",
                ));
            }
            if ts.spec.listener.protocol != TLS_PASSTHROUGH_LISTENER_PROTOCOL {
                errors.push(FieldError::invalid(
                    &listener_path.child("protocol"),
                    ts.spec.listener.protocol.as_str(),
                    format!("must be '{}' for the tls-passthrough listener", TLS_PASSTHROUGH_LISTENER_PROTOCOL),
                ));
            }
            validate_host(&ts.spec.host, &spec_path.child("host"), &mut errors);
        } else {
            let protocol = ts.spec.listener.protocol.as_str();
            if !protocol.is_empty() && protocol != PROTOCOL_TCP && protocol != PROTOCOL_UDP {
                errors.push(FieldError::invalid(
                    &listener_path.child("protocol"),
                    protocol,
                    format!("must specify a valid protocol. Accepted values: {},{}", PROTOCOL_TCP, PROTOCOL_UDP),
                ));
            }
            if !ts.spec.host.is_empty() {
                validate_host(&ts.spec.host, &spec_path.child("host"), &mut errors);
            }
        }

        let upstreams = validate_upstreams(&ts.spec.upstreams, &spec_path.child("upstreams"), &mut errors);

        match &ts.spec.action {
            None => errors.push(FieldError::required(&spec_path.child("action"), "")),
            Some(action) if !upstreams.contains(&action.pass) => errors.push(FieldError::not_found(
                &spec_path.child("action").child("pass"),
                action.pass.as_str(),
            )),
            Some(_) => {}
        }

        errors.into_result()
    }
}
