//! Fixtures shared by the configuration integration tests
//!
//! Every fixture gets a creation timestamp one second after the previous one,
//! so objects created earlier in a test are older and win conflicts.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use routeplane_engine::crd::{
    GlobalConfiguration, GlobalConfigurationSpec, Listener, TransportServer, TransportServerSpec,
    VirtualServer, VirtualServerRoute, VirtualServerRouteSpec, VirtualServerSpec,
};
use routeplane_engine::{
    ChangeOp, Configuration, EngineConfig, ObjectKey, ResourceChange, ResourceId, ResourceKind,
    RoutingResource,
};

pub const NAMESPACE: &str = "default";

static CLOCK: AtomicI64 = AtomicI64::new(1_700_000_000);

pub fn configuration() -> Configuration {
    Configuration::new(EngineConfig::default())
}

pub fn meta(name: &str) -> ObjectMeta {
    let created = CLOCK.fetch_add(1, Ordering::SeqCst);
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        uid: Some(ulid::Ulid::new().to_string()),
        generation: Some(1),
        creation_timestamp: Utc.timestamp_opt(created, 0).single().map(Time),
        ..Default::default()
    }
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

pub fn id(kind: ResourceKind, name: &str) -> ResourceId {
    ResourceId::new(kind, key(name))
}

fn parse<T: serde::de::DeserializeOwned>(yaml: &str) -> T {
    serde_yaml::from_str(yaml).expect("test YAML should parse successfully")
}

fn ingress_from(name: &str, annotations: &[(&str, &str)], spec_yaml: &str) -> Arc<Ingress> {
    let yaml = format!(
        "apiVersion: networking.k8s.io/v1\nkind: Ingress\nmetadata:\n  name: {}\nspec:\n{}",
        name, spec_yaml
    );
    let mut ing: Ingress = parse(&yaml);
    ing.metadata = meta(name);
    if !annotations.is_empty() {
        ing.metadata.annotations = Some(
            annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        );
    }
    Arc::new(ing)
}

/// A regular Ingress serving `/` on every host
pub fn ingress(name: &str, hosts: &[&str]) -> Arc<Ingress> {
    let mut spec = String::from("  rules:\n");
    for host in hosts {
        spec.push_str(&format!(
            "  - host: {}\n    http:\n      paths:\n      - path: /\n        pathType: Prefix\n        backend:\n          service:\n            name: {}-svc\n            port:\n              number: 80\n",
            host, name
        ));
    }
    ingress_from(name, &[], &spec)
}

pub fn master(name: &str, host: &str) -> Arc<Ingress> {
    let spec = format!("  rules:\n  - host: {}\n", host);
    ingress_from(
        name,
        &[("routeplane.io/mergeable-ingress-type", "master")],
        &spec,
    )
}

pub fn minion(name: &str, host: &str, paths: &[&str]) -> Arc<Ingress> {
    let mut spec = format!("  rules:\n  - host: {}\n    http:\n      paths:", host);
    spec.push_str(if paths.is_empty() { " []\n" } else { "\n" });
    for path in paths {
        spec.push_str(&format!(
            "      - path: {}\n        pathType: Prefix\n        backend:\n          service:\n            name: {}-svc\n            port:\n              number: 80\n",
            path, name
        ));
    }
    ingress_from(
        name,
        &[("routeplane.io/mergeable-ingress-type", "minion")],
        &spec,
    )
}

pub fn virtual_server_from(name: &str, spec_yaml: &str) -> Arc<VirtualServer> {
    let spec: VirtualServerSpec = parse(spec_yaml);
    let mut vs = VirtualServer::new(name, spec);
    vs.metadata = meta(name);
    Arc::new(vs)
}

/// A VirtualServer passing `/` to a single upstream
pub fn virtual_server(name: &str, host: &str) -> Arc<VirtualServer> {
    virtual_server_from(
        name,
        &format!(
            r#"
host: {}
upstreams:
  - name: tea
    service: tea-svc
    port: 80
routes:
  - path: /
    action:
      pass: tea
"#,
            host
        ),
    )
}

/// A VirtualServer delegating `/coffee` to `coffee` and `/tea` to `tea`
pub fn delegating_virtual_server(name: &str, host: &str) -> Arc<VirtualServer> {
    virtual_server_from(
        name,
        &format!(
            r#"
host: {}
routes:
  - path: /coffee
    route: coffee
  - path: /tea
    route: default/tea
"#,
            host
        ),
    )
}

pub fn virtual_server_with_listeners(name: &str, host: &str, http: &str, https: &str) -> Arc<VirtualServer> {
    let mut vs = (*virtual_server(name, host)).clone();
    vs.spec.listener = Some(routeplane_engine::crd::VirtualServerListener {
        http: Some(http.to_string()),
        https: Some(https.to_string()),
    });
    Arc::new(vs)
}

pub fn virtual_server_route(name: &str, host: &str, prefix: &str) -> Arc<VirtualServerRoute> {
    let spec: VirtualServerRouteSpec = parse(&format!(
        r#"
host: {host}
upstreams:
  - name: backend
    service: {name}-svc
    port: 80
subroutes:
  - path: {prefix}
    action:
      pass: backend
"#
    ));
    let mut vsr = VirtualServerRoute::new(name, spec);
    vsr.metadata = meta(name);
    Arc::new(vsr)
}

pub fn transport_server(name: &str, listener: &str, protocol: &str, host: &str) -> Arc<TransportServer> {
    let spec: TransportServerSpec = parse(&format!(
        r#"
listener:
  name: {listener}
  protocol: {protocol}
host: "{host}"
upstreams:
  - name: backend
    service: {name}-svc
    port: 5353
action:
  pass: backend
"#
    ));
    let mut ts = TransportServer::new(name, spec);
    ts.metadata = meta(name);
    Arc::new(ts)
}

pub fn passthrough(name: &str, host: &str) -> Arc<TransportServer> {
    transport_server(name, "tls-passthrough", "TLS_PASSTHROUGH", host)
}

pub fn listener(name: &str, port: i32, protocol: &str) -> Listener {
    Listener {
        name: name.to_string(),
        port,
        protocol: protocol.to_string(),
        ..Default::default()
    }
}

pub fn ssl_listener(name: &str, port: i32) -> Listener {
    Listener {
        ssl: true,
        ..listener(name, port, "HTTP")
    }
}

pub fn global_configuration(listeners: Vec<Listener>) -> Arc<GlobalConfiguration> {
    let mut gc = GlobalConfiguration::new("global-configuration", GlobalConfigurationSpec { listeners });
    gc.metadata = meta("global-configuration");
    gc.metadata.namespace = Some("nginx-ingress".to_string());
    Arc::new(gc)
}

/// Same object with its generation bumped, as an API server update would
pub fn bumped<T: Clone + kube::Resource>(obj: &Arc<T>) -> Arc<T> {
    let mut next = (**obj).clone();
    let meta = next.meta_mut();
    meta.generation = Some(meta.generation.unwrap_or(0) + 1);
    Arc::new(next)
}

/// `(op, id)` pairs for compact assertions
pub fn summary(changes: &[ResourceChange]) -> Vec<(ChangeOp, ResourceId)> {
    changes
        .iter()
        .map(|c| (c.op, c.resource.id()))
        .collect()
}
