//! VirtualServer and VirtualServerRoute CRDs
//!
//! A VirtualServer owns one host. Its routes either handle traffic directly
//! (`action`) or delegate a path prefix to VirtualServerRoutes, by name or by
//! label selector.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{PolicyReference, Tls, Upstream};

/// VirtualServer spec
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "routeplane.io",
    version = "v1",
    kind = "VirtualServer",
    plural = "virtualservers",
    shortname = "vs",
    namespaced,
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Host", "type":"string", "jsonPath":".spec.host"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerSpec {
    #[serde(default)]
    pub ingress_class_name: Option<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub listener: Option<VirtualServerListener>,
    #[serde(default)]
    pub tls: Option<Tls>,
    #[serde(default)]
    pub policies: Vec<PolicyReference>,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

/// Custom listeners from the GlobalConfiguration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerListener {
    #[serde(default)]
    pub http: Option<String>,
    #[serde(default)]
    pub https: Option<String>,
}

/// A path handled by a VirtualServer (route) or VirtualServerRoute (subroute)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub path: String,
    /// Delegate to a VirtualServerRoute, `name` or `namespace/name`
    #[serde(default)]
    pub route: Option<String>,
    /// Delegate to every VirtualServerRoute carrying these labels
    #[serde(default)]
    pub route_selector: Option<RouteSelector>,
    #[serde(default)]
    pub action: Option<RouteAction>,
    #[serde(default)]
    pub policies: Vec<PolicyReference>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl RouteSelector {
    /// Renders as `k1=v1,k2=v2`, keys sorted
    pub fn selector_string(&self) -> String {
        self.match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// An empty selector matches nothing
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        if self.match_labels.is_empty() {
            return false;
        }
        let Some(labels) = labels else {
            return false;
        };
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|actual| actual == v))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteAction {
    /// Upstream name
    #[serde(default)]
    pub pass: Option<String>,
}

/// VirtualServerRoute spec
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "routeplane.io",
    version = "v1",
    kind = "VirtualServerRoute",
    plural = "virtualserverroutes",
    shortname = "vsr",
    namespaced,
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Host", "type":"string", "jsonPath":".spec.host"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServerRouteSpec {
    #[serde(default)]
    pub ingress_class_name: Option<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub subroutes: Vec<Route>,
}
