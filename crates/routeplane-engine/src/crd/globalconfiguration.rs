//! GlobalConfiguration CRD: the cluster-wide listener registry

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GlobalConfiguration spec
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "routeplane.io",
    version = "v1",
    kind = "GlobalConfiguration",
    plural = "globalconfigurations",
    shortname = "gc",
    namespaced,
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfigurationSpec {
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

/// A named port the data plane listens on
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub name: String,
    /// Signed so out-of-range values reach validation instead of failing to parse
    pub port: i32,
    #[serde(default)]
    pub ip: Option<String>,
    /// One of HTTP, TCP, UDP
    pub protocol: String,
    /// Only meaningful for HTTP listeners
    #[serde(default)]
    pub ssl: bool,
}
