//! TransportServer CRD: raw TCP/UDP and TLS passthrough load balancing

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{Tls, Upstream, TLS_PASSTHROUGH_LISTENER_NAME};

/// TransportServer spec
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "routeplane.io",
    version = "v1",
    kind = "TransportServer",
    plural = "transportservers",
    shortname = "ts",
    namespaced,
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Listener", "type":"string", "jsonPath":".spec.listener.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerSpec {
    #[serde(default)]
    pub ingress_class_name: Option<String>,
    pub listener: TransportServerListener,
    /// Required for TLS passthrough, optional SNI host otherwise
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub tls: Option<Tls>,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub action: Option<TransportServerAction>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerListener {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransportServerAction {
    #[serde(default)]
    pub pass: String,
}

impl TransportServer {
    /// Whether this TransportServer binds the built-in TLS passthrough listener
    pub fn is_tls_passthrough(&self) -> bool {
        self.spec.listener.name == TLS_PASSTHROUGH_LISTENER_NAME
    }
}
