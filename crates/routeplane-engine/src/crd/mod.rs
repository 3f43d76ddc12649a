//! Custom resource definitions consumed by the engine

pub mod globalconfiguration;
pub mod transportserver;
pub mod virtualserver;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use globalconfiguration::{GlobalConfiguration, GlobalConfigurationSpec, Listener};
pub use transportserver::{
    TransportServer, TransportServerAction, TransportServerListener, TransportServerSpec,
};
pub use virtualserver::{
    Route, RouteAction, RouteSelector, VirtualServer, VirtualServerListener, VirtualServerRoute,
    VirtualServerRouteSpec, VirtualServerSpec,
};

/// API group shared by all routeplane resources
pub const GROUP: &str = "routeplane.io";

/// Name of the built-in listener used by TLS passthrough TransportServers
pub const TLS_PASSTHROUGH_LISTENER_NAME: &str = "tls-passthrough";

/// Protocol of the built-in TLS passthrough listener
pub const TLS_PASSTHROUGH_LISTENER_PROTOCOL: &str = "TLS_PASSTHROUGH";

/// Reference to a Secret holding TLS material
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tls {
    /// Secret name in the resource's namespace
    #[serde(default)]
    pub secret: String,
}

/// Reference to a Policy resource
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyReference {
    pub name: String,
    /// Defaults to the namespace of the referencing resource
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Backend service reference
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    pub name: String,
    pub service: String,
    pub port: u16,
}
