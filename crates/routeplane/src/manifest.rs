//! Loading Kubernetes manifests from multi-document YAML files

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use routeplane_engine::crd::{GlobalConfiguration, TransportServer, VirtualServer, VirtualServerRoute};
use routeplane_engine::ObjectKey;
use serde::Deserialize;
use tracing::warn;

/// An object the engine understands
#[derive(Clone, Debug, PartialEq)]
pub enum Manifest {
    Ingress(Arc<Ingress>),
    VirtualServer(Arc<VirtualServer>),
    VirtualServerRoute(Arc<VirtualServerRoute>),
    TransportServer(Arc<TransportServer>),
    GlobalConfiguration(Arc<GlobalConfiguration>),
}

impl Manifest {
    pub fn kind(&self) -> &'static str {
        match self {
            Manifest::Ingress(_) => "Ingress",
            Manifest::VirtualServer(_) => "VirtualServer",
            Manifest::VirtualServerRoute(_) => "VirtualServerRoute",
            Manifest::TransportServer(_) => "TransportServer",
            Manifest::GlobalConfiguration(_) => "GlobalConfiguration",
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Manifest::Ingress(o) => &o.metadata,
            Manifest::VirtualServer(o) => &o.metadata,
            Manifest::VirtualServerRoute(o) => &o.metadata,
            Manifest::TransportServer(o) => &o.metadata,
            Manifest::GlobalConfiguration(o) => &o.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::from_meta(self.meta())
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Manifest::Ingress(o) => &mut Arc::make_mut(o).metadata,
            Manifest::VirtualServer(o) => &mut Arc::make_mut(o).metadata,
            Manifest::VirtualServerRoute(o) => &mut Arc::make_mut(o).metadata,
            Manifest::TransportServer(o) => &mut Arc::make_mut(o).metadata,
            Manifest::GlobalConfiguration(o) => &mut Arc::make_mut(o).metadata,
        }
    }
}

/// Hands out creation timestamps to objects that were written without one.
///
/// Conflicts are won by the older object, so stamping in replay order makes
/// objects applied earlier win over objects applied later.
pub struct CreationClock {
    next: DateTime<Utc>,
}

impl CreationClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { next: start }
    }

    pub fn stamp(&mut self, mut manifest: Manifest) -> Manifest {
        if manifest.meta().creation_timestamp.is_none() {
            manifest.meta_mut().creation_timestamp = Some(Time(self.next));
            self.next += chrono::Duration::seconds(1);
        }
        manifest
    }
}

/// Reads every supported object from `path`, in document order
pub fn load(path: &Path) -> Result<Vec<Manifest>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read manifest {}", path.display()))?;
    parse(&content).with_context(|| format!("Failed to parse manifest {}", path.display()))
}

pub fn parse(content: &str) -> Result<Vec<Manifest>> {
    let mut manifests = Vec::new();

    for (i, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .with_context(|| format!("document {} is not valid YAML", i))?;
        if value.is_null() {
            continue;
        }

        let Some(kind) = value.get("kind").and_then(|k| k.as_str()).map(str::to_string) else {
            bail!("document {} has no kind", i);
        };

        let manifest = match kind.as_str() {
            "Ingress" => Manifest::Ingress(Arc::new(from_value(value, i)?)),
            "VirtualServer" => Manifest::VirtualServer(Arc::new(from_value(value, i)?)),
            "VirtualServerRoute" => Manifest::VirtualServerRoute(Arc::new(from_value(value, i)?)),
            "TransportServer" => Manifest::TransportServer(Arc::new(from_value(value, i)?)),
            "GlobalConfiguration" => Manifest::GlobalConfiguration(Arc::new(from_value(value, i)?)),
            other => {
                warn!(kind = other, document = i, "Skipping unsupported kind");
                continue;
            }
        };
        manifests.push(manifest);
    }

    Ok(manifests)
}

fn from_value<T: serde::de::DeserializeOwned>(value: serde_yaml::Value, document: usize) -> Result<T> {
    serde_yaml::from_value(value).with_context(|| format!("document {} does not match its kind", document))
}
