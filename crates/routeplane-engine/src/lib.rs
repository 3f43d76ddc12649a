//! routeplane-engine: host and listener reconciliation for routing resources
//!
//! The [`Configuration`] facade stores Ingresses, VirtualServers,
//! VirtualServerRoutes, TransportServers and the GlobalConfiguration, decides
//! which resource owns each host and `(listener, host)` pair, and reports the
//! resulting changes and problems after every mutation.

pub mod changes;
pub mod config;
pub mod configuration;
pub mod conflict;
pub mod crd;
pub mod delegation;
pub mod error;
pub mod ingress;
pub mod listeners;
pub mod model;
pub mod problems;
pub mod references;
pub mod resource;
pub mod validation;

pub use changes::{ChangeOp, ChangeSetBuilder, ResourceChange};
pub use config::EngineConfig;
pub use configuration::{Configuration, MutationResult, ResourceFilter, TransportServerMetrics};
pub use error::ConfigurationError;
pub use model::{ListenerHostKey, ResourceModel, Slot};
pub use problems::{ConfigurationProblem, ProblemReason, ProblemReporter, ProblemSeverity};
pub use resource::{KubeObject, ObjectKey, Resource, ResourceId, ResourceKind, RoutingResource};
pub use validation::{DefaultValidator, ResourceValidator};
