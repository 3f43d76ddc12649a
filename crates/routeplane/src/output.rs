//! Printable summaries of engine results

use clap::ValueEnum;
use routeplane_engine::{
    ChangeOp, ConfigurationProblem, ProblemReason, ProblemSeverity, Resource, ResourceChange,
    ResourceKind, RoutingResource, TransportServerMetrics,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChangeSummary {
    pub op: ChangeOp,
    pub kind: ResourceKind,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<&ResourceChange> for ChangeSummary {
    fn from(change: &ResourceChange) -> Self {
        Self {
            op: change.op,
            kind: change.resource.kind(),
            key: change.resource.key().to_string(),
            error: change.error.clone(),
            warnings: change.resource.warnings().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProblemSummary {
    pub kind: ResourceKind,
    pub key: String,
    pub severity: ProblemSeverity,
    pub reason: ProblemReason,
    pub message: String,
}

impl From<&ConfigurationProblem> for ProblemSummary {
    fn from(problem: &ConfigurationProblem) -> Self {
        Self {
            kind: problem.object.kind(),
            key: problem.object.key().to_string(),
            severity: problem.severity,
            reason: problem.reason,
            message: problem.message.clone(),
        }
    }
}

/// Result of applying or deleting one object
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StepReport {
    pub action: &'static str,
    pub object: String,
    pub changes: Vec<ChangeSummary>,
    pub problems: Vec<ProblemSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    pub fn new(
        action: &'static str,
        object: String,
        changes: &[ResourceChange],
        problems: &[ConfigurationProblem],
    ) -> Self {
        Self {
            action,
            object,
            changes: changes.iter().map(ChangeSummary::from).collect(),
            problems: problems.iter().map(ProblemSummary::from).collect(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResourceSummary {
    pub kind: ResourceKind,
    pub key: String,
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl From<&Resource> for ResourceSummary {
    fn from(resource: &Resource) -> Self {
        let (hosts, listener) = match resource {
            Resource::Ingress(cfg) => (
                cfg.valid_hosts
                    .iter()
                    .filter(|(_, valid)| **valid)
                    .map(|(host, _)| host.clone())
                    .collect(),
                None,
            ),
            Resource::VirtualServer(cfg) => (vec![cfg.host().to_string()], None),
            Resource::TransportServer(cfg) => {
                let spec = &cfg.transport_server.spec;
                let hosts = if spec.host.is_empty() {
                    Vec::new()
                } else {
                    vec![spec.host.clone()]
                };
                (hosts, Some(spec.listener.name.clone()))
            }
        };

        Self {
            kind: resource.kind(),
            key: resource.key().to_string(),
            hosts,
            listener,
            warnings: resource.warnings().to_vec(),
        }
    }
}

/// Final state after replaying all manifests
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StateReport {
    pub resources: Vec<ResourceSummary>,
    pub transport_servers: TransportServerMetrics,
}

pub fn print_steps(steps: &[StepReport], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(steps)?),
        OutputFormat::Text => {
            for step in steps {
                println!("{} {}", step.action, step.object);
                if let Some(error) = &step.error {
                    println!("  error: {}", error);
                }
                for change in &step.changes {
                    println!("  {:?} {} {}", change.op, change.kind, change.key);
                    if let Some(error) = &change.error {
                        println!("    error: {}", error);
                    }
                    for warning in &change.warnings {
                        println!("    warning: {}", warning);
                    }
                }
                for problem in &step.problems {
                    println!(
                        "  {} {} {} {}: {}",
                        problem.severity, problem.reason, problem.kind, problem.key, problem.message
                    );
                }
            }
        }
    }
    Ok(())
}

pub fn print_state(state: &StateReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(state)?),
        OutputFormat::Text => {
            for resource in &state.resources {
                let target = match &resource.listener {
                    Some(listener) => format!("{} {}", listener, resource.hosts.join(",")),
                    None => resource.hosts.join(","),
                };
                println!("{} {} {}", resource.kind, resource.key, target.trim_end());
                for warning in &resource.warnings {
                    println!("  warning: {}", warning);
                }
            }
            let metrics = &state.transport_servers;
            println!(
                "TransportServers: {} TLS passthrough, {} TCP, {} UDP",
                metrics.total_tls_passthrough, metrics.total_tcp, metrics.total_udp
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use routeplane_engine::crd::{TransportServer, TransportServerSpec};
    use routeplane_engine::resource::TransportServerConfiguration;
    use std::sync::Arc;

    fn transport_server(host: &str) -> Resource {
        let spec: TransportServerSpec = serde_yaml::from_str(&format!(
            "listener:\n  name: tcp-7777\n  protocol: TCP\nhost: \"{}\"\n",
            host
        ))
        .expect("test YAML should parse successfully");
        let mut ts = TransportServer::new("dns", spec);
        ts.metadata.namespace = Some("default".to_string());
        Resource::TransportServer(TransportServerConfiguration::new(Arc::new(ts), Some(7777)))
    }

    #[test]
    fn test_resource_summary_for_listener_without_host() {
        let summary = ResourceSummary::from(&transport_server(""));
        assert_eq!(summary.kind, ResourceKind::TransportServer);
        assert_eq!(summary.key, "default/dns");
        assert!(summary.hosts.is_empty());
        assert_eq!(summary.listener.as_deref(), Some("tcp-7777"));
    }

    #[test]
    fn test_change_summary_json() {
        let change = ResourceChange::delete(transport_server("dns.example.com"), Some("boom".to_string()));
        let json = serde_json::to_value(ChangeSummary::from(&change)).unwrap();
        assert_eq!(json["op"], "Delete");
        assert_eq!(json["kind"], "TransportServer");
        assert_eq!(json["error"], "boom");
        assert!(json.get("warnings").is_none());
    }
}
