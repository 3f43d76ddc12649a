//! TransportServer listener and TLS passthrough reconciliation

mod common;

use std::sync::Arc;

use common::*;
use routeplane_engine::crd::TransportServer;
use routeplane_engine::{
    ChangeOp, Configuration, EngineConfig, ProblemReason, ProblemSeverity, Resource, ResourceKind,
    TransportServerMetrics,
};

fn with_listeners(names: &[(&str, i32, &str)]) -> Configuration {
    let mut configuration = configuration();
    let listeners = names
        .iter()
        .map(|(name, port, protocol)| listener(name, *port, protocol))
        .collect();
    let (changes, problems, result) = configuration.add_or_update_global_configuration(global_configuration(listeners));
    assert!(changes.is_empty());
    assert!(problems.is_empty());
    assert!(result.is_ok());
    configuration
}

#[test]
fn test_listener_without_host_is_taken() {
    let mut configuration = with_listeners(&[("tcp-7777", 7777, "TCP")]);

    let (changes, problems) = configuration.add_or_update_transport_server(transport_server("ts-1", "tcp-7777", "TCP", ""));
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::TransportServer, "ts-1"))]
    );
    assert!(problems.is_empty());
    match &changes[0].resource {
        Resource::TransportServer(cfg) => assert_eq!(cfg.listener_port, Some(7777)),
        other => panic!("Expected a TransportServer, got {:?}", other),
    }

    let (changes, problems) = configuration.add_or_update_transport_server(transport_server("ts-2", "tcp-7777", "TCP", ""));
    assert!(changes.is_empty());
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].object.key(), key("ts-2"));
    assert_eq!(problems[0].severity, ProblemSeverity::Warning);
    assert_eq!(problems[0].reason, ProblemReason::Rejected);
    assert_eq!(
        problems[0].message,
        "Listener tcp-7777 with host empty host is taken by another resource"
    );
}

#[test]
fn test_listener_host_pairs_are_independent() {
    let mut configuration = with_listeners(&[("tcp-7777", 7777, "TCP"), ("tcp-8888", 8888, "TCP")]);

    configuration.add_or_update_transport_server(transport_server("ts-1", "tcp-7777", "TCP", "example.com"));

    let (changes, problems) =
        configuration.add_or_update_transport_server(transport_server("ts-2", "tcp-7777", "TCP", "example.com"));
    assert!(changes.is_empty());
    assert_eq!(
        problems[0].message,
        "Listener tcp-7777 with host example.com is taken by another resource"
    );

    let (changes, problems) =
        configuration.add_or_update_transport_server(transport_server("ts-3", "tcp-7777", "TCP", "foo.example.com"));
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::TransportServer, "ts-3"))]
    );
    assert!(problems.is_empty());

    let (changes, problems) =
        configuration.add_or_update_transport_server(transport_server("ts-4", "tcp-8888", "TCP", "example.com"));
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::TransportServer, "ts-4"))]
    );
    assert!(problems.is_empty());

    let (changes, problems) = configuration.delete_transport_server(&key("ts-1"));
    assert_eq!(
        summary(&changes),
        vec![
            (ChangeOp::Delete, id(ResourceKind::TransportServer, "ts-1")),
            (ChangeOp::AddOrUpdate, id(ResourceKind::TransportServer, "ts-2")),
        ]
    );
    assert!(problems.is_empty());
}

#[test]
fn test_virtual_server_takes_passthrough_host() {
    let mut configuration = configuration();

    let (changes, _) = configuration.add_or_update_transport_server(passthrough("ts", "foo.example.com"));
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::TransportServer, "ts"))]
    );

    let (changes, problems) = configuration.add_or_update_virtual_server(virtual_server("cafe", "foo.example.com"));
    assert_eq!(
        summary(&changes),
        vec![
            (ChangeOp::Delete, id(ResourceKind::TransportServer, "ts")),
            (ChangeOp::AddOrUpdate, id(ResourceKind::VirtualServer, "cafe")),
        ]
    );
    assert_eq!(changes[0].error, None);
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].object.key(), key("ts"));
    assert_eq!(problems[0].severity, ProblemSeverity::Warning);
    assert_eq!(problems[0].message, "Host is taken by another resource");

    let (changes, problems) = configuration.delete_virtual_server(&key("cafe"));
    assert_eq!(
        summary(&changes),
        vec![
            (ChangeOp::Delete, id(ResourceKind::VirtualServer, "cafe")),
            (ChangeOp::AddOrUpdate, id(ResourceKind::TransportServer, "ts")),
        ]
    );
    assert!(problems.is_empty());
}

#[test]
fn test_older_passthrough_wins() {
    let mut configuration = configuration();
    let older = passthrough("older", "foo.example.com");
    let younger = passthrough("younger", "foo.example.com");

    configuration.add_or_update_transport_server(younger);
    let (changes, problems) = configuration.add_or_update_transport_server(older);
    assert_eq!(
        summary(&changes),
        vec![
            (ChangeOp::Delete, id(ResourceKind::TransportServer, "younger")),
            (ChangeOp::AddOrUpdate, id(ResourceKind::TransportServer, "older")),
        ]
    );
    assert_eq!(problems[0].object.key(), key("younger"));
}

#[test]
fn test_invalid_listener_drops_transport_servers() {
    let mut configuration = with_listeners(&[("tcp-7777", 7777, "TCP")]);
    configuration.add_or_update_transport_server(transport_server("ts", "tcp-7777", "TCP", ""));

    let (changes, problems, result) =
        configuration.add_or_update_global_configuration(global_configuration(vec![listener("tcp-7777", -1, "TCP")]));

    assert_eq!(
        result.unwrap_err().to_string(),
        "spec.listeners[0].port: Invalid value: -1: must be between 1 and 65535, inclusive"
    );
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::Delete, id(ResourceKind::TransportServer, "ts"))]
    );
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].severity, ProblemSeverity::Warning);
    assert_eq!(problems[0].message, "Listener tcp-7777 doesn't exist");

    let stored = configuration
        .get_global_configuration()
        .expect("GlobalConfiguration should be stored");
    assert!(stored.spec.listeners.is_empty());
}

#[test]
fn test_listener_protocol_mismatch() {
    let mut configuration = with_listeners(&[("tcp-7777", 7777, "TCP")]);

    let (changes, problems) = configuration.add_or_update_transport_server(transport_server("dns", "tcp-7777", "UDP", ""));
    assert!(changes.is_empty());
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].message, "Listener tcp-7777 with protocol UDP doesn't exist");

    let (changes, problems) = configuration.delete_transport_server(&key("dns"));
    assert!(changes.is_empty());
    assert!(problems.is_empty());
}

#[test]
fn test_passthrough_disabled() {
    let config = EngineConfig {
        tls_passthrough: false,
        ..Default::default()
    };
    let mut configuration = Configuration::new(config);

    let (changes, problems) = configuration.add_or_update_transport_server(passthrough("ts", "foo.example.com"));
    assert!(changes.is_empty());
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].severity, ProblemSeverity::Error);
    assert_eq!(
        problems[0].message,
        "TransportServer default/ts was rejected with error: spec.listener.name: Forbidden: TLS passthrough is not enabled"
    );
}

#[test]
fn test_transport_server_metrics() {
    let mut configuration = with_listeners(&[("tcp-7777", 7777, "TCP"), ("udp-5353", 5353, "UDP")]);

    configuration.add_or_update_transport_server(transport_server("tcp", "tcp-7777", "TCP", ""));
    configuration.add_or_update_transport_server(transport_server("udp", "udp-5353", "UDP", ""));
    configuration.add_or_update_transport_server(passthrough("tls-1", "foo.example.com"));
    configuration.add_or_update_transport_server(passthrough("tls-2", "bar.example.com"));
    // loses its listener slot and is not counted
    configuration.add_or_update_transport_server(transport_server("tcp-2", "tcp-7777", "TCP", ""));

    assert_eq!(
        configuration.get_transport_server_metrics(),
        TransportServerMetrics {
            total_tls_passthrough: 2,
            total_tcp: 1,
            total_udp: 1,
        }
    );
}

/// Same TransportServer moved to another listener
fn moved(ts: &Arc<TransportServer>, listener: &str, protocol: &str) -> Arc<TransportServer> {
    let mut next = (*bumped(ts)).clone();
    next.spec.listener.name = listener.to_string();
    next.spec.listener.protocol = protocol.to_string();
    Arc::new(next)
}

fn listener_port(resource: &Resource) -> Option<u16> {
    match resource {
        Resource::TransportServer(cfg) => cfg.listener_port,
        other => panic!("Expected a TransportServer, got {:?}", other),
    }
}

fn virtual_server_ports(resource: &Resource) -> (Option<u16>, Option<u16>, Vec<String>) {
    match resource {
        Resource::VirtualServer(cfg) => (cfg.http_port, cfg.https_port, cfg.warnings.clone()),
        other => panic!("Expected a VirtualServer, got {:?}", other),
    }
}

#[test]
fn test_listener_flip() {
    let mut configuration = with_listeners(&[("tcp-7777", 7777, "TCP"), ("tcp-8888", 8888, "TCP")]);
    let ts = transport_server("ts", "tcp-7777", "TCP", "example.com");

    let (changes, problems) = configuration.add_or_update_transport_server(ts.clone());
    assert_eq!(changes.len(), 1);
    assert_eq!(listener_port(&changes[0].resource), Some(7777));
    assert!(problems.is_empty());

    let to_tcp = moved(&ts, "tcp-8888", "TCP");
    let (changes, problems) = configuration.add_or_update_transport_server(to_tcp.clone());
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::TransportServer, "ts"))]
    );
    assert_eq!(listener_port(&changes[0].resource), Some(8888));
    assert!(problems.is_empty());

    let to_passthrough = moved(&to_tcp, "tls-passthrough", "TLS_PASSTHROUGH");
    let (changes, problems) = configuration.add_or_update_transport_server(to_passthrough);
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::TransportServer, "ts"))]
    );
    assert_eq!(listener_port(&changes[0].resource), None);
    assert!(problems.is_empty());
    assert_eq!(configuration.get_resources().len(), 1);
}

/// `dns` on `tcp-7777` and `cafe` on `http-8082`/`https-8443`
fn with_listener_users() -> Configuration {
    let mut configuration = configuration();
    let (_, _, result) = configuration.add_or_update_global_configuration(global_configuration(vec![
        listener("tcp-7777", 7777, "TCP"),
        listener("http-8082", 8082, "HTTP"),
        ssl_listener("https-8443", 8443),
    ]));
    assert!(result.is_ok());

    configuration.add_or_update_transport_server(transport_server("dns", "tcp-7777", "TCP", ""));
    let (changes, _) = configuration.add_or_update_virtual_server(virtual_server_with_listeners(
        "cafe",
        "cafe.example.com",
        "http-8082",
        "https-8443",
    ));
    assert_eq!(virtual_server_ports(&changes[0].resource), (Some(8082), Some(8443), vec![]));
    configuration
}

#[test]
fn test_listener_port_and_ssl_change() {
    let mut configuration = with_listener_users();

    let (changes, problems, result) = configuration.add_or_update_global_configuration(global_configuration(vec![
        listener("tcp-7777", 7778, "TCP"),
        ssl_listener("http-8082", 8082),
        ssl_listener("https-8443", 8443),
    ]));
    assert!(result.is_ok());
    assert!(problems.is_empty());
    assert_eq!(
        summary(&changes),
        vec![
            (ChangeOp::AddOrUpdate, id(ResourceKind::VirtualServer, "cafe")),
            (ChangeOp::AddOrUpdate, id(ResourceKind::TransportServer, "dns")),
        ]
    );
    assert_eq!(
        virtual_server_ports(&changes[0].resource),
        (
            None,
            Some(8443),
            vec!["Listener http-8082 can't be use in `listener.http` context as SSL is enabled for that listener."
                .to_string()]
        )
    );
    assert_eq!(listener_port(&changes[1].resource), Some(7778));
}

#[test]
fn test_listener_ssl_disabled() {
    let mut configuration = with_listener_users();

    let (changes, problems, result) = configuration.add_or_update_global_configuration(global_configuration(vec![
        listener("tcp-7777", 7777, "TCP"),
        listener("http-8082", 8082, "HTTP"),
        listener("https-8443", 8443, "HTTP"),
    ]));
    assert!(result.is_ok());
    assert!(problems.is_empty());
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::VirtualServer, "cafe"))]
    );
    assert_eq!(
        virtual_server_ports(&changes[0].resource),
        (
            Some(8082),
            None,
            vec!["Listener https-8443 can't be use in `listener.https` context as SSL is not enabled for that listener."
                .to_string()]
        )
    );
}

#[test]
fn test_listener_rename() {
    let mut configuration = with_listener_users();

    let (changes, problems, result) = configuration.add_or_update_global_configuration(global_configuration(vec![
        listener("tcp-7777", 7777, "TCP"),
        listener("http-9092", 9092, "HTTP"),
        ssl_listener("https-8443", 8443),
    ]));
    assert!(result.is_ok());
    assert!(problems.is_empty());
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::VirtualServer, "cafe"))]
    );
    assert_eq!(
        virtual_server_ports(&changes[0].resource),
        (
            None,
            Some(8443),
            vec!["Listener http-8082 is not defined in GlobalConfiguration".to_string()]
        )
    );

    let (changes, problems, result) = configuration.add_or_update_global_configuration(global_configuration(vec![
        listener("tcp-7779", 7779, "TCP"),
        listener("http-9092", 9092, "HTTP"),
        ssl_listener("https-8443", 8443),
    ]));
    assert!(result.is_ok());
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::Delete, id(ResourceKind::TransportServer, "dns"))]
    );
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].object.key(), key("dns"));
    assert_eq!(problems[0].severity, ProblemSeverity::Warning);
    assert_eq!(problems[0].message, "Listener tcp-7777 doesn't exist");
}
