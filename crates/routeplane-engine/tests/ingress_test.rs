//! Ingress and mergeable Ingress reconciliation

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::*;
use routeplane_engine::{ChangeOp, ProblemReason, ProblemSeverity, Resource, ResourceKind};

#[test]
fn test_add_update_and_invalidate_ingress() {
    let mut configuration = configuration();
    let ing = ingress("cafe", &["foo.example.com"]);

    let (changes, problems) = configuration.add_or_update_ingress(ing.clone());
    assert_eq!(summary(&changes), vec![(ChangeOp::AddOrUpdate, id(ResourceKind::Ingress, "cafe"))]);
    assert!(problems.is_empty());

    let mut annotated = (*ing).clone();
    annotated.metadata.annotations = Some(BTreeMap::from([(
        "routeplane.io/proxy-connect-timeout".to_string(),
        "10s".to_string(),
    )]));
    let annotated = Arc::new(annotated);

    let (changes, problems) = configuration.add_or_update_ingress(annotated.clone());
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].op, ChangeOp::AddOrUpdate);
    match &changes[0].resource {
        Resource::Ingress(cfg) => assert_eq!(cfg.ingress, annotated),
        other => panic!("Expected an Ingress, got {:?}", other),
    }
    assert!(problems.is_empty());

    let mut invalid = (*annotated).clone();
    let rules = invalid
        .spec
        .as_mut()
        .and_then(|s| s.rules.as_mut())
        .expect("fixture has rules");
    rules.push(rules[0].clone());

    let (changes, problems) = configuration.add_or_update_ingress(Arc::new(invalid));
    let expected_error = r#"spec.rules[1].host: Duplicate value: "foo.example.com""#;
    assert_eq!(summary(&changes), vec![(ChangeOp::Delete, id(ResourceKind::Ingress, "cafe"))]);
    assert_eq!(changes[0].error.as_deref(), Some(expected_error));
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].severity, ProblemSeverity::Error);
    assert_eq!(problems[0].reason, ProblemReason::Rejected);
    assert_eq!(problems[0].message, expected_error);
    assert!(configuration.get_resources().is_empty());

    let (changes, problems) = configuration.delete_ingress(&key("cafe"));
    assert!(changes.is_empty());
    assert!(problems.is_empty());
}

#[test]
fn test_unchanged_ingress_is_idempotent() {
    let mut configuration = configuration();
    let ing = ingress("cafe", &["foo.example.com"]);

    configuration.add_or_update_ingress(ing.clone());
    let (changes, problems) = configuration.add_or_update_ingress(ing);
    assert!(changes.is_empty());
    assert!(problems.is_empty());
}

#[test]
fn test_ingress_with_other_class_is_dropped() {
    let mut configuration = configuration();
    let ing = ingress("cafe", &["foo.example.com"]);
    configuration.add_or_update_ingress(ing.clone());

    let mut other = (*ing).clone();
    other.metadata.annotations = Some(BTreeMap::from([(
        "kubernetes.io/ingress.class".to_string(),
        "other".to_string(),
    )]));

    let (changes, problems) = configuration.add_or_update_ingress(Arc::new(other));
    assert_eq!(summary(&changes), vec![(ChangeOp::Delete, id(ResourceKind::Ingress, "cafe"))]);
    assert_eq!(changes[0].error, None);
    assert!(problems.is_empty());
    assert!(configuration.get_resources().is_empty());
}

#[test]
fn test_older_ingress_wins_host() {
    let mut configuration = configuration();
    let older = ingress("older", &["foo.example.com"]);
    let younger = ingress("younger", &["foo.example.com"]);

    configuration.add_or_update_ingress(younger);
    let (changes, problems) = configuration.add_or_update_ingress(older);
    assert_eq!(
        summary(&changes),
        vec![
            (ChangeOp::Delete, id(ResourceKind::Ingress, "younger")),
            (ChangeOp::AddOrUpdate, id(ResourceKind::Ingress, "older")),
        ]
    );
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].object.key(), key("younger"));
    assert_eq!(problems[0].severity, ProblemSeverity::Warning);
    assert_eq!(problems[0].message, "All hosts are taken by other resources");

    let (changes, problems) = configuration.delete_ingress(&key("older"));
    assert_eq!(
        summary(&changes),
        vec![
            (ChangeOp::Delete, id(ResourceKind::Ingress, "older")),
            (ChangeOp::AddOrUpdate, id(ResourceKind::Ingress, "younger")),
        ]
    );
    assert!(problems.is_empty());
}

#[test]
fn test_ingress_keeps_hosts_it_wins() {
    let mut configuration = configuration();
    let older = ingress("older", &["bar.example.com"]);
    let younger = ingress("younger", &["bar.example.com", "baz.example.com"]);

    configuration.add_or_update_ingress(older);
    let (changes, problems) = configuration.add_or_update_ingress(younger);
    assert_eq!(summary(&changes), vec![(ChangeOp::AddOrUpdate, id(ResourceKind::Ingress, "younger"))]);
    assert!(problems.is_empty());

    match &changes[0].resource {
        Resource::Ingress(cfg) => {
            assert_eq!(cfg.valid_hosts.get("bar.example.com"), Some(&false));
            assert_eq!(cfg.valid_hosts.get("baz.example.com"), Some(&true));
            assert_eq!(
                cfg.warnings,
                vec!["host bar.example.com is taken by another resource".to_string()]
            );
        }
        other => panic!("Expected an Ingress, got {:?}", other),
    }
}

#[test]
fn test_master_collects_minions() {
    let mut configuration = configuration();
    let cafe = master("cafe-master", "cafe.example.com");
    let coffee = minion("coffee", "cafe.example.com", &["/coffee"]);
    let espresso = minion("espresso", "cafe.example.com", &["/coffee", "/espresso"]);

    let (changes, _) = configuration.add_or_update_ingress(cafe);
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::Ingress, "cafe-master"))]
    );

    let (changes, problems) = configuration.add_or_update_ingress(coffee);
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::Ingress, "cafe-master"))]
    );
    assert!(problems.is_empty());

    let (changes, problems) = configuration.add_or_update_ingress(espresso);
    assert!(problems.is_empty());
    match &changes[0].resource {
        Resource::Ingress(cfg) => {
            assert!(cfg.is_master);
            assert_eq!(cfg.minions.len(), 2);
            assert_eq!(
                cfg.child_warnings.get("default/espresso"),
                Some(&vec!["path /coffee is taken by another resource".to_string()])
            );
            let espresso_paths: Vec<_> = cfg.minions[1].valid_paths.iter().cloned().collect();
            assert_eq!(espresso_paths, vec!["/espresso".to_string()]);
        }
        other => panic!("Expected an Ingress, got {:?}", other),
    }
}

#[test]
fn test_minion_without_master() {
    let mut configuration = configuration();
    let coffee = minion("coffee", "cafe.example.com", &["/coffee"]);

    let (changes, problems) = configuration.add_or_update_ingress(coffee);
    assert!(changes.is_empty());
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].severity, ProblemSeverity::Info);
    assert_eq!(problems[0].reason, ProblemReason::NoIngressMasterFound);
    assert_eq!(problems[0].message, "Ingress master is invalid or doesn't exist");

    let (changes, problems) = configuration.add_or_update_ingress(master("cafe-master", "cafe.example.com"));
    assert_eq!(
        summary(&changes),
        vec![(ChangeOp::AddOrUpdate, id(ResourceKind::Ingress, "cafe-master"))]
    );
    assert!(problems.is_empty());

    let (changes, problems) = configuration.delete_ingress(&key("cafe-master"));
    assert_eq!(summary(&changes), vec![(ChangeOp::Delete, id(ResourceKind::Ingress, "cafe-master"))]);
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].reason, ProblemReason::NoIngressMasterFound);
}

#[test]
fn test_invalid_minion_is_rejected() {
    let mut configuration = configuration();
    configuration.add_or_update_ingress(master("cafe-master", "cafe.example.com"));

    let (changes, problems) = configuration.add_or_update_ingress(minion("coffee", "cafe.example.com", &[]));
    assert!(changes.is_empty());
    assert_eq!(problems.len(), 1);
    assert_eq!(problems[0].severity, ProblemSeverity::Error);
    assert_eq!(
        problems[0].message,
        "spec.rules[0].http.paths: Required value: must include at least one path for a minion"
    );
}
