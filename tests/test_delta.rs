use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crm_reconciler::api::agent_dto::AgentCatalogDto;
use crm_reconciler::api::desired_dto::DesiredConfigDto;
use crm_reconciler::domain::agent::catalog::AgentCatalog;
use crm_reconciler::domain::graph::desired::DesiredConfig;
use crm_reconciler::domain::ids::{ConstraintId, ResourceName};
use crm_reconciler::domain::reconcile::command::{CommandKind, CrmCommand};
use crm_reconciler::domain::reconcile::delta::{compute_delta, compute_delta_filtered};
use crm_reconciler::domain::status::snapshot::ClusterSnapshot;
use crm_reconciler::loader::parser::parse_json_str;
use crm_reconciler::parse_status_document;

fn test_catalog() -> Arc<AgentCatalog> {
    let doc = r#"{
        "agents": [
            {
                "name": "Dummy",
                "class": "ocf",
                "provider": "heartbeat",
                "parameters": [ { "name": "state", "type": "string" } ]
            },
            {
                "name": "IPaddr2",
                "class": "ocf",
                "provider": "heartbeat",
                "parameters": [
                    { "name": "ip", "type": "string", "required": true },
                    { "name": "cidr_netmask", "type": "integer", "default": "24" }
                ]
            },
            { "name": "pgsql", "class": "ocf", "provider": "heartbeat" },
            { "name": "postgresql", "class": "systemd" }
        ]
    }"#;

    let dto = parse_json_str::<AgentCatalogDto>(doc).expect("catalog doc should parse");
    Arc::new(AgentCatalog::from_dto(dto).expect("catalog should build"))
}

fn desired_from(doc: &str) -> DesiredConfig {
    let dto = parse_json_str::<DesiredConfigDto>(doc).expect("desired doc should parse");
    DesiredConfig::from_dto(dto, test_catalog()).expect("desired doc should load")
}

fn snapshot_from(doc: &str) -> ClusterSnapshot {
    parse_status_document(doc).expect("status doc should parse")
}

const EMPTY_CLUSTER: &str = r#"{
    "clusterName": "prod",
    "dcHost": "node-1",
    "nodes": [ { "name": "node-1", "state": "online" } ]
}"#;

/// Replays the command list against the live resource and edge sets and
/// panics on any reference to something not present at that point.
fn assert_referentially_safe(commands: &[CrmCommand], live: &ClusterSnapshot) {
    let mut resources: HashSet<ResourceName> = live.resource_names().into_iter().collect();
    let mut edges: HashMap<ConstraintId, (ResourceName, ResourceName)> = live
        .constraints
        .iter()
        .map(|edge| {
            let (left, right) = edge.endpoints();
            (edge.id.clone(), (left.clone(), right.clone()))
        })
        .collect();

    for command in commands {
        match &command.kind {
            CommandKind::CreateResource { resource, .. } => {
                assert!(resources.insert(resource.clone()), "create of already present resource '{}'", resource);
            }
            CommandKind::DeleteResource { resource } => {
                let dangling = edges.values().any(|(left, right)| left == resource || right == resource);
                assert!(!dangling, "resource '{}' deleted while an edge still references it", resource);
                assert!(resources.remove(resource), "delete of absent resource '{}'", resource);
            }
            CommandKind::SetParameter { resource, .. } => {
                assert!(resources.contains(resource), "parameter set on absent resource '{}'", resource);
            }
            CommandKind::CreateConstraint { edge } => {
                let (left, right) = edge.endpoints();
                assert!(resources.contains(left), "edge '{}' references absent resource '{}'", edge.id, left);
                assert!(resources.contains(right), "edge '{}' references absent resource '{}'", edge.id, right);
                assert!(
                    edges.insert(edge.id.clone(), (left.clone(), right.clone())).is_none(),
                    "edge '{}' created twice",
                    edge.id
                );
            }
            CommandKind::DeleteConstraint { constraint, .. } => {
                assert!(edges.remove(constraint).is_some(), "delete of absent edge '{}'", constraint);
            }
        }
    }
}

#[test]
fn test_empty_cluster_creates_resources_then_edges() {
    let desired = desired_from(
        r#"{
            "resources": [
                { "name": "web-server", "agent": "ocf:heartbeat:Dummy" },
                { "name": "vip", "agent": "ocf:heartbeat:Dummy" }
            ],
            "constraints": [
                { "type": "order", "id": "ord-1", "first": "web-server", "then": "vip", "score": "0" },
                { "type": "colocation", "id": "col-1", "resource": "vip", "with": "web-server", "score": "INFINITY" }
            ]
        }"#,
    );
    let live = snapshot_from(EMPTY_CLUSTER);

    let commands = compute_delta(&desired, &live);
    assert_eq!(commands.len(), 4);

    // Resource creates come first, in name order
    match &commands[0].kind {
        CommandKind::CreateResource { resource, agent, .. } => {
            assert_eq!(resource, &ResourceName::new("vip"));
            assert_eq!(agent, "ocf:heartbeat:Dummy");
        }
        other => panic!("Expected resource create, got {:?}", other),
    }
    match &commands[1].kind {
        CommandKind::CreateResource { resource, .. } => assert_eq!(resource, &ResourceName::new("web-server")),
        other => panic!("Expected resource create, got {:?}", other),
    }

    // Edge creates follow, highest score first
    match &commands[2].kind {
        CommandKind::CreateConstraint { edge } => assert_eq!(edge.id, ConstraintId::new("col-1")),
        other => panic!("Expected constraint create, got {:?}", other),
    }
    match &commands[3].kind {
        CommandKind::CreateConstraint { edge } => assert_eq!(edge.id, ConstraintId::new("ord-1")),
        other => panic!("Expected constraint create, got {:?}", other),
    }

    assert_referentially_safe(&commands, &live);
}

#[test]
fn test_create_includes_resolved_defaults() {
    let desired = desired_from(
        r#"{
            "resources": [
                { "name": "vip", "agent": "ocf:heartbeat:IPaddr2", "params": { "ip": "192.168.1.10" } }
            ]
        }"#,
    );
    let live = snapshot_from(EMPTY_CLUSTER);

    let commands = compute_delta(&desired, &live);
    assert_eq!(commands.len(), 1);

    match &commands[0].kind {
        CommandKind::CreateResource { params, .. } => {
            assert_eq!(
                params,
                &vec![
                    ("cidr_netmask".to_string(), "24".to_string()),
                    ("ip".to_string(), "192.168.1.10".to_string()),
                ]
            );
        }
        other => panic!("Expected resource create, got {:?}", other),
    }
}

#[test]
fn test_matching_cluster_produces_empty_delta() {
    let desired = desired_from(
        r#"{
            "resources": [
                { "name": "vip", "agent": "ocf:heartbeat:IPaddr2", "params": { "ip": "10.0.0.5" } },
                { "name": "web", "agent": "ocf:heartbeat:Dummy" }
            ],
            "constraints": [
                { "type": "colocation", "id": "col-1", "resource": "vip", "with": "web", "score": "INFINITY" }
            ]
        }"#,
    );
    let live = snapshot_from(
        r#"{
            "clusterName": "prod",
            "dcHost": "node-1",
            "nodes": [ { "name": "node-1", "state": "online" } ],
            "resources": [
                {
                    "id": "vip",
                    "agent": "ocf:heartbeat:IPaddr2",
                    "node": "node-1",
                    "role": "started",
                    "params": { "ip": "10.0.0.5", "cidr_netmask": "24" }
                },
                { "id": "web", "agent": "ocf:heartbeat:Dummy", "node": "node-1", "role": "started" }
            ],
            "constraints": [
                { "type": "colocation", "id": "col-1", "resource": "vip", "with": "web", "score": "INFINITY" }
            ]
        }"#,
    );

    let commands = compute_delta(&desired, &live);
    assert!(commands.is_empty(), "Expected an empty delta, got {:?}", commands);
}

#[test]
fn test_order_edges_deleted_before_resource_deletes() {
    let desired = desired_from(
        r#"{
            "resources": [ { "name": "a", "agent": "ocf:heartbeat:Dummy" } ]
        }"#,
    );
    let live = snapshot_from(
        r#"{
            "clusterName": "prod",
            "dcHost": "node-1",
            "nodes": [ { "name": "node-1", "state": "online" } ],
            "resources": [
                { "id": "a", "agent": "ocf:heartbeat:Dummy", "node": "node-1", "role": "started" },
                { "id": "b", "agent": "ocf:heartbeat:Dummy", "node": "node-1", "role": "started" }
            ],
            "constraints": [
                { "type": "order", "id": "ord-ab", "first": "a", "then": "b", "score": "0" }
            ]
        }"#,
    );

    let commands = compute_delta(&desired, &live);
    assert_eq!(commands.len(), 2);

    match &commands[0].kind {
        CommandKind::DeleteConstraint { constraint, .. } => assert_eq!(constraint, &ConstraintId::new("ord-ab")),
        other => panic!("Expected constraint delete, got {:?}", other),
    }
    match &commands[1].kind {
        CommandKind::DeleteResource { resource } => assert_eq!(resource, &ResourceName::new("b")),
        other => panic!("Expected resource delete, got {:?}", other),
    }

    assert_referentially_safe(&commands, &live);
}

#[test]
fn test_parameter_changes_are_minimal() {
    let desired = desired_from(
        r#"{
            "resources": [
                { "name": "vip", "agent": "ocf:heartbeat:IPaddr2", "params": { "ip": "10.0.0.5" } }
            ]
        }"#,
    );
    let live = snapshot_from(
        r#"{
            "clusterName": "prod",
            "dcHost": "node-1",
            "nodes": [ { "name": "node-1", "state": "online" } ],
            "resources": [
                {
                    "id": "vip",
                    "agent": "ocf:heartbeat:IPaddr2",
                    "node": "node-1",
                    "role": "started",
                    "params": { "ip": "10.0.0.9", "cidr_netmask": "24" }
                }
            ]
        }"#,
    );

    // Only the drifted parameter is touched, the matching default is not
    let commands = compute_delta(&desired, &live);
    assert_eq!(commands.len(), 1);

    match &commands[0].kind {
        CommandKind::SetParameter { resource, param, value } => {
            assert_eq!(resource, &ResourceName::new("vip"));
            assert_eq!(param, "ip");
            assert_eq!(value, "10.0.0.5");
        }
        other => panic!("Expected parameter set, got {:?}", other),
    }

    // The same change already in flight is not resent
    let mut in_flight = HashSet::new();
    in_flight.insert((ResourceName::new("vip"), "ip".to_string(), "10.0.0.5".to_string()));

    let filtered = compute_delta_filtered(&desired, &live, &in_flight);
    assert!(filtered.is_empty(), "Expected an empty delta, got {:?}", filtered);
}

#[test]
fn test_agent_swap_replaces_resource_and_edges() {
    let desired = desired_from(
        r#"{
            "resources": [
                { "name": "db", "agent": "ocf:heartbeat:pgsql" },
                { "name": "vip", "agent": "ocf:heartbeat:Dummy" }
            ],
            "constraints": [
                { "type": "colocation", "id": "col-1", "resource": "db", "with": "vip", "score": "INFINITY" }
            ]
        }"#,
    );
    let live = snapshot_from(
        r#"{
            "clusterName": "prod",
            "dcHost": "node-1",
            "nodes": [ { "name": "node-1", "state": "online" } ],
            "resources": [
                { "id": "db", "agent": "systemd:postgresql", "node": "node-1", "role": "started" },
                { "id": "vip", "agent": "ocf:heartbeat:Dummy", "node": "node-1", "role": "started" }
            ],
            "constraints": [
                { "type": "colocation", "id": "col-1", "resource": "db", "with": "vip", "score": "INFINITY" }
            ]
        }"#,
    );

    let commands = compute_delta(&desired, &live);
    assert_eq!(commands.len(), 4);

    // The edge goes down first even though its definition is unchanged,
    // then the resource is rebuilt under its new agent, then the edge
    match &commands[0].kind {
        CommandKind::DeleteConstraint { constraint, .. } => assert_eq!(constraint, &ConstraintId::new("col-1")),
        other => panic!("Expected constraint delete, got {:?}", other),
    }
    match &commands[1].kind {
        CommandKind::DeleteResource { resource } => assert_eq!(resource, &ResourceName::new("db")),
        other => panic!("Expected resource delete, got {:?}", other),
    }
    match &commands[2].kind {
        CommandKind::CreateResource { resource, agent, .. } => {
            assert_eq!(resource, &ResourceName::new("db"));
            assert_eq!(agent, "ocf:heartbeat:pgsql");
        }
        other => panic!("Expected resource create, got {:?}", other),
    }
    match &commands[3].kind {
        CommandKind::CreateConstraint { edge } => assert_eq!(edge.id, ConstraintId::new("col-1")),
        other => panic!("Expected constraint create, got {:?}", other),
    }

    assert_referentially_safe(&commands, &live);
}
