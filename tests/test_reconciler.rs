use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crm_reconciler::api::agent_dto::AgentCatalogDto;
use crm_reconciler::api::desired_dto::DesiredConfigDto;
use crm_reconciler::domain::agent::catalog::AgentCatalog;
use crm_reconciler::domain::dispatch::connection::{CommandOutput, HostConnection};
use crm_reconciler::domain::dispatch::dispatcher::{CommandDispatcher, RetryPolicy};
use crm_reconciler::domain::graph::desired::DesiredConfig;
use crm_reconciler::domain::ids::{HostName, ResourceName};
use crm_reconciler::domain::reconcile::command::{CommandKind, CrmCommand};
use crm_reconciler::domain::reconcile::plan::{DeltaPlan, HostStream};
use crm_reconciler::domain::reconcile::reconciler::Reconciler;
use crm_reconciler::domain::reconcile::report::{CommandOutcome, SkipReason};
use crm_reconciler::error::{Error, Result};
use crm_reconciler::loader::parser::parse_json_str;
use crm_reconciler::parse_status_document;

/// Connection with one scripted exit-code queue per host. Hosts without a
/// script acknowledge everything.
#[derive(Debug, Default)]
struct MockConnection {
    scripts: Mutex<HashMap<String, VecDeque<i32>>>,
    calls: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl MockConnection {
    fn scripted(scripts: &[(&str, &[i32])]) -> Self {
        let scripts = scripts
            .iter()
            .map(|(host, codes)| (host.to_string(), codes.iter().copied().collect()))
            .collect();

        Self {
            scripts: Mutex::new(scripts),
            ..Default::default()
        }
    }

    fn calls_for(&self, host: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call_host, _)| call_host == host)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

#[async_trait]
impl HostConnection for MockConnection {
    async fn execute(&self, argv: &[String], host: &HostName) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push((host.to_string(), argv.join(" ")));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let exit_code = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(host.as_str())
            .and_then(|queue| queue.pop_front())
            .unwrap_or(0);

        Ok(CommandOutput {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 { String::new() } else { "simulated failure".to_string() },
        })
    }
}

fn reconciler_over(mock: Arc<MockConnection>) -> Reconciler {
    let dispatcher = Arc::new(CommandDispatcher::new(mock, RetryPolicy::default(), Duration::from_secs(1)));
    Reconciler::new(dispatcher)
}

fn delete_command(name: &str) -> CrmCommand {
    CrmCommand::new(CommandKind::DeleteResource {
        resource: ResourceName::new(name),
    })
}

fn test_catalog() -> Arc<AgentCatalog> {
    let doc = r#"{
        "agents": [
            {
                "name": "Dummy",
                "class": "ocf",
                "provider": "heartbeat",
                "parameters": [ { "name": "ip", "type": "string" } ]
            }
        ]
    }"#;

    let dto = parse_json_str::<AgentCatalogDto>(doc).expect("catalog doc should parse");
    Arc::new(AgentCatalog::from_dto(dto).expect("catalog should build"))
}

fn desired_from(doc: &str) -> DesiredConfig {
    let dto = parse_json_str::<DesiredConfigDto>(doc).expect("desired doc should parse");
    DesiredConfig::from_dto(dto, test_catalog()).expect("desired doc should load")
}

#[tokio::test]
async fn test_failed_command_halts_only_its_stream() {
    let mock = Arc::new(MockConnection::scripted(&[("node-1", &[1]), ("node-2", &[0])]));
    let reconciler = reconciler_over(mock.clone());

    let plan = DeltaPlan {
        streams: vec![
            HostStream {
                host: HostName::new("node-1"),
                commands: vec![delete_command("a"), delete_command("b")],
            },
            HostStream {
                host: HostName::new("node-2"),
                commands: vec![delete_command("c")],
            },
        ],
    };

    let report = reconciler.apply(plan, &CancellationToken::new()).await;

    assert!(!report.cancelled);
    assert_eq!(report.commands.len(), 3);

    assert!(matches!(report.commands[0].outcome, CommandOutcome::Failed { .. }));
    assert!(matches!(
        report.commands[1].outcome,
        CommandOutcome::Skipped { reason: SkipReason::PriorFailure }
    ));
    assert!(matches!(report.commands[2].outcome, CommandOutcome::Succeeded { attempts: 1 }));

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 1);
    assert!(!report.is_clean());

    // The skipped command never reached the connection
    assert_eq!(mock.calls_for("node-1").len(), 1);
    assert_eq!(mock.calls_for("node-2").len(), 1);
}

#[tokio::test]
async fn test_cancelled_run_skips_pending_commands() {
    let mock = Arc::new(MockConnection::default());
    let reconciler = reconciler_over(mock.clone());

    let plan = DeltaPlan {
        streams: vec![HostStream {
            host: HostName::new("node-1"),
            commands: vec![delete_command("a"), delete_command("b")],
        }],
    };

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = reconciler.apply(plan, &cancel).await;

    assert!(report.cancelled);
    assert_eq!(report.skipped(), 2);
    for entry in &report.commands {
        assert!(matches!(entry.outcome, CommandOutcome::Skipped { reason: SkipReason::Cancelled }));
    }

    assert!(mock.calls_for("node-1").is_empty());
}

#[tokio::test]
async fn test_cancellation_lets_inflight_command_finish() {
    let mut mock = MockConnection::default();
    mock.delay = Some(Duration::from_millis(30));
    let mock = Arc::new(mock);
    let reconciler = reconciler_over(mock.clone());

    let plan = DeltaPlan {
        streams: vec![HostStream {
            host: HostName::new("node-1"),
            commands: vec![delete_command("a"), delete_command("b")],
        }],
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        trigger.cancel();
    });

    let report = reconciler.apply(plan, &cancel).await;

    assert!(report.cancelled);
    assert!(matches!(report.commands[0].outcome, CommandOutcome::Succeeded { .. }));
    assert!(matches!(
        report.commands[1].outcome,
        CommandOutcome::Skipped { reason: SkipReason::Cancelled }
    ));
    assert_eq!(mock.calls_for("node-1").len(), 1);
}

#[tokio::test]
async fn test_reconcile_end_to_end() {
    let mock = Arc::new(MockConnection::default());
    let reconciler = reconciler_over(mock.clone());

    let desired = desired_from(
        r#"{
            "resources": [
                { "name": "r1", "agent": "ocf:heartbeat:Dummy" },
                { "name": "r2", "agent": "ocf:heartbeat:Dummy" }
            ],
            "constraints": [
                { "type": "colocation", "id": "col-1", "resource": "r1", "with": "r2", "score": "INFINITY" }
            ]
        }"#,
    );
    let snapshot = parse_status_document(
        r#"{
            "clusterName": "prod",
            "dcHost": "node-1",
            "nodes": [ { "name": "node-1", "state": "online" } ]
        }"#,
    )
    .expect("status doc should parse");

    let hosts = vec![HostName::new("node-1"), HostName::new("node-2")];
    let report = reconciler
        .reconcile(&desired, &snapshot, &hosts, &CancellationToken::new())
        .await
        .expect("reconcile should run");

    assert!(report.is_clean());
    assert_eq!(report.succeeded(), 3);

    // The colocation welds r1 and r2 into one dependency component, so
    // every command lands on a single stream in delta order
    let lines = mock.calls_for("node-1");
    assert_eq!(
        lines,
        vec![
            "crm configure primitive r1 ocf:heartbeat:Dummy".to_string(),
            "crm configure primitive r2 ocf:heartbeat:Dummy".to_string(),
            "crm configure colocation col-1 inf: r1 r2".to_string(),
        ]
    );
    assert!(mock.calls_for("node-2").is_empty());
}

#[tokio::test]
async fn test_reconcile_filtered_skips_pending_parameter_changes() {
    let mock = Arc::new(MockConnection::default());
    let reconciler = reconciler_over(mock.clone());

    let desired = desired_from(
        r#"{
            "resources": [
                { "name": "vip", "agent": "ocf:heartbeat:Dummy", "params": { "ip": "10.0.0.5" } }
            ]
        }"#,
    );
    let snapshot = parse_status_document(
        r#"{
            "clusterName": "prod",
            "dcHost": "node-1",
            "nodes": [ { "name": "node-1", "state": "online" } ],
            "resources": [
                {
                    "id": "vip",
                    "agent": "ocf:heartbeat:Dummy",
                    "node": "node-1",
                    "role": "started",
                    "params": { "ip": "10.0.0.9" }
                }
            ]
        }"#,
    )
    .expect("status doc should parse");
    let hosts = vec![HostName::new("node-1")];

    // A change already dispatched but not yet visible in the snapshot is
    // not sent again
    let in_flight = HashSet::from([(ResourceName::new("vip"), "ip".to_string(), "10.0.0.5".to_string())]);
    let report = reconciler
        .reconcile_filtered(&desired, &snapshot, &in_flight, &hosts, &CancellationToken::new())
        .await
        .expect("filtered reconcile should run");

    assert!(report.commands.is_empty());
    assert!(mock.calls_for("node-1").is_empty());

    // Once nothing is pending any more, the drift is dispatched
    let report = reconciler
        .reconcile(&desired, &snapshot, &hosts, &CancellationToken::new())
        .await
        .expect("reconcile should run");

    assert_eq!(report.succeeded(), 1);
    assert_eq!(
        mock.calls_for("node-1"),
        vec!["crm_resource --resource vip --set-parameter ip --parameter-value 10.0.0.5".to_string()]
    );
}

#[tokio::test]
async fn test_reconcile_without_hosts() {
    let mock = Arc::new(MockConnection::default());
    let reconciler = reconciler_over(mock.clone());

    let desired = desired_from(
        r#"{
            "resources": [ { "name": "r1", "agent": "ocf:heartbeat:Dummy" } ]
        }"#,
    );
    let empty_desired = desired_from(r#"{ "resources": [] }"#);
    let snapshot = parse_status_document(
        r#"{
            "clusterName": "prod",
            "dcHost": null,
            "nodes": [ { "name": "node-1", "state": "online" } ]
        }"#,
    )
    .expect("status doc should parse");

    // A non-empty delta has nowhere to go
    let result = reconciler.reconcile(&desired, &snapshot, &[], &CancellationToken::new()).await;
    assert!(matches!(result, Err(Error::ValidationError(_))), "Expected ValidationError, got {:?}", result);

    // An empty delta needs no hosts at all
    let report = reconciler
        .reconcile(&empty_desired, &snapshot, &[], &CancellationToken::new())
        .await
        .expect("empty delta should apply");
    assert!(report.is_clean());
    assert!(report.commands.is_empty());
}
