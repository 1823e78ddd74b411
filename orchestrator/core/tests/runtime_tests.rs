// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Runtime contract tests: spawn validation, steer/stop error taxonomy,
//! durable history and the built-in agent variants working together.

mod common;

use common::{eventually, test_registry};
use research_hub_core::application::AgentRegistry;
use research_hub_core::domain::agent::{AgentId, AgentSpec, AgentStatus};
use research_hub_core::domain::collaborators::Collaborators;
use research_hub_core::domain::entry::{EntryType, Scope, Steer, SteerUrgency};
use research_hub_core::domain::events::HubEvent;
use research_hub_core::domain::runtime::RuntimeError;
use research_hub_core::infrastructure::llm::ModelCatalog;
use research_hub_core::infrastructure::store::StoreFactory;
use research_hub_core::infrastructure::AlertDesk;
use research_hub_core::{EventRelay, Route, Runtime};
use std::sync::Arc;
use std::time::Duration;

const GRACE: Duration = Duration::from_secs(2);
const WAIT: Duration = Duration::from_secs(10);

fn recorder_runtime() -> Runtime {
    Runtime::builder().registry(test_registry()).build()
}

#[tokio::test]
async fn test_steer_unknown_vs_terminated() {
    let runtime = recorder_runtime();

    let never_spawned = AgentId::new();
    assert!(matches!(
        runtime.steer(never_spawned, Steer::high("hello", "ui")),
        Err(RuntimeError::UnknownAgent(id)) if id == never_spawned
    ));

    let agent = runtime.spawn(AgentSpec::new("recorder")).unwrap();
    runtime.stop(agent, GRACE).await.unwrap();
    assert!(matches!(
        runtime.steer(agent, Steer::high("too late", "ui")),
        Err(RuntimeError::AgentTerminated(id)) if id == agent
    ));
}

#[tokio::test]
async fn test_unhandled_steer_is_reported_dropped_at_stop() {
    let runtime = recorder_runtime();
    runtime.start();
    let agent = runtime.spawn(AgentSpec::new("recorder")).unwrap();

    runtime.pause(agent).unwrap();
    assert!(eventually(WAIT, || async { runtime.status(agent) == Some(AgentStatus::Paused) }).await);
    assert!(runtime
        .steer(agent, Steer::high("switch to the cleaned dataset", "ui"))
        .unwrap()
        .is_accepted());
    runtime.stop(agent, GRACE).await.unwrap();

    assert!(eventually(WAIT, || async {
        runtime.relay().history().iter().any(|e| {
            matches!(
                &e.event,
                HubEvent::SteerDropped { agent_id, urgency: SteerUrgency::High, .. } if *agent_id == agent
            )
        })
    })
    .await);
    assert!(!runtime
        .history(agent)
        .unwrap()
        .iter()
        .any(|e| e.payload["steer"] == "switch to the cleaned dataset"));
    assert!(matches!(
        runtime.steer(agent, Steer::high("again", "ui")),
        Err(RuntimeError::AgentTerminated(_))
    ));

    runtime.shutdown(GRACE).await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let runtime = recorder_runtime();
    let agent = runtime.spawn(AgentSpec::new("recorder")).unwrap();
    assert_eq!(runtime.status(agent), Some(AgentStatus::Running));

    runtime.stop(agent, GRACE).await.unwrap();
    assert_eq!(runtime.status(agent), Some(AgentStatus::Stopped));
    runtime.stop(agent, GRACE).await.unwrap();
    assert_eq!(runtime.status(agent), Some(AgentStatus::Stopped));

    assert!(matches!(
        runtime.stop(AgentId::new(), GRACE).await,
        Err(RuntimeError::UnknownAgent(_))
    ));
}

#[tokio::test]
async fn test_spawn_validation_registers_nothing() {
    let runtime = recorder_runtime();

    assert!(matches!(
        runtime.spawn(AgentSpec::new("does-not-exist")),
        Err(RuntimeError::SpawnValidation(_))
    ));
    assert!(matches!(
        runtime.spawn(AgentSpec::new("recorder").with_parent(AgentId::new())),
        Err(RuntimeError::SpawnValidation(_))
    ));
    assert!(runtime.agents().is_empty());
    assert!(runtime.relay().is_empty());

    let parent = runtime.spawn(AgentSpec::new("recorder")).unwrap();
    let child = runtime
        .spawn(AgentSpec::new("recorder").with_parent(parent).with_name("child"))
        .unwrap();
    let names: Vec<_> = runtime.agents().into_iter().map(|a| a.info.name).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"child".to_string()));
    assert_ne!(parent, child);

    runtime.shutdown(GRACE).await;
}

#[tokio::test]
async fn test_history_replays_from_file_store_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let stores = StoreFactory::File {
        root: dir.path().to_path_buf(),
    };

    let first = Runtime::builder()
        .registry(test_registry())
        .stores(stores.clone())
        .build();
    let agent = first.spawn(AgentSpec::new("recorder")).unwrap();
    let written: Vec<_> = (0..5)
        .map(|i| {
            first
                .route_message(agent, Route::Scope(Scope::Global), format!("note {i}"))
                .unwrap()
        })
        .collect();
    first.shutdown(GRACE).await;

    let second = Runtime::builder().registry(test_registry()).stores(stores).build();
    assert_eq!(second.history(agent).unwrap(), written);
    assert!(matches!(
        second.history(AgentId::new()),
        Err(RuntimeError::UnknownAgent(_))
    ));
}

#[tokio::test]
async fn test_subtree_messages_reach_descendants_only() {
    let runtime = recorder_runtime();
    runtime.start();
    let root = runtime.spawn(AgentSpec::new("recorder")).unwrap();
    let child = runtime.spawn(AgentSpec::new("recorder").with_parent(root)).unwrap();
    let outsider = runtime.spawn(AgentSpec::new("recorder")).unwrap();

    let directive = runtime
        .route_message(root, Route::Scope(Scope::Subtree), "use the new tokenizer")
        .unwrap();

    let child_view = runtime.view(child).unwrap();
    assert!(eventually(WAIT, || async {
        child_view.recent(10, None).iter().any(|e| e.id == directive.id)
    })
    .await);
    assert!(runtime
        .view(outsider)
        .unwrap()
        .recent(10, None)
        .iter()
        .all(|e| e.id != directive.id));

    runtime.shutdown(GRACE).await;
}

#[tokio::test]
async fn test_failed_child_reports_error_to_parent() {
    let runtime = recorder_runtime();
    runtime.start();
    let parent = runtime.spawn(AgentSpec::new("recorder")).unwrap();
    let child = runtime.spawn(AgentSpec::new("faulty").with_parent(parent)).unwrap();

    assert!(eventually(WAIT, || async { runtime.status(child) == Some(AgentStatus::Failed) }).await);

    let view = runtime.view(parent).unwrap();
    let errors = view.recent(
        10,
        Some(
            &research_hub_core::application::EntryFilter::new()
                .with_types([EntryType::Error])
                .from_author(child),
        ),
    );
    assert_eq!(errors.len(), 1);
    assert!(errors[0].payload["error"]
        .as_str()
        .unwrap()
        .contains("division by zero"));

    runtime.shutdown(GRACE).await;
}

#[cfg(unix)]
#[tokio::test]
async fn test_orchestrator_retries_and_aggregates() {
    let runtime = Runtime::builder()
        .registry(AgentRegistry::with_builtin(ModelCatalog::new()))
        .build();
    runtime.start();

    let plan = serde_json::json!({
        "children": [
            {"kind": "executor", "name": "ok-run", "params": {"command": "sh", "args": ["-c", "echo trained"]}},
            {"kind": "executor", "name": "bad-run", "params": {"command": "sh", "args": ["-c", "exit 7"]}}
        ],
        "directive": "report when finished",
        "max_attempts": 2
    });
    let orchestrator = runtime
        .spawn(AgentSpec::new("orchestrator").with_params(plan))
        .unwrap();

    assert!(eventually(WAIT, || async {
        runtime.status(orchestrator) == Some(AgentStatus::Done)
    })
    .await);

    // Two children plus one retry of the failing one
    let executors = runtime
        .agents()
        .into_iter()
        .filter(|a| a.info.kind == "executor")
        .count();
    assert_eq!(executors, 3);

    let history = runtime.history(orchestrator).unwrap();
    let result = history
        .iter()
        .find(|e| e.entry_type == EntryType::Result)
        .unwrap();
    assert_eq!(result.payload["succeeded"], 1);
    assert_eq!(result.payload["total"], 2);
    assert!(history
        .iter()
        .any(|e| e.content() == Some("report when finished")));

    runtime.shutdown(GRACE).await;
}

#[tokio::test]
async fn test_scripted_research_agent_spawns_and_finishes() {
    let runtime = Runtime::builder()
        .registry(AgentRegistry::with_builtin(ModelCatalog::new()))
        .build();
    runtime.start();

    let script = serde_json::json!([
        {"action": "message", "content": "hypothesis: warmup matters", "scope": "GLOBAL"},
        {"action": "spawn", "spec": {"kind": "research", "name": "helper", "params": {
            "goal": "check warmup", "script": [{"action": "finish", "reflection": "warmup matters"}]
        }}},
        {"action": "finish", "reflection": "done exploring"}
    ]);
    let lead = runtime
        .spawn(AgentSpec::new("research").with_params(serde_json::json!({
            "goal": "understand warmup",
            "script": script
        })))
        .unwrap();

    assert!(eventually(WAIT, || async {
        runtime.agents().iter().all(|a| a.status.is_terminal()) && runtime.agents().len() == 2
    })
    .await);

    let snapshots = runtime.agents();
    let helper = snapshots.iter().find(|a| a.info.name == "helper").unwrap();
    assert_eq!(helper.info.parent, Some(lead));
    assert_eq!(helper.status, AgentStatus::Done);

    assert!(eventually(WAIT, || async {
        runtime.relay().history().iter().any(|e| matches!(
            &e.event,
            HubEvent::AgentDone { agent_id, reflection } if *agent_id == lead && reflection == "done exploring"
        ))
    })
    .await);

    runtime.shutdown(GRACE).await;
}

#[tokio::test]
async fn test_sidecar_alert_answered_with_stop() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("train.log");
    std::fs::write(&log, "step 1 loss=2.3\n").unwrap();

    let relay = EventRelay::with_default_capacity();
    let desk = Arc::new(AlertDesk::new(relay.clone()));
    let runtime = Runtime::builder()
        .registry(AgentRegistry::with_builtin(ModelCatalog::new()))
        .relay(relay)
        .collaborators(Collaborators::detached().with_alerts(desk.clone()))
        .build();
    runtime.start();

    let sidecar = runtime
        .spawn(AgentSpec::new("sidecar").with_job("job-42").with_params(serde_json::json!({
            "log_path": log,
            "patterns": [{"pattern": "loss=nan", "message": "loss diverged", "severity": "critical"}],
            "wait_for_response_secs": 30
        })))
        .unwrap();

    std::fs::write(&log, "step 1 loss=2.3\nstep 2 loss=nan\n").unwrap();
    assert!(eventually(WAIT, || async { !desk.pending().await.is_empty() }).await);

    let alert = desk.pending().await.remove(0);
    assert_eq!(alert.job_id, "job-42");
    assert_eq!(alert.message, "loss diverged");
    assert!(desk.respond(&alert.alert_id, "stop").await);

    assert!(eventually(WAIT, || async { runtime.status(sidecar) == Some(AgentStatus::Done) }).await);
    runtime.shutdown(GRACE).await;
}
