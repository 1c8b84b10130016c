//! End-to-end orchestration against the in-memory stub runtime.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use convoy::config::ConvoyConfig;
use convoy::inventory::format_ports;
use convoy::lb::{ConfigStore, LbState};
use convoy::orchestrator::{Orchestrator, ReadinessGate};
use convoy::runtime::StubRuntime;

const STACK: &str = r#"
services:
  web:
    image: myapp:latest
    scale: 3
    expose: [80]
  worker:
    image: worker:latest

load_balancers:
  lb1:
    services:
      - name: web
    algorithm: least_conn
    port: 8080
"#;

fn stack() -> ConvoyConfig {
    ConvoyConfig::from_str(STACK, Path::new("convoy.yml")).unwrap()
}

fn orchestrator(
    config: ConvoyConfig,
    runtime: Arc<StubRuntime>,
) -> (Orchestrator, ConfigStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConfigStore::new(dir.path());
    let orch = Orchestrator::new(config, runtime)
        .with_store(store.clone())
        .with_gate(ReadinessGate::new(2, Duration::from_millis(1)));
    (orch, store, dir)
}

#[tokio::test]
async fn up_provisions_backends_and_proxy() {
    let runtime = Arc::new(StubRuntime::new());
    let (orch, store, _dir) = orchestrator(stack(), runtime.clone());

    let report = orch.up(None, false).await.unwrap();
    assert!(report.all_succeeded());
    assert_eq!(report.load_balancers.len(), 1);
    assert_eq!(report.load_balancers[0].state, LbState::Active);

    assert_eq!(
        runtime.container_names(),
        vec!["lb1", "web_1", "web_2", "web_3", "worker"]
    );

    // The rendered config lists every backend with the chosen algorithm.
    let text = std::fs::read_to_string(store.artifact_path("lb1")).unwrap();
    assert!(text.contains("upstream lb1 {"));
    assert!(text.contains("least_conn;"));
    assert!(text.contains("server web_1:80 weight=1;"));
    assert!(text.contains("server web_2:80 weight=1;"));
    assert!(text.contains("server web_3:80 weight=1;"));

    // The proxy publishes the configured port.
    let proxy = runtime.spec_of("lb1").unwrap();
    assert_eq!(proxy.published_ports, vec![(8080, 80)]);
}

#[tokio::test]
async fn up_then_down_leaves_nothing_behind() {
    let runtime = Arc::new(StubRuntime::new());
    let (orch, store, _dir) = orchestrator(stack(), runtime.clone());

    orch.up(None, false).await.unwrap();
    let report = orch.down(None).await.unwrap();

    assert!(report.all_succeeded());
    assert!(runtime.container_names().is_empty());
    assert!(!store.exists("lb1"));
}

#[tokio::test]
async fn down_is_idempotent() {
    let runtime = Arc::new(StubRuntime::new());
    let (orch, _store, _dir) = orchestrator(stack(), runtime);

    // Nothing was ever started; every item reports not-found, none fail.
    let report = orch.down(None).await.unwrap();
    assert!(report.all_succeeded());
}

#[tokio::test]
async fn targeted_down_leaves_other_services_and_lbs_alone() {
    let runtime = Arc::new(StubRuntime::new());
    let (orch, store, _dir) = orchestrator(stack(), runtime.clone());

    orch.up(None, false).await.unwrap();
    let report = orch.down(Some("worker")).await.unwrap();
    assert!(report.all_succeeded());
    assert!(report.load_balancers.is_empty());

    assert_eq!(
        runtime.container_names(),
        vec!["lb1", "web_1", "web_2", "web_3"]
    );
    assert!(store.exists("lb1"));
}

#[tokio::test]
async fn repeated_up_reuses_the_shared_network() {
    let runtime = Arc::new(StubRuntime::new());
    let (orch, _store, _dir) = orchestrator(stack(), runtime.clone());

    orch.up(None, false).await.unwrap();
    orch.down(None).await.unwrap();
    orch.up(None, false).await.unwrap();

    assert_eq!(runtime.network_create_count(), 1);
}

#[tokio::test]
async fn ps_groups_running_containers() {
    let runtime = Arc::new(StubRuntime::new());
    let (orch, _store, _dir) = orchestrator(stack(), runtime.clone());

    orch.up(None, false).await.unwrap();
    let inventory = orch.ps().await.unwrap();

    assert_eq!(inventory.services["web"].len(), 3);
    assert_eq!(inventory.services["worker"].len(), 1);
    assert_eq!(inventory.load_balancers.len(), 1);
    assert_eq!(format_ports(&inventory.load_balancers[0].ports), "8080->80");

    orch.down(None).await.unwrap();
    let inventory = orch.ps().await.unwrap();
    assert!(inventory.is_empty());
}

#[tokio::test]
async fn failed_lb_does_not_block_others() {
    let config = ConvoyConfig::from_str(
        r#"
services:
  web:
    image: a
    scale: 2
  api:
    image: b

load_balancers:
  lb_web:
    services: [{name: web}]
    port: 8080
  lb_api:
    services: [{name: api}]
    port: 8081
"#,
        Path::new("convoy.yml"),
    )
    .unwrap();

    let runtime = Arc::new(StubRuntime::new());
    runtime.fail_launch_of("lb_web", "port already allocated");
    let (orch, store, _dir) = orchestrator(config, runtime.clone());

    let report = orch.up(None, false).await.unwrap();
    assert!(!report.all_succeeded());

    let states: Vec<(String, LbState)> = report
        .load_balancers
        .iter()
        .map(|lb| (lb.name.clone(), lb.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("lb_web".to_string(), LbState::Failed),
            ("lb_api".to_string(), LbState::Active),
        ]
    );
    assert!(store.exists("lb_api"));
    assert!(!store.exists("lb_web"), "failed LB must not leave an artifact");
    assert!(runtime.container_names().contains(&"lb_api".to_string()));
}
