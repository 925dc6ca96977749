use super::*;
use crate::graph::{Edge, WorkloadGraph, WorkloadNode, UNKNOWN_WORKLOAD};
use crate::health::{Component, ComponentStatus};
use crate::testing::FakeMesh;
use crate::thresholds::ResourceThreshold;
use tracing_test::traced_test;

/// unknown -> a -> b, 50 in flight from a to b
fn chain_graph(ingress_throughput: i64) -> WorkloadGraph {
    WorkloadGraph::from_nodes([
        WorkloadNode::new("n0", UNKNOWN_WORKLOAD)
            .with_edge(Edge::new("n1", ingress_throughput.to_string(), "1")),
        WorkloadNode::new("n1", "a").with_edge(Edge::new("n2", "25", "2")),
        WorkloadNode::new("n2", "b"),
    ])
}

/// Mesh where `a` runs at `cpu` cores on 2 replicas and `b` has 2 replicas
fn mesh(ingress_throughput: i64, cpu: f64) -> FakeMesh {
    FakeMesh::new()
        .with_graph(chain_graph(ingress_throughput))
        .with_deployment("a", 2)
        .with_deployment("b", 2)
        .with_pod("a-6f7d-x1", &[(cpu, 1000.0)])
        .with_pod("b-8c2e-y1", &[(0.1, 1000.0)])
}

fn thresholds() -> ThresholdConfig {
    ThresholdConfig::new(100).with_resource("a", ResourceThreshold::new(0.5, 0.0))
}

fn build(mesh: &Arc<FakeMesh>, health: Option<HealthRegistry>) -> ControlLoop {
    let mut builder = ControlLoop::builder()
        .graph_source(mesh.clone())
        .metrics_source(mesh.clone())
        .cluster(mesh.clone())
        .thresholds(Arc::new(thresholds()))
        .queue_thresholds(Arc::new(QueueLengthThresholds::new().with("b", 5.0)))
        .namespace("shop")
        .interval(Duration::from_millis(20))
        .metrics(ScalerMetrics::new());
    if let Some(health) = health {
        builder = builder.health(health);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn test_no_violation_issues_no_scale_calls() {
    let mesh = Arc::new(mesh(150, 0.2));
    let control = build(&mesh, None);

    let report = control.run_cycle().await.unwrap();

    assert_eq!(report, CycleReport::NoViolation);
    assert!(mesh.scale_calls().is_empty());
}

#[tokio::test]
async fn test_resource_violation_scales_base_and_downstream() {
    let mesh = Arc::new(mesh(150, 1.0));
    let control = build(&mesh, None);

    let CycleReport::Triggered(summary) = control.run_cycle().await.unwrap() else {
        panic!("expected a triggered cycle");
    };

    assert!(summary.resource_violation);
    assert!(!summary.throughput_violation);
    assert_eq!(summary.base.len(), 1);
    assert_eq!(summary.applied(), 2);
    assert_eq!(
        mesh.scale_calls(),
        vec![("a".to_string(), 4), ("b".to_string(), 6)]
    );
    assert_eq!(mesh.replicas("b"), Some(6));
}

#[tokio::test]
async fn test_throughput_violation_without_base_deployments() {
    let mesh = Arc::new(mesh(80, 0.2));
    let control = build(&mesh, None);

    let CycleReport::Triggered(summary) = control.run_cycle().await.unwrap() else {
        panic!("expected a triggered cycle");
    };

    assert!(summary.throughput_violation);
    assert!(summary.base.is_empty());
    assert!(summary.plan.is_empty());
    assert!(mesh.scale_calls().is_empty());
}

#[tokio::test]
async fn test_failed_scale_does_not_stop_plan() {
    let mesh = Arc::new(mesh(150, 1.0).with_failing_scale("a"));
    let health = HealthRegistry::new();
    let control = build(&mesh, Some(health.clone()));

    let CycleReport::Triggered(summary) = control.run_cycle().await.unwrap() else {
        panic!("expected a triggered cycle");
    };

    assert_eq!(summary.failed, vec!["a".to_string()]);
    assert_eq!(summary.applied(), 1);
    assert_eq!(mesh.scale_calls().len(), 2);
    assert_eq!(mesh.replicas("b"), Some(6));
    assert_eq!(
        health.status(Component::Cluster).await,
        ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_graph_error_aborts_cycle() {
    let mesh = Arc::new(mesh(150, 0.2));
    mesh.fail_graph(true);
    let health = HealthRegistry::new();
    let control = build(&mesh, Some(health.clone()));

    let result = control.run_cycle().await;

    assert!(matches!(result, Err(ScalerError::Graph(_))));
    assert!(mesh.scale_calls().is_empty());
    assert_eq!(
        health.status(Component::ControlLoop).await,
        ComponentStatus::Degraded
    );
    assert_eq!(
        health.status(Component::GraphSource).await,
        ComponentStatus::Degraded
    );

    // Next good cycle recovers
    mesh.fail_graph(false);
    tokio_test::assert_ok!(control.run_cycle().await);
    assert_eq!(
        health.status(Component::ControlLoop).await,
        ComponentStatus::Healthy
    );
}

#[tokio::test]
async fn test_cluster_health_recovers_after_listing_failure() {
    let mesh = Arc::new(mesh(150, 0.2));
    mesh.fail_listing(true);
    let health = HealthRegistry::new();
    let control = build(&mesh, Some(health.clone()));

    assert!(matches!(
        control.run_cycle().await,
        Err(ScalerError::Cluster(_))
    ));
    assert_eq!(
        health.status(Component::Cluster).await,
        ComponentStatus::Degraded
    );

    mesh.fail_listing(false);
    let report = control.run_cycle().await.unwrap();

    assert_eq!(report, CycleReport::NoViolation);
    assert_eq!(
        health.status(Component::Cluster).await,
        ComponentStatus::Healthy
    );
    assert_eq!(
        health.status(Component::ControlLoop).await,
        ComponentStatus::Healthy
    );
    assert_eq!(health.report().await.consecutive_aborts, 0);
}

#[traced_test]
#[tokio::test]
async fn test_both_checks_failing_reports_both_errors() {
    let mesh = Arc::new(mesh(150, 0.2));
    mesh.set_graph(WorkloadGraph::from_nodes([WorkloadNode::new("n1", "a")]));
    mesh.fail_listing(true);
    let control = build(&mesh, None);

    let result = control.run_cycle().await;

    assert!(matches!(result, Err(ScalerError::NoIngressNode)));
    assert!(logs_contain("Resource check failed as well"));
    assert!(mesh.scale_calls().is_empty());
}

#[tokio::test]
async fn test_missing_ingress_node_aborts_cycle() {
    let mesh = Arc::new(mesh(150, 0.2));
    mesh.set_graph(WorkloadGraph::from_nodes([WorkloadNode::new("n1", "a")]));
    let control = build(&mesh, None);

    assert!(matches!(
        control.run_cycle().await,
        Err(ScalerError::NoIngressNode)
    ));
    assert!(mesh.scale_calls().is_empty());
}

#[tokio::test]
async fn test_resource_signal_wins_over_failed_throughput_check() {
    let mesh = Arc::new(mesh(150, 1.0));
    // Drop the ingress node but keep a -> b for propagation
    let full = chain_graph(150);
    let without_ingress: Vec<_> = full.nodes().filter(|n| !n.is_unknown()).cloned().collect();
    mesh.set_graph(WorkloadGraph::from_nodes(without_ingress));
    let control = build(&mesh, None);

    let CycleReport::Triggered(summary) = control.run_cycle().await.unwrap() else {
        panic!("expected a triggered cycle");
    };

    assert!(summary.resource_violation);
    assert_eq!(summary.plan.len(), 2);
}

#[tokio::test]
async fn test_plan_once_does_not_scale() {
    let mesh = Arc::new(mesh(150, 1.0));
    let control = build(&mesh, None);

    let preview = control.plan_once().await.unwrap();

    assert_eq!(preview.plan.get("a"), Some(&4));
    assert_eq!(preview.plan.get("b"), Some(&6));
    assert!(mesh.scale_calls().is_empty());
}

#[tokio::test]
async fn test_run_cycles_until_shutdown() {
    let mesh = Arc::new(mesh(150, 0.2));
    let control = build(&mesh, None);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn(control.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(result, Err(ScalerError::Cancelled)));
    assert!(mesh.graph_fetches() > 0);
}

#[tokio::test]
async fn test_shutdown_before_first_tick() {
    let mesh = Arc::new(mesh(150, 0.2));
    let control = ControlLoop::builder()
        .graph_source(mesh.clone())
        .metrics_source(mesh.clone())
        .cluster(mesh.clone())
        .thresholds(Arc::new(thresholds()))
        .queue_thresholds(Arc::new(QueueLengthThresholds::new()))
        .interval(Duration::from_secs(3600))
        .build()
        .unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn(control.run(shutdown_rx));
    shutdown_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(matches!(result, Err(ScalerError::Cancelled)));
    assert_eq!(mesh.graph_fetches(), 0);
}

#[test]
fn test_builder_requires_collaborators() {
    let result = ControlLoop::builder()
        .thresholds(Arc::new(thresholds()))
        .build();

    assert!(matches!(result, Err(ScalerError::Config(_))));
}

#[test]
fn test_builder_rejects_zero_interval() {
    let mesh = Arc::new(FakeMesh::new());
    let result = ControlLoop::builder()
        .graph_source(mesh.clone())
        .metrics_source(mesh.clone())
        .cluster(mesh)
        .thresholds(Arc::new(thresholds()))
        .queue_thresholds(Arc::new(QueueLengthThresholds::new()))
        .interval(Duration::ZERO)
        .build();

    assert!(matches!(result, Err(ScalerError::Config(_))));
}
