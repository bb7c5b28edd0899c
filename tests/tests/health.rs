//! Health reporting over live engine state.

use std::sync::Arc;

use larder_foundation::{
    CircuitBreakerConfig, ExecutionManager, HealthAggregator, HealthStatus, Orchestrator,
    RetryPolicy, RunOptions,
};
use larder_kernel::AgentKind;
use larder_testing::ScriptedWork;

fn setup(config: CircuitBreakerConfig) -> (Orchestrator, HealthAggregator) {
    let manager = Arc::new(ExecutionManager::with_breaker_config(config, 1000));
    (
        Orchestrator::new(manager.clone()),
        HealthAggregator::new(manager),
    )
}

async fn run_once(orchestrator: &Orchestrator, agent: AgentKind, work: &ScriptedWork) {
    let _ = orchestrator
        .run(
            agent,
            "task",
            RunOptions::default().with_retry_policy(RetryPolicy::no_retry()),
            || work.attempt(),
        )
        .await;
}

#[tokio::test]
async fn open_breaker_makes_the_system_unhealthy() {
    let (orchestrator, health) = setup(CircuitBreakerConfig::default().with_failure_threshold(2));

    let failing = ScriptedWork::always_failing("nutrition api 503");
    run_once(&orchestrator, AgentKind::NutritionCheck, &failing).await;
    run_once(&orchestrator, AgentKind::NutritionCheck, &failing).await;

    let agent = health.agent_health(AgentKind::NutritionCheck).await;
    assert_eq!(agent.status, HealthStatus::Unhealthy);
    assert_eq!(agent.error_breakdown.api, 2);

    let system = health.system_health().await;
    assert_eq!(system.status, HealthStatus::Unhealthy);
    assert!(
        system
            .warnings
            .iter()
            .any(|w| w.starts_with("nutrition_check:")),
        "warnings should name the failing agent: {:?}",
        system.warnings
    );
}

#[tokio::test]
async fn manual_reset_restores_health() {
    let (orchestrator, health) = setup(CircuitBreakerConfig::default().with_failure_threshold(1));

    let failing = ScriptedWork::always_failing("categorizer api 500");
    run_once(&orchestrator, AgentKind::Categorizer, &failing).await;
    assert_eq!(
        health.agent_health(AgentKind::Categorizer).await.status,
        HealthStatus::Unhealthy
    );

    orchestrator
        .manager()
        .reset_circuit_breaker(AgentKind::Categorizer)
        .await;

    // one failure remains in history but the breaker is closed again and the
    // sample is too small for the success-rate rule
    let agent = health.agent_health(AgentKind::Categorizer).await;
    assert_eq!(agent.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn low_success_rate_degrades_without_tripping_the_breaker() {
    let (orchestrator, health) = setup(CircuitBreakerConfig::default().with_failure_threshold(5));

    // alternate failures with successes so the breaker never opens
    for index in 0..7 {
        let work = if index % 2 == 0 {
            ScriptedWork::new(0, "")
        } else {
            ScriptedWork::always_failing("scorer api 500")
        };
        run_once(&orchestrator, AgentKind::PreferenceScorer, &work).await;
    }

    // 4 of 7 succeeded: rate below 0.8 over more than 5 samples
    let agent = health.agent_health(AgentKind::PreferenceScorer).await;
    assert_eq!(agent.status, HealthStatus::Degraded);
    assert!(agent.success_rate < 0.8);

    // degraded agents do not make the system unhealthy
    let system = health.system_health().await;
    assert_eq!(system.status, HealthStatus::Healthy);
    assert!(!system.warnings.is_empty());
}

#[tokio::test]
async fn untouched_agents_report_healthy() {
    let (_, health) = setup(CircuitBreakerConfig::default());
    let agent = health.agent_health(AgentKind::SubstitutionFinder).await;
    assert_eq!(agent.status, HealthStatus::Healthy);
    assert_eq!(agent.success_rate, 1.0);
    assert_eq!(agent.sample_size, 0);
}

#[tokio::test]
async fn health_window_bounds_the_sample() {
    let (orchestrator, _) = setup(CircuitBreakerConfig::default().with_failure_threshold(100));
    let manager = orchestrator.manager().clone();
    let health = HealthAggregator::new(manager).with_window(5);

    // ten old failures followed by five fresh successes
    for _ in 0..10 {
        let failing = ScriptedWork::always_failing("planner api 500");
        run_once(&orchestrator, AgentKind::MealPlanner, &failing).await;
    }
    for _ in 0..5 {
        let ok = ScriptedWork::new(0, "");
        run_once(&orchestrator, AgentKind::MealPlanner, &ok).await;
    }

    let agent = health.agent_health(AgentKind::MealPlanner).await;
    assert_eq!(agent.sample_size, 5);
    assert_eq!(agent.success_rate, 1.0);
    assert_eq!(agent.status, HealthStatus::Healthy);
}
