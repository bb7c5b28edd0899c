//! End-to-end reliability scenarios driven through the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use larder_foundation::{
    CircuitBreakerConfig, CircuitState, ExecutionError, ExecutionManager, ExecutionStatus,
    HistoryQuery, Orchestrator, RetryPolicy, RunOptions,
};
use larder_kernel::AgentKind;
use larder_testing::ScriptedWork;
use serde_json::json;

fn orchestrator_with(config: CircuitBreakerConfig) -> Orchestrator {
    Orchestrator::new(Arc::new(ExecutionManager::with_breaker_config(config, 1000)))
}

fn no_jitter(max_retries: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_retries(max_retries)
        .with_jitter(false)
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_to_success() {
    let orchestrator = orchestrator_with(CircuitBreakerConfig::default());
    let work = ScriptedWork::new(2, "connection reset by peer");
    let began = tokio::time::Instant::now();

    let result = orchestrator
        .run(
            AgentKind::RecipeSearch,
            "weeknight-dinner",
            RunOptions::default().with_retry_policy(no_jitter(2)),
            || work.attempt(),
        )
        .await
        .unwrap();

    assert_eq!(result, 2);
    assert_eq!(work.calls(), 3);
    // backoff suspensions of 2s and 4s separated the three attempts
    assert_eq!(began.elapsed(), Duration::from_secs(6));

    let manager = orchestrator.manager();
    let history = manager.history(HistoryQuery::default()).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExecutionStatus::Success);
    assert_eq!(history[0].retry_count, 2);

    // one success was recorded against the breaker: closed, zero failures
    let snapshots = manager.breaker_snapshots().await;
    let breaker = &snapshots[&AgentKind::RecipeSearch];
    assert_eq!(breaker.state, CircuitState::Closed);
    assert_eq!(breaker.failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn unauthorized_errors_are_never_retried() {
    let orchestrator = orchestrator_with(CircuitBreakerConfig::default());
    let work = ScriptedWork::always_failing("unauthorized: key revoked for pantry-user");
    let began = tokio::time::Instant::now();

    let error = orchestrator
        .run(
            AgentKind::NutritionCheck,
            "count-macros",
            RunOptions::default().with_retry_policy(no_jitter(3)),
            || work.attempt(),
        )
        .await
        .unwrap_err();

    // no delay was awaited, the work ran once, and the caller sees the
    // original error text
    assert_eq!(began.elapsed(), Duration::ZERO);
    assert_eq!(work.calls(), 1);
    assert_eq!(error.to_string(), "unauthorized: key revoked for pantry-user");

    let history = orchestrator.manager().history(HistoryQuery::default()).await;
    assert_eq!(history[0].status, ExecutionStatus::Error);
    assert_eq!(history[0].retry_count, 0);
}

#[tokio::test]
async fn breaker_trips_rejects_and_recovers() {
    let orchestrator = orchestrator_with(
        CircuitBreakerConfig::default()
            .with_failure_threshold(2)
            .with_reset_timeout(Duration::from_millis(50)),
    );
    let manager = orchestrator.manager().clone();

    for _ in 0..2 {
        let failing = ScriptedWork::always_failing("recipe api 503");
        let _ = orchestrator
            .run(
                AgentKind::RecipeSearch,
                "search",
                RunOptions::default().with_retry_policy(RetryPolicy::no_retry()),
                || failing.attempt(),
            )
            .await;
    }
    assert_eq!(
        manager.breaker_state(AgentKind::RecipeSearch).await,
        Some(CircuitState::Open)
    );

    // rejected fast, without invoking the work
    let untouched = ScriptedWork::new(0, "");
    let rejected = orchestrator
        .run(
            AgentKind::RecipeSearch,
            "search",
            RunOptions::default(),
            || untouched.attempt(),
        )
        .await;
    assert!(matches!(rejected, Err(ExecutionError::CircuitOpen { .. })));
    assert_eq!(untouched.calls(), 0);

    // after the reset timeout a probe is admitted and recovery closes it
    tokio::time::sleep(Duration::from_millis(80)).await;
    let probe = ScriptedWork::new(0, "");
    orchestrator
        .run(
            AgentKind::RecipeSearch,
            "search",
            RunOptions::default().with_retry_policy(RetryPolicy::no_retry()),
            || probe.attempt(),
        )
        .await
        .unwrap();
    assert_eq!(
        manager.breaker_state(AgentKind::RecipeSearch).await,
        Some(CircuitState::Closed)
    );
}

#[tokio::test]
async fn rejected_executions_leave_no_trace() {
    let orchestrator = orchestrator_with(CircuitBreakerConfig::default().with_failure_threshold(1));
    let failing = ScriptedWork::always_failing("ocr api 500");
    let _ = orchestrator
        .run(
            AgentKind::ReceiptOcr,
            "scan",
            RunOptions::default().with_retry_policy(RetryPolicy::no_retry()),
            || failing.attempt(),
        )
        .await;

    let manager = orchestrator.manager();
    let history_before = manager.history(HistoryQuery::default()).await.len();
    let failures_before = manager.breaker_snapshots().await[&AgentKind::ReceiptOcr].failure_count;

    let rejected = orchestrator
        .run(AgentKind::ReceiptOcr, "scan", RunOptions::default(), || async {
            Ok(())
        })
        .await;
    assert!(rejected.is_err());

    assert_eq!(manager.history(HistoryQuery::default()).await.len(), history_before);
    assert_eq!(
        manager.breaker_snapshots().await[&AgentKind::ReceiptOcr].failure_count,
        failures_before
    );
}

#[tokio::test]
async fn manual_span_carries_the_diagnostic_trail() {
    let orchestrator = orchestrator_with(CircuitBreakerConfig::default());
    let manager = orchestrator.manager().clone();

    let ctx = orchestrator
        .span(
            AgentKind::MealPlanner,
            "plan-week",
            RunOptions::default()
                .with_user_id("user-17")
                .with_input(json!({"pantry_token": "abc123", "servings": 4})),
        )
        .await
        .unwrap();

    ctx.add_decision_point("skip-fish", "user disliked last salmon plan", Some(0.8), None);
    ctx.record_tool_usage(
        "recipe_search",
        0.3,
        true,
        Some(&json!({"query": "vegetarian"})),
        None,
    );
    ctx.add_token_usage("gpt-4o-mini", 900, 150);

    // while active, the debug view exposes the sanitized trail
    match manager.debug_execution(ctx.id()).await {
        larder_foundation::DebugView::Active(snapshot) => {
            let input = snapshot.sanitized_input.as_ref().unwrap();
            assert_eq!(input["pantry_token"], "***REDACTED***");
            assert_eq!(input["servings"], 4);
            assert_eq!(snapshot.decision_log.len(), 1);
            assert_eq!(snapshot.tool_usage.len(), 1);
        }
        other => panic!("expected an active execution, got {other:?}"),
    }

    ctx.succeed();
    orchestrator.finish(&ctx).await;

    // once completed, only the reduced projection survives
    match manager.debug_execution(ctx.id()).await {
        larder_foundation::DebugView::Completed(entry) => {
            assert_eq!(entry.decision_count, 1);
            assert_eq!(entry.tool_call_count, 1);
            assert_eq!(entry.token_usage.completion_tokens, 150);
        }
        other => panic!("expected a completed execution, got {other:?}"),
    }
}

#[tokio::test]
async fn metrics_cover_the_full_run() {
    let orchestrator = orchestrator_with(CircuitBreakerConfig::default());
    let work = ScriptedWork::new(1, "search api 502");

    orchestrator
        .run(
            AgentKind::RecipeSearch,
            "dinner",
            RunOptions::default().with_retry_policy(
                no_jitter(1).with_base_delay(Duration::from_millis(1)),
            ),
            || work.attempt(),
        )
        .await
        .unwrap();

    let snapshot = orchestrator.manager().metrics().snapshot();
    let text = larder_foundation::metrics::render_prometheus(&snapshot);

    assert!(text.contains(
        "larder_executions_total{agent=\"recipe_search\",status=\"success\",task=\"dinner\"} 1"
    ));
    assert!(text.contains("larder_retries_total{agent=\"recipe_search\",reason=\"error\"} 1"));
    assert!(text.contains("larder_circuit_breaker_state{agent=\"recipe_search\"} 0"));
    assert!(text.contains("larder_queue_depth{agent=\"recipe_search\"} 0"));
    assert!(text.contains("larder_execution_duration_seconds_count"));
}
