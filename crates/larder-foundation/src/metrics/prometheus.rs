//! Prometheus text exposition rendering over collector snapshots.

use std::fmt::Write as _;

use super::MetricsSnapshot;

/// Render a snapshot into Prometheus text exposition format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::with_capacity(8 * 1024);

    write_metric_header(
        &mut out,
        "larder_executions_total",
        "Completed executions by agent, status and task",
        "counter",
    );
    for row in &snapshot.executions {
        append_line(
            &mut out,
            "larder_executions_total",
            &[
                ("agent", row.agent.as_str()),
                ("status", &row.status),
                ("task", &row.task),
            ],
            row.count as f64,
        );
    }

    write_metric_header(
        &mut out,
        "larder_execution_duration_seconds",
        "Execution duration by agent and task",
        "histogram",
    );
    for row in &snapshot.durations {
        for bucket in &row.buckets {
            let le = bucket
                .le
                .map(|bound| format!("{bound}"))
                .unwrap_or_else(|| "+Inf".to_string());
            append_line(
                &mut out,
                "larder_execution_duration_seconds_bucket",
                &[
                    ("agent", row.agent.as_str()),
                    ("task", &row.task),
                    ("le", &le),
                ],
                bucket.cumulative_count as f64,
            );
        }
        append_line(
            &mut out,
            "larder_execution_duration_seconds_sum",
            &[("agent", row.agent.as_str()), ("task", &row.task)],
            row.sum_seconds,
        );
        append_line(
            &mut out,
            "larder_execution_duration_seconds_count",
            &[("agent", row.agent.as_str()), ("task", &row.task)],
            row.count as f64,
        );
    }

    write_metric_header(
        &mut out,
        "larder_active_executions",
        "Currently running executions by agent",
        "gauge",
    );
    for row in &snapshot.active {
        append_line(&mut out, "larder_active_executions", &[("agent", row.agent.as_str())], row.value);
    }

    write_metric_header(
        &mut out,
        "larder_tokens_total",
        "LLM tokens consumed by agent, model and token type",
        "counter",
    );
    for row in &snapshot.tokens {
        append_line(
            &mut out,
            "larder_tokens_total",
            &[
                ("agent", row.agent.as_str()),
                ("model", &row.model),
                ("token_type", &row.token_type),
            ],
            row.count as f64,
        );
    }

    write_metric_header(
        &mut out,
        "larder_errors_total",
        "Errors by agent, kind and severity",
        "counter",
    );
    for row in &snapshot.errors {
        append_line(
            &mut out,
            "larder_errors_total",
            &[
                ("agent", row.agent.as_str()),
                ("kind", row.kind.as_str()),
                ("severity", &row.severity),
            ],
            row.count as f64,
        );
    }

    write_metric_header(
        &mut out,
        "larder_retries_total",
        "Retry attempts by agent and reason",
        "counter",
    );
    for row in &snapshot.retries {
        append_line(
            &mut out,
            "larder_retries_total",
            &[("agent", row.agent.as_str()), ("reason", &row.reason)],
            row.count as f64,
        );
    }

    write_metric_header(
        &mut out,
        "larder_circuit_breaker_state",
        "Circuit breaker state by agent (0=closed, 1=half-open, 2=open)",
        "gauge",
    );
    for row in &snapshot.breaker_states {
        append_line(&mut out, "larder_circuit_breaker_state", &[("agent", row.agent.as_str())], row.value);
    }

    write_metric_header(
        &mut out,
        "larder_queue_depth",
        "Admitted but not yet completed executions by agent",
        "gauge",
    );
    for row in &snapshot.queue_depths {
        append_line(&mut out, "larder_queue_depth", &[("agent", row.agent.as_str())], row.value);
    }

    out
}

fn write_metric_header(out: &mut String, name: &str, help: &str, metric_type: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {metric_type}");
}

fn append_line(out: &mut String, name: &str, labels: &[(&str, &str)], value: f64) {
    let _ = write!(out, "{name}");
    if !labels.is_empty() {
        let _ = write!(out, "{{");
        for (index, (key, val)) in labels.iter().enumerate() {
            if index > 0 {
                let _ = write!(out, ",");
            }
            let _ = write!(out, "{key}=\"{}\"", escape_label(val));
        }
        let _ = write!(out, "}}");
    }
    let _ = writeln!(out, " {value}");
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}
