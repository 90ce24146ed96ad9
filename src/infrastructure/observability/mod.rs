//! Observability infrastructure - Prometheus metrics

mod metrics;

pub use self::metrics::{
    create_metrics_router, init_metrics, record_gate_outcome, record_http_request,
    record_rate_limit_sweep, record_usage_failure, PrometheusMetrics,
};
