use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUESTS: MetricDef = MetricDef {
    name: "requests",
    metric_type: MetricType::Counter,
    description: "Gateway requests handled. Tagged with route, status.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of requests currently being processed",
};

pub const UPSTREAM_DURATION: MetricDef = MetricDef {
    name: "upstream.duration",
    metric_type: MetricType::Histogram,
    description: "Time until SonarQube response headers arrive, in seconds. Tagged with route.",
};

pub const UPSTREAM_ERRORS: MetricDef = MetricDef {
    name: "upstream.errors",
    metric_type: MetricType::Counter,
    description: "SonarQube calls that failed at the transport level. Tagged with route.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUESTS,
    REQUESTS_INFLIGHT,
    UPSTREAM_DURATION,
    UPSTREAM_ERRORS,
];
