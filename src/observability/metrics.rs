use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub mutations_total: IntCounterVec,
    pub mutation_latency_seconds: HistogramVec,
    pub mutations_in_flight: IntGauge,
    pub working_set_size: IntGauge,
    pub store_write_failures_total: IntCounterVec,
    pub location_fixes_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let mutations_total = IntCounterVec::new(
            Opts::new("match_mutations_total", "Settled match mutations by action and outcome"),
            &["action", "outcome"],
        )
        .expect("valid match_mutations_total metric");

        let mutation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "match_mutation_latency_seconds",
                "Latency of match mutations in seconds",
            ),
            &["action"],
        )
        .expect("valid match_mutation_latency_seconds metric");

        let mutations_in_flight = IntGauge::new(
            "match_mutations_in_flight",
            "Mutations currently awaiting the server",
        )
        .expect("valid match_mutations_in_flight metric");

        let working_set_size = IntGauge::new("working_set_size", "Matches in the working set")
            .expect("valid working_set_size metric");

        let store_write_failures_total = IntCounterVec::new(
            Opts::new("store_write_failures_total", "Failed embedded store writes by operation"),
            &["op"],
        )
        .expect("valid store_write_failures_total metric");

        let location_fixes_total = IntCounterVec::new(
            Opts::new("location_fixes_total", "Locations attached to mutations by source"),
            &["source"],
        )
        .expect("valid location_fixes_total metric");

        registry
            .register(Box::new(mutations_total.clone()))
            .expect("register match_mutations_total");
        registry
            .register(Box::new(mutation_latency_seconds.clone()))
            .expect("register match_mutation_latency_seconds");
        registry
            .register(Box::new(mutations_in_flight.clone()))
            .expect("register match_mutations_in_flight");
        registry
            .register(Box::new(working_set_size.clone()))
            .expect("register working_set_size");
        registry
            .register(Box::new(store_write_failures_total.clone()))
            .expect("register store_write_failures_total");
        registry
            .register(Box::new(location_fixes_total.clone()))
            .expect("register location_fixes_total");

        Self {
            registry,
            mutations_total,
            mutation_latency_seconds,
            mutations_in_flight,
            working_set_size,
            store_write_failures_total,
            location_fixes_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
