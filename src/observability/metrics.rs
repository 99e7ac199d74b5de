use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub events_in_queue: IntGauge,
    pub webhook_deliveries_total: IntCounterVec,
    pub webhook_delivery_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Delivery transitions by target and outcome"),
            &["target", "outcome"],
        )
        .expect("valid transitions_total metric");

        let events_in_queue = IntGauge::new(
            "events_in_queue",
            "Domain events waiting in the dispatch queue",
        )
        .expect("valid events_in_queue metric");

        let webhook_deliveries_total = IntCounterVec::new(
            Opts::new(
                "webhook_deliveries_total",
                "Webhook deliveries by final outcome",
            ),
            &["outcome"],
        )
        .expect("valid webhook_deliveries_total metric");

        let webhook_delivery_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "webhook_delivery_seconds",
                "Wall time of a webhook delivery including retries",
            ),
            &["outcome"],
        )
        .expect("valid webhook_delivery_seconds metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(events_in_queue.clone()))
            .expect("register events_in_queue");
        registry
            .register(Box::new(webhook_deliveries_total.clone()))
            .expect("register webhook_deliveries_total");
        registry
            .register(Box::new(webhook_delivery_seconds.clone()))
            .expect("register webhook_delivery_seconds");

        Self {
            registry,
            transitions_total,
            events_in_queue,
            webhook_deliveries_total,
            webhook_delivery_seconds,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
