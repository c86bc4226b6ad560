use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

pub static EVENTS_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "realtime_hub_events_published_total",
        "Live events published, by topic family",
        &["family"]
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

pub static EVENTS_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "realtime_hub_events_delivered_total",
        "Live events enqueued to a connection"
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

pub static EVENTS_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "realtime_hub_events_dropped_total",
        "Live events dropped for a connection",
        &["reason"]
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

pub static LIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "realtime_hub_live_connections",
        "Currently registered live connections"
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

pub static MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "realtime_hub_messages_sent_total",
        "Messages persisted, by channel",
        &["channel"]
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

/// Render the default registry in the text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_counters() {
        MESSAGES_SENT.with_label_values(&["conversation"]).inc();
        let text = render();
        assert!(text.contains("realtime_hub_messages_sent_total"));
    }
}
