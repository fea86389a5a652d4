//! Prometheus metrics: bare counters/gauges, no HTTP surface.

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the process-wide Prometheus recorder and describes the SIP
/// counters/gauges. Does not bind a listener; nothing serves `/metrics`.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("install Prometheus recorder");

    describe_gauge!("sip_active_calls", "Number of currently active SIP calls");
    describe_gauge!("sip_registered_users", "Number of currently registered SIP users");
    describe_gauge!("sip_active_dialogues", "Number of currently tracked SIP dialogues");
    describe_counter!("sip_registrations_total", "Total number of SIP registrations");
    describe_counter!("sip_auth_failures_total", "Total number of failed SIP authentications");
    describe_counter!("sip_retransmits_total", "Total number of SIP transaction retransmits");

    handle
}

pub fn update_active_calls(count: usize) {
    gauge!("sip_active_calls").set(count as f64);
}

pub fn update_registered_users(count: usize) {
    gauge!("sip_registered_users").set(count as f64);
}

pub fn update_active_dialogues(count: usize) {
    gauge!("sip_active_dialogues").set(count as f64);
}

pub fn record_registration() {
    counter!("sip_registrations_total").increment(1);
}

pub fn record_auth_failure() {
    counter!("sip_auth_failures_total").increment(1);
}

pub fn record_retransmit() {
    counter!("sip_retransmits_total").increment(1);
}
