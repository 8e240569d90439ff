//! Metrics for the bridge, recorded through the `metrics` facade
//!
//! Nothing is exported from here; the embedding process installs whatever
//! recorder it uses.

use metrics::{counter, describe_counter};

pub const GATEWAY_CALLS: &str = "gateway.calls.total";
pub const GATEWAY_FLUSHES: &str = "gateway.flushes.total";
pub const GATEWAY_CHANGES_EMITTED: &str = "gateway.changes.emitted";
pub const PROXY_UPDATES_SKIPPED: &str = "proxy.updates.skipped";
pub const PROXY_EVENTS_DROPPED: &str = "proxy.events.dropped";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(GATEWAY_CALLS, "Remote calls served by the gateway");
    describe_counter!(GATEWAY_FLUSHES, "Debounce windows flushed by the gateway");
    describe_counter!(
        GATEWAY_CHANGES_EMITTED,
        "Keys published in change events"
    );
    describe_counter!(
        PROXY_UPDATES_SKIPPED,
        "Empty update requests the proxy did not transmit"
    );
    describe_counter!(
        PROXY_EVENTS_DROPPED,
        "Malformed change events dropped by the proxy"
    );
}

/// Count one served call, labelled by command
pub fn record_call(command: &'static str) {
    counter!(GATEWAY_CALLS, "command" => command).increment(1);
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}
