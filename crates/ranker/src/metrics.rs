use anyhow::Result;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

pub fn describe() {
    describe_counter!(
        "ranker_transactions_loaded_total",
        "Transaction rows loaded into the row store."
    );
    describe_counter!(
        "ranker_balances_loaded_total",
        "Balance rows loaded into the row store."
    );
    describe_counter!(
        "ranker_wallets_scored_total",
        "Wallets scored, labelled by ranker."
    );
    describe_counter!(
        "ranker_schema_errors_total",
        "Metric tables skipped because an input column was missing."
    );
    describe_counter!(
        "ranker_api_requests_total",
        "Number of Helius API requests made."
    );
    describe_histogram!(
        "ranker_api_latency_ms",
        "Helius API request latency in milliseconds."
    );
    describe_gauge!(
        "ranker_model_holdout_mae",
        "Mean absolute error of the last model on its held-out split."
    );
    describe_counter!(
        common::observability::ERROR_EVENTS_COUNTER,
        "ERROR-level tracing events emitted."
    );
}

pub fn install_prometheus(port: u16) -> Result<PrometheusHandle> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    Ok(PrometheusBuilder::new()
        .with_http_listener(addr)
        .install_recorder()?)
}
