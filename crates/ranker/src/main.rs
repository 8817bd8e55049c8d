use anyhow::Result;

mod cli;
mod features;
mod fetch;
mod forest;
mod metric_engine;
mod metrics;
mod model_ranking;
mod preprocess;
mod report;
mod row_store;
mod weighted_ranking;

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let (dispatch, _otel_guard) =
        common::observability::build_dispatch("ranker", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let cmd = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;
    tracing::info!(command = ?cmd, "wallet ranker starting");

    cli::prepare_dirs(&config)?;

    if let Some(port) = config.prometheus_port() {
        metrics::install_prometheus(port)?;
        tracing::info!(port, "prometheus exporter listening");
    }
    metrics::describe();

    if let Err(e) = cli::run_command(&config, cmd).await {
        tracing::error!(error = %e, "command failed");
        return Err(e);
    }
    Ok(())
}
