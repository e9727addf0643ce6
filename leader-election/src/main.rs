use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use leader_election::config::Config;
use leader_election::modules::ModuleRegistry;
use leader_election::server::{app, serve, setup_metrics_recorder, setup_metrics_routes};
use leader_election::ReadyzAdaptor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_with_defaults().context("invalid configuration")?;

    let log_layer = {
        let base_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true);

        if config.debug {
            base_layer
                .with_ansi(true)
                .with_filter(EnvFilter::from_default_env())
                .boxed()
        } else {
            base_layer
                .json()
                .with_filter(EnvFilter::from_default_env())
                .boxed()
        }
    };
    tracing_subscriber::registry().with(log_layer).init();

    let readyz = Arc::new(ReadyzAdaptor::new());

    let recorder = setup_metrics_recorder().context("failed to install metrics recorder")?;
    let router = setup_metrics_routes(app(readyz.clone()), recorder);
    let bind = config.bind_address();
    info!(bind = %bind, "starting health server");
    tokio::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!(error = %e, "health server exited");
        }
    });

    let reason = leader_election::run(&config, readyz, ModuleRegistry::new()).await?;
    info!(reason = %reason, "exiting");

    Ok(())
}
