use std::sync::Arc;

use color_eyre::eyre::Result;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use nonce_counter::config::Config;
use nonce_counter::decoder::AbiDecoder;
use nonce_counter::report::LogReporter;
use nonce_counter::sync::{HttpTransport, NonceCounter};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = Config::read()?;
    config.counter.validate()?;

    let transport = Arc::new(HttpTransport::new(&config.rpc)?);
    let decoder = Arc::new(AbiDecoder::from_config(&config.counter)?);
    let token = CancellationToken::new();

    let counter = NonceCounter::new(
        &config,
        transport,
        decoder,
        Arc::new(LogReporter),
        token.clone(),
    )?;

    // spawn the counter and track it
    let tracker = TaskTracker::new();
    tracker.spawn(counter.run());

    // termination handling
    signal::ctrl_c().await?;
    token.cancel();
    tracker.close();
    tracker.wait().await;

    info!("graceful shutdown achieved. Closing");

    Ok(())
}

fn setup() -> Result<()> {
    color_eyre::install()?;

    let filter = EnvFilter::from_default_env();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NEW)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
