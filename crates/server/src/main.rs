//! callprobe: automated voice bot that calls and stress-tests an AI
//! phone agent with simulated patient personas.

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use callprobe_config::{load_settings, scenario_ids};
use callprobe_server::{create_router, resolve_public_url, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = load_settings().context("failed to load settings")?;
    if let Err(e) = settings.validate() {
        error!("{e}");
        error!("set the missing values as CALLPROBE_* environment variables or in callprobe.toml");
        std::process::exit(1);
    }

    let Some(public_url) = resolve_public_url(&settings).await else {
        error!(
            "no public URL available: start ngrok (ngrok http {}) or set CALLPROBE_SERVER__PUBLIC_URL",
            settings.server.port
        );
        std::process::exit(1);
    };

    let metrics = callprobe_server::metrics::init_metrics()
        .context("failed to install metrics recorder")?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = AppState::new(settings, public_url, metrics)?;

    info!(public_url = %state.public_url, "server ready");
    info!(scenarios = %scenario_ids().join(", "), "available scenarios");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
