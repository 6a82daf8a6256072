//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! Development and debugging. The workspace's main `carelith-run` binary serves the same router;
//! this one logs at debug level for the API crate.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use carelith_core::{CoreConfig, PortalService};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=debug".parse()?)
                .add_directive("carelith_core=info".parse()?)
                .add_directive("carelith::delivery=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CARELITH_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let api_key = std::env::var("API_KEY").map_err(|_| anyhow::anyhow!("API_KEY not set"))?;

    let cfg = Arc::new(CoreConfig::from_lookup(|key| std::env::var(key).ok())?);
    if !cfg.data_dir().exists() {
        anyhow::bail!("Data directory does not exist: {}", cfg.data_dir().display());
    }

    // Blocking HTTP clients are created here, before the runtime exists.
    let portal = PortalService::open(cfg)?;
    let app = router(AppState {
        portal,
        api_key: Arc::from(api_key),
    });

    tracing::info!("-- Starting Carelith REST API on {}", addr);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
            Ok::<_, anyhow::Error>(())
        })
}
