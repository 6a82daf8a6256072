use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use carelith_core::{CoreConfig, PortalService};

/// Main entry point for the Carelith portal
///
/// Resolves configuration once, wires the portal service and serves the REST API
/// (with Swagger UI at `/swagger-ui`).
///
/// # Environment Variables
/// - `CARELITH_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `API_KEY`: key every REST caller must send in `x-api-key`
/// - `CARELITH_*`: portal configuration, see [`CoreConfig::from_lookup`]
///
/// The portal is built before the async runtime starts: its HTTP clients for the remote document
/// service and SMS gateway are blocking clients and may not be created inside a runtime.
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("carelith=info".parse()?)
                .add_directive("carelith_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("CARELITH_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let api_key = std::env::var("API_KEY")
        .map_err(|_| anyhow::anyhow!("API_KEY must be set to serve the REST API"))?;

    let cfg = Arc::new(CoreConfig::from_lookup(|key| std::env::var(key).ok())?);
    let portal = PortalService::open(cfg)?;

    let app = router(AppState {
        portal,
        api_key: Arc::from(api_key),
    });

    tracing::info!("++ Starting Carelith REST on {}", rest_addr);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
        axum::serve(listener, app).await?;
        Ok::<_, anyhow::Error>(())
    })?;

    Ok(())
}
