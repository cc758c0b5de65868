//! The HTTPS face of the server: just the RFC8484 DoH endpoint. The tenant
//! management API lives outside the core.

use std::io::Error;
use std::sync::Arc;

use axum::Router;
use concread::cowcell::asynch::CowCellReadTxn;
use tracing::{error, info};

use crate::config::ConfigFile;
use crate::query::QueryEngine;

pub mod doh;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct WebState {
    pub engine: Arc<QueryEngine>,
}

pub fn build_router(engine: Arc<QueryEngine>) -> Router {
    Router::new()
        .nest("/dns-query", doh::new())
        .with_state(WebState { engine })
}

/// Serve DoH until the process ends.
pub async fn doh_server(
    config: CowCellReadTxn<ConfigFile>,
    engine: Arc<QueryEngine>,
) -> Result<(), Error> {
    let addr = config
        .doh_listener_address()
        .map_err(|e| Error::other(format!("{e}")))?;
    let tls_config = config.get_doh_tls_config().await?;
    let app = build_router(engine);
    info!("Started DoH listener on {addr}");
    if let Err(err) = axum_server::bind_rustls(addr, tls_config)
        .serve(app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .await
    {
        error!("DoH server exited: {err:?}");
        return Err(err);
    }
    Ok(())
}
