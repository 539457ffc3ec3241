//! Web server module.
//!
//! Exposes a liveness check, raw read-through of both record files, an
//! audit report and a webhook that feeds commands into the dispatcher.

mod error;
mod routes;

use std::future::Future;

use tokio::net::TcpListener;
use tracing::info;

pub use error::{WebError, WebResult};
pub use routes::{AppState, WebhookRequest, router};

/// Serves the router on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Web server listening on {}", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
