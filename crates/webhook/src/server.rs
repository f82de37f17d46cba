//! HTTPS listener with periodic certificate reload.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::WebhookError;
use crate::{router, WebhookState};

/// Grace period for in-flight admission requests on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    /// Re-read the certificate pair this often so rotated secrets are picked up.
    /// `None` loads it once.
    pub cert_reload: Option<Duration>,
}

/// Serve the webhook until `shutdown` resolves, then drain gracefully.
pub async fn serve<F>(config: ServerConfig, state: Arc<WebhookState>, shutdown: F) -> Result<(), WebhookError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let tls = RustlsConfig::from_pem_file(&config.cert_file, &config.key_file)
        .await
        .map_err(WebhookError::Tls)?;

    let reloader = config.cert_reload.map(|every| {
        tokio::spawn(reload_certs(tls.clone(), config.cert_file.clone(), config.key_file.clone(), every))
    });

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.await;
            info!("shutting down webhook server gracefully");
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    info!(addr = %config.addr, "starting webhook server");
    let served = axum_server::bind_rustls(config.addr, tls)
        .handle(handle)
        .serve(router(state).into_make_service())
        .await;

    if let Some(task) = reloader {
        task.abort();
    }
    served.map_err(WebhookError::Serve)
}

async fn reload_certs(tls: RustlsConfig, cert_file: PathBuf, key_file: PathBuf, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // first tick completes immediately; the pair was just loaded
    ticker.tick().await;
    loop {
        ticker.tick().await;
        reload_once(&tls, &cert_file, &key_file).await;
    }
}

/// Swap in the pair on disk. On failure the previous pair keeps serving.
async fn reload_once(tls: &RustlsConfig, cert_file: &Path, key_file: &Path) -> bool {
    match tls.reload_from_pem_file(cert_file, key_file).await {
        Ok(()) => {
            debug!(cert = %cert_file.display(), "reloaded TLS certificate");
            true
        }
        Err(e) => {
            counter!("tls_reload_errors_total", 1u64);
            warn!(error = %e, cert = %cert_file.display(), "failed to reload TLS certificate; keeping previous");
            false
        }
    }
}
