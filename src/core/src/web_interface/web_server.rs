use std::net::SocketAddr;
use std::sync::Arc;

use log::info;

use super::routes::routes;
use crate::error_handling::types::WebError;
use crate::storage::lifecycle::Shutdown;
use crate::storage::storage_trait::Storer;

/// Web server for the JSON view API and the chart page
pub struct WebServer {
    storage: Arc<dyn Storer>,
}

impl WebServer {
    /// Create a new WebServer instance
    pub fn new(storage: Arc<dyn Storer>) -> Self {
        Self { storage }
    }

    /// Serve on `addr` until `shutdown` fires.
    pub async fn start(&self, addr: SocketAddr, shutdown: Shutdown) -> Result<(), WebError> {
        // warp panics on a bind failure, so try the address first
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| WebError::BindFailed(format!("{}: {}", addr, e)))?;
        drop(listener);

        info!("web server listening on http://{}", addr);
        let server = warp::serve(routes(self.storage.clone())).run(addr);
        tokio::select! {
            _ = server => {}
            _ = shutdown.triggered() => info!("web server stopping"),
        }
        Ok(())
    }
}
