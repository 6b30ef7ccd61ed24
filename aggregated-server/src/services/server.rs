//! HTTP listeners.

use std::error::Error;
use std::net::SocketAddr;

use aggregated_system::Service;
use axum::Router;
use tokio::net::TcpListener;

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[from] std::io::Error),
}

/// HTTP server service.
///
/// Serves one [`Router`] on one address. The peer address of every connection is available to
/// handlers through [`ConnectInfo`](axum::extract::ConnectInfo).
#[derive(Debug)]
pub struct HttpServer {
    name: &'static str,
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    /// Binds the listener. Fails if the address is in use.
    pub async fn bind(
        name: &'static str,
        addr: SocketAddr,
        router: Router,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            name,
            listener,
            router,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }
}

impl Service for HttpServer {
    async fn run(self) {
        let Self {
            name,
            listener,
            router,
        } = self;

        aggregated_log::info!("spawning {name} server");
        if let Ok(addr) = listener.local_addr() {
            aggregated_log::info!("  listening on http://{addr}/");
        }

        let service = router.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(error) = axum::serve(listener, service).await {
            aggregated_log::error!(
                error = &error as &dyn Error,
                "{name} server stopped unexpectedly"
            );
        }
    }
}
