use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use framecast_common::store::FrameStore;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Browsers fetching from a public origin into localhost send a
/// private-network preflight; this header is the opt-in.
const ALLOW_PRIVATE_NETWORK: HeaderName =
    HeaderName::from_static("access-control-allow-private-network");

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },
}

/// HTTP listener publishing the store's latest frame.
///
/// Every path serves the same resource; the server never triggers a
/// capture. Only one instance may hold a given port: rebinding requires
/// [`ImageServer::stop`] on the old instance first.
pub struct ImageServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ImageServer {
    /// Bind `0.0.0.0:port` and start serving. A bind failure is returned
    /// as-is; there is no fallback to another port.
    pub async fn start(port: u16, store: Arc<FrameStore>) -> Result<Self, ServeError> {
        let app = Router::new()
            .fallback(latest_frame)
            .layer(TraceLayer::new_for_http())
            .with_state(store);

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ServeError::Bind { port, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServeError::Bind { port, source })?;

        let (shutdown, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                rx.await.ok();
            });
            if let Err(e) = serve.await {
                error!(error = %e, "image server exited with error");
            }
        });

        info!(addr = %local_addr, "image server listening");
        Ok(Self {
            local_addr,
            shutdown,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shut the listener down. The socket is released once this returns,
    /// so the port can be rebound immediately afterwards.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                error!(error = %e, "image server task panicked");
            }
        }
        debug!("image server stopped");
    }
}

/// The single resource: latest frame on any path, CORS preflight on
/// OPTIONS. An empty store answers 200 with a zero-length text body so
/// pollers can distinguish "no frame yet" from an error.
async fn latest_frame(State(store): State<Arc<FrameStore>>, method: Method) -> Response {
    if method == Method::OPTIONS {
        return (
            StatusCode::NO_CONTENT,
            [
                (ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
                (
                    ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static("GET, OPTIONS"),
                ),
                (
                    ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("Content-Type"),
                ),
                (ALLOW_PRIVATE_NETWORK, HeaderValue::from_static("true")),
            ],
        )
            .into_response();
    }

    let frame = store.get();
    let content_type = if frame.is_empty() {
        "text/plain"
    } else {
        "image/png"
    };
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
            (ALLOW_PRIVATE_NETWORK, HeaderValue::from_static("true")),
        ],
        frame.bytes,
    )
        .into_response()
}
