//! HTTP server setup and connection handling.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Bind the plain listener and, if configured, the TLS listener
//! - Install the capture tap beneath hyper on every accepted connection
//! - Run the correlation sweeper
//! - Stop accepting and drain connections on shutdown

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::ConnectInfo,
    http::Request,
    routing::get,
    Router,
};
use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::{
    rt::{TokioIo, TokioTimer},
    service::TowerToHyperService,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tower::{service_fn, ServiceExt};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::capture::engine::CaptureEngine;
use crate::capture::tap::TapStream;
use crate::config::RelayConfig;
use crate::http::{capture, handlers, viewer};
use crate::hub::Hub;
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionMeta, ConnectionTracker, Scheme};
use crate::net::listener::{Listener, ListenerError};
use crate::net::tls;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CaptureEngine>,
    pub tracker: ConnectionTracker,
    pub namespace_length: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("Failed to load TLS configuration: {0}")]
    Tls(std::io::Error),
}

/// Listeners bound and ready to serve.
pub struct Bindings {
    pub plain: Listener,
    pub tls: Option<(Listener, RustlsConfig)>,
}

/// Everything a connection task needs.
#[derive(Clone)]
struct ConnectionContext {
    engine: Arc<CaptureEngine>,
    router: Router,
    tracker: ConnectionTracker,
}

/// HTTP server for the capture relay.
pub struct CaptureServer {
    config: RelayConfig,
    engine: Arc<CaptureEngine>,
    tracker: ConnectionTracker,
    router: Router,
}

impl CaptureServer {
    pub fn new(config: RelayConfig) -> Self {
        let hub = Arc::new(Hub::new(config.hub.subscriber_buffer));
        let engine = Arc::new(CaptureEngine::new(&config.capture, hub));
        let tracker = ConnectionTracker::new();

        let state = AppState {
            engine: Arc::clone(&engine),
            tracker: tracker.clone(),
            namespace_length: config.capture.namespace_length,
        };
        let router = Self::build_router(&config, state);

        Self {
            config,
            engine,
            tracker,
            router,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        Router::new()
            .route("/ws", get(viewer::viewer_socket))
            .route("/new", get(handlers::new_namespace))
            .route("/healthz", get(handlers::health))
            .fallback(capture::acknowledge)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    pub fn engine(&self) -> &Arc<CaptureEngine> {
        &self.engine
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Bind the listeners named in the configuration.
    pub async fn bind(&self) -> Result<Bindings, ServerError> {
        let max_connections = self.config.listener.max_connections;
        let plain = Listener::bind(&self.config.listener.bind_address, max_connections).await?;

        let tls = match &self.config.tls {
            Some(tls) => {
                let rustls = tls::load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path))
                    .await
                    .map_err(ServerError::Tls)?;
                let listener = Listener::bind(&tls.bind_address, max_connections).await?;
                Some((listener, rustls))
            }
            None => None,
        };

        Ok(Bindings { plain, tls })
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), ServerError> {
        let bindings = self.bind().await?;
        self.serve(bindings, shutdown).await;
        Ok(())
    }

    /// Serve on already-bound listeners until `shutdown` fires, then wait
    /// for open connections up to the configured grace period.
    pub async fn serve(self, bindings: Bindings, shutdown: Shutdown) {
        let context = ConnectionContext {
            engine: Arc::clone(&self.engine),
            router: self.router.clone(),
            tracker: self.tracker.clone(),
        };

        let sweeper = tokio::spawn(self.engine.sweeper().run(shutdown.subscribe()));

        let secure = bindings.tls.map(|(listener, rustls)| {
            tokio::spawn(accept_loop(
                listener,
                Scheme::Https,
                Some(tls::acceptor(rustls)),
                context.clone(),
                shutdown.subscribe(),
            ))
        });

        accept_loop(bindings.plain, Scheme::Http, None, context, shutdown.subscribe()).await;

        if let Some(secure) = secure {
            let _ = secure.await;
        }
        let _ = sweeper.await;

        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);
        if !self.tracker.drain(grace).await {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Shutdown grace period elapsed with connections still open"
            );
        }
        tracing::info!("HTTP server stopped");
    }
}

async fn accept_loop(
    listener: Listener,
    scheme: Scheme,
    acceptor: Option<RustlsAcceptor>,
    context: ConnectionContext,
    mut shutdown: broadcast::Receiver<()>,
) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, %scheme, "HTTP server starting");
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote, permit) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::error!(error = %e, %scheme, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                };
                let local = match stream.local_addr() {
                    Ok(local) => local,
                    Err(e) => {
                        tracing::warn!(peer_addr = %remote, error = %e, "Dropping connection without local address");
                        continue;
                    }
                };

                let meta = ConnectionMeta::new(remote, local, scheme);
                let context = context.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = context.tracker.track(meta.id);
                    match acceptor {
                        None => serve_connection(stream, meta, context).await,
                        Some(acceptor) => match acceptor.accept(stream, ()).await {
                            Ok((stream, ())) => serve_connection(stream, meta, context).await,
                            Err(e) => {
                                tracing::debug!(connection_id = %meta.id, peer_addr = %remote, error = %e, "TLS handshake failed");
                            }
                        },
                    }
                });
            }
            _ = shutdown.recv() => {
                tracing::info!(%scheme, "Listener received shutdown signal, no longer accepting");
                break;
            }
        }
    }
}

/// Serve HTTP on one connection with the capture tap underneath.
async fn serve_connection<S>(stream: S, meta: ConnectionMeta, context: ConnectionContext)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let tapped = TapStream::new(stream, meta, context.engine);
    let router = context.router;
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(meta));
        router.clone().oneshot(request)
    });

    // HTTP/1 only: the tap and the port key both assume one request stream
    // per connection. Half-close keeps the response alive for senders that
    // shut down their write side after the request.
    let mut builder = http1::Builder::new();
    builder.half_close(true).timer(TokioTimer::new());
    if let Err(e) = builder
        .serve_connection(TokioIo::new(tapped), TowerToHyperService::new(service))
        .with_upgrades()
        .await
    {
        tracing::debug!(connection_id = %meta.id, error = %e, "Connection closed with error");
    }
}
