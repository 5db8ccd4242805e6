//! HTTP layer: routes, middleware, Content Security Policy selection and
//! server lifecycle.
//!
//! The streaming core lives in the `sse` crate; this crate adapts it to axum
//! and wires everything behind a single [`AppState`].

use ::sse::Hub;
use axum::Router;
use csp::CspMux;
use error::{Error, Result};
use log::*;
use service::config::Config;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::{oneshot, watch};

pub mod csp;
pub mod error;
pub mod middleware;
pub mod router;

mod controller;
mod sse;

/// Shared state handed to every handler and middleware.
///
/// Needs to implement Clone to be able to be passed into Router as State.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub hub: Arc<Hub>,
    pub csp: Arc<CspMux>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(config: Config, csp: CspMux) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            hub: Arc::new(Hub::new()),
            csp: Arc::new(csp),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Ask long-lived connections to wind down. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once [`AppState::shutdown`] has been called, immediately if it
    /// already was.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.shutdown.subscribe();
        async move {
            // The sender lives in `AppState`, so an error means it is gone.
            let _ = receiver.wait_for(|stopping| *stopping).await;
        }
    }
}

/// A listening socket ready to be handed to [`serve`].
pub enum BoundListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl BoundListener {
    /// The bound TCP address, useful when listening on port 0.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        match self {
            BoundListener::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            BoundListener::Unix { .. } => None,
        }
    }
}

impl fmt::Display for BoundListener {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BoundListener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => write!(f, "http://{addr}"),
                Err(_) => f.write_str("http://<unknown>"),
            },
            #[cfg(unix)]
            BoundListener::Unix { path, .. } => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Bind the configured Unix socket, or `interface:port` when none is set.
pub async fn bind(config: &Config) -> Result<BoundListener> {
    if let Some(path) = config.socket_path() {
        #[cfg(unix)]
        {
            let listener = UnixListener::bind(path).map_err(Error::server)?;
            return Ok(BoundListener::Unix {
                listener,
                path: path.clone(),
            });
        }
        #[cfg(not(unix))]
        return Err(Error::internal(format!(
            "cannot listen on {}: Unix sockets are not supported on this platform",
            path.display()
        )));
    }

    let interface = config.interface.as_deref().unwrap_or("127.0.0.1");
    let listener = TcpListener::bind((interface, config.port))
        .await
        .map_err(Error::server)?;
    Ok(BoundListener::Tcp(listener))
}

/// Serve the application on `listener` until `signal` resolves.
///
/// Once the signal fires, event streams are closed and in-flight requests get
/// `shutdown_timeout_secs` to complete before the server stops waiting.
pub async fn serve<F>(listener: BoundListener, app_state: AppState, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = router::define_routes(app_state.clone());
    let timeout = Duration::from_secs(app_state.config.shutdown_timeout_secs);

    let (draining_tx, draining_rx) = oneshot::channel::<()>();
    let graceful = async move {
        signal.await;
        info!("Server gracefully shutting down");
        app_state.shutdown();
        let _ = draining_tx.send(());
    };

    let server = run(listener, router, graceful);
    tokio::pin!(server);

    tokio::select! {
        biased;
        result = &mut server => return result,
        Ok(()) = draining_rx => {}
    }

    match tokio::time::timeout(timeout, server).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Graceful shutdown timed out after {timeout:?}, dropping remaining connections");
            Ok(())
        }
    }
}

async fn run<G>(listener: BoundListener, router: Router, graceful: G) -> Result<()>
where
    G: Future<Output = ()> + Send + 'static,
{
    match listener {
        BoundListener::Tcp(listener) => axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(graceful)
        .await
        .map_err(Error::server),
        #[cfg(unix)]
        BoundListener::Unix { listener, path } => {
            let result = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(graceful)
                .await
                .map_err(Error::server);
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove socket file {}: {e}", path.display());
            }
            result
        }
    }
}

/// Bind from the configuration and serve until Ctrl-C or SIGTERM.
pub async fn init_server(app_state: AppState) -> Result<()> {
    let listener = bind(&app_state.config).await?;
    info!("Server starting... listening for connections on {listener}");

    serve(listener, app_state, shutdown_requested()).await
}

async fn shutdown_requested() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, initiating shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use test_support::app_state_with;

    #[tokio::test]
    async fn shutdown_signal_resolves_for_late_subscribers() {
        let app_state = app_state_with(CspMux::default());
        assert!(!app_state.is_shutting_down());

        let early = app_state.shutdown_signal();
        app_state.shutdown();
        let late = app_state.shutdown_signal();

        tokio::time::timeout(Duration::from_secs(1), async {
            early.await;
            late.await;
        })
        .await
        .expect("both signals resolve");
        assert!(app_state.is_shutting_down());
    }

    #[tokio::test]
    async fn serve_stops_when_signalled() {
        let app_state = app_state_with(CspMux::default());
        let listener = BoundListener::Tcp(TcpListener::bind("127.0.0.1:0").await.unwrap());
        assert!(listener.tcp_addr().is_some());
        assert!(listener.to_string().starts_with("http://127.0.0.1:"));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, app_state.clone(), async move {
            let _ = stop_rx.await;
        }));

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server stops")
            .unwrap()
            .expect("clean shutdown");
        assert!(app_state.is_shutting_down());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_socket_is_removed_after_shutdown() {
        let path = std::env::temp_dir().join(format!("web-test-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let config = Config::parse_from(["base_server"]).set_socket_path(path.clone());
        let listener = bind(&config).await.unwrap();
        assert!(listener.tcp_addr().is_none());
        assert!(path.exists());

        let app_state = AppState::new(config, CspMux::default());
        serve(listener, app_state, async {}).await.unwrap();
        assert!(!path.exists());
    }
}
