use crate::error::{Error, Result};
use crate::AppState;
use async_stream::stream;
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use log::*;
use sse::{EventSink, Frame, STREAM_HEADERS};
use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Streams hub broadcasts to the client as `text/event-stream`.
///
/// The connection is served on its own task and lasts until the client goes
/// away or the server starts shutting down.
pub(crate) async fn sse_handler(State(app_state): State<AppState>) -> Result<Response> {
    let (tx, mut rx) = mpsc::channel::<Bytes>(1);
    let (opened_tx, opened_rx) = oneshot::channel();

    let closed = tx.clone();
    let shutdown = app_state.shutdown_signal();
    let hub = Arc::clone(&app_state.hub);
    let mut sink = BodySink {
        tx,
        opened: Some(opened_tx),
    };

    let serving = tokio::spawn(async move {
        let cancelled = async move {
            tokio::select! {
                _ = closed.closed() => debug!("SSE client disconnected"),
                _ = shutdown => debug!("Closing SSE connection for shutdown"),
            }
        };

        let result = hub.serve(&mut sink, cancelled).await;
        if let Err(e) = &result {
            debug!("SSE connection ended: {e}");
        }
        result
    });

    // The sink is only left unopened when `serve` bailed out early.
    if opened_rx.await.is_err() {
        return Err(match serving.await {
            Ok(Err(e)) => e.into(),
            Ok(Ok(())) => Error::internal("event stream closed before it was opened"),
            Err(e) => Error::internal(format!("event stream task failed: {e}")),
        });
    }

    let body = Body::from_stream(stream! {
        while let Some(chunk) = rx.recv().await {
            yield Ok::<_, Infallible>(chunk);
        }
    });

    let mut response = Response::builder().status(StatusCode::OK);
    for (name, value) in STREAM_HEADERS {
        response = response.header(name, value);
    }
    response.body(body).map_err(Error::server)
}

/// Event sink writing into a streaming response body.
///
/// Hyper forwards every chunk as soon as the body yields it, so flushing has
/// nothing left to do.
struct BodySink {
    tx: mpsc::Sender<Bytes>,
    opened: Option<oneshot::Sender<()>>,
}

#[async_trait]
impl EventSink for BodySink {
    fn supports_flush(&self) -> bool {
        true
    }

    async fn open(&mut self) -> sse::Result<()> {
        if let Some(opened) = self.opened.take() {
            opened.send(()).map_err(|_| disconnected())?;
        }
        Ok(())
    }

    async fn write_frame(&mut self, frame: &Frame) -> sse::Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(frame.as_str().as_bytes()))
            .await
            .map_err(|_| disconnected())
    }

    async fn flush(&mut self) -> sse::Result<()> {
        Ok(())
    }
}

fn disconnected() -> sse::Error {
    sse::Error::transport(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "client disconnected",
    ))
}
