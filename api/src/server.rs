use std::fmt::Display;
use std::time::{Duration, Instant};
use std::{future::Future, io, net::SocketAddr, sync::Arc};

use crate::error::RequestError;
use crate::http::codec::ConnectionCodec;
use crate::http::{IntoResponse, Request, Response};
use futures_util::{SinkExt, StreamExt};
use http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH};
use http::{header::CONNECTION, HeaderValue, Method, StatusCode};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::OwnedSemaphorePermit;
use tokio::{net::TcpStream, sync::Semaphore};
use tokio_util::codec::Decoder;

type Handler<A, F> = fn(Request, A) -> F;

pub struct Server<A, F> {
    state: A,
    handler: Handler<A, F>,
    semaphore: Arc<Semaphore>,
}

const PERMITS: usize = 1_000;

/// How long a client gets to deliver a complete request.
const READ_TIMEOUT: Duration = Duration::from_secs(15);

impl<S, F, E> Server<S, F>
where
    S: Clone + Send + Sync + 'static,
    F: Future<Output = Result<Response, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    pub fn new(state: S, handler: Handler<S, F>) -> Self {
        Self {
            state,
            handler,
            semaphore: Arc::new(Semaphore::new(PERMITS)),
        }
    }

    pub async fn bind<A: ToSocketAddrs>(
        self,
        addr: A,
        shutdown: impl Future<Output = ()>,
    ) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Accepts connections until `shutdown` resolves. Requests already being
    /// handled are left to finish on their own tasks.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> io::Result<()> {
        let server = Arc::new(self);

        let addr = listener.local_addr()?;
        tracing::info!(target: "listener", ?addr, "server is running");

        tokio::pin!(shutdown);

        let mut now = Instant::now();
        let mut connections = 0usize;

        loop {
            let (socket, addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(target: "listener", %err, "failed to accept connection");
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    tracing::info!(target: "listener", "shutting down");
                    return Ok(());
                }
            };

            let Ok(permit) = Arc::clone(&server.semaphore).acquire_owned().await else {
                return Ok(());
            };

            connections += 1;
            if now.elapsed() > Duration::from_secs(1) {
                tracing::debug!(
                    target: "listener",
                    "{connections}/s with {} tasks running",
                    PERMITS - server.semaphore.available_permits()
                );
                now = Instant::now();
                connections = 0;
            }

            let server = server.clone();
            tokio::spawn(server.handle_request(socket, addr, permit));
        }
    }

    #[tracing::instrument(skip(self, socket, _permit))]
    async fn handle_request(
        self: Arc<Self>,
        socket: TcpStream,
        addr: SocketAddr,
        _permit: OwnedSemaphorePermit,
    ) {
        let mut codec = ConnectionCodec::default().framed(socket);
        let req = match tokio::time::timeout(READ_TIMEOUT, codec.next()).await {
            Ok(Some(Ok(req))) => {
                tracing::debug!(?req, "received request");
                req
            }
            Ok(Some(Err(err))) => {
                tracing::warn!(%err, "failed to read request");
                let status = match err {
                    RequestError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                    RequestError::UnsupportedVersion => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
                    _ => StatusCode::BAD_REQUEST,
                };
                let _ = codec.send(finish(status.into_response())).await;
                return;
            }
            Ok(None) => {
                tracing::debug!("connection ended before request");
                return;
            }
            Err(_) => {
                tracing::warn!("timed out waiting for request");
                return;
            }
        };

        let method = req.method().clone();
        let path = req.uri().to_string();
        let body = (method == Method::POST)
            .then(|| req.body().as_ref().map(|b| String::from_utf8_lossy(b).into_owned()))
            .flatten()
            .unwrap_or_default();

        let now = Instant::now();
        let resp = match (self.handler)(req, self.state.clone()).await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::error!(%err, "unhandled error while serving request");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        };
        let elapsed = now.elapsed();

        let status = resp.status().as_u16();
        let length = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-")
            .to_string();
        tracing::info!(
            target: "requests",
            %method,
            %path,
            status,
            %length,
            ?elapsed,
            "{method} {path} {status} {length} - {:.3} ms {body}",
            elapsed.as_secs_f64() * 1000.0
        );

        if let Err(err) = codec.send(finish(resp)).await {
            tracing::warn!(%err, "failed to send response");
        }
    }
}

fn finish(mut resp: Response) -> Response {
    const CLOSE: HeaderValue = HeaderValue::from_static("close");
    const ANY_ORIGIN: HeaderValue = HeaderValue::from_static("*");

    let headers = resp.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, ANY_ORIGIN);
    headers.insert(CONNECTION, CLOSE);

    resp
}
