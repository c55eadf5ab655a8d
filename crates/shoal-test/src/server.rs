//! Local HTTP fixture server
//!
//! An axum router on an ephemeral localhost port. Each registered path
//! answers with a fixed asset body, a status code, an event stream (closed
//! or held open), or a sequence of replies handed out one per request.
//! Query strings are ignored and unknown paths get 404.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::{self, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How an event-stream body finishes after its payload is written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyEnd {
    Close,
    /// Stay open until the server is dropped
    Hold,
    /// Abort the connection
    Reset,
}

/// One canned response
#[derive(Clone, Debug)]
pub enum Reply {
    Fixed {
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
    },
    Events { body: String, end: BodyEnd },
}

impl Reply {
    pub fn status(status: u16, body: Vec<u8>) -> Self {
        Reply::Fixed {
            status,
            content_type: "application/octet-stream",
            body,
        }
    }

    /// 200 with a content type picked from the path extension
    pub fn asset(path: &str, body: Vec<u8>) -> Self {
        Reply::Fixed {
            status: 200,
            content_type: content_type_for(path),
            body,
        }
    }

    /// `text/event-stream` body that closes once written
    pub fn events(body: &str) -> Self {
        Reply::Events {
            body: body.to_string(),
            end: BodyEnd::Close,
        }
    }

    /// `text/event-stream` body that stays open until the server is dropped
    pub fn held_events(body: &str) -> Self {
        Reply::Events {
            body: body.to_string(),
            end: BodyEnd::Hold,
        }
    }

    fn reset() -> Self {
        Reply::Events {
            body: String::new(),
            end: BodyEnd::Reset,
        }
    }
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

struct Route {
    replies: Vec<Reply>,
    /// Keep answering with the last reply once the list is used up
    repeat: bool,
    served: AtomicUsize,
}

impl Route {
    fn next(&self) -> Reply {
        let n = self.served.fetch_add(1, Ordering::AcqRel);
        match self.replies.get(n) {
            Some(reply) => reply.clone(),
            None if self.repeat => self.replies.last().cloned().unwrap_or_else(Reply::reset),
            None => Reply::reset(),
        }
    }
}

/// Route table for [`AssetServer`]
#[derive(Default)]
pub struct AssetServerBuilder {
    routes: HashMap<String, Route>,
}

impl AssetServerBuilder {
    fn insert(mut self, path: &str, replies: Vec<Reply>, repeat: bool) -> Self {
        let route = Route {
            replies,
            repeat,
            served: AtomicUsize::new(0),
        };
        self.routes.insert(path.to_string(), route);
        self
    }

    /// Answer every request on `path` with `status` and `body`
    pub fn route(self, path: &str, status: u16, body: Vec<u8>) -> Self {
        let reply = if status == 200 {
            Reply::asset(path, body)
        } else {
            Reply::status(status, body)
        };
        self.insert(path, vec![reply], true)
    }

    /// Event stream that closes after `body` on every request
    pub fn event_stream(self, path: &str, body: &str) -> Self {
        self.insert(path, vec![Reply::events(body)], true)
    }

    /// Event stream that writes `body` and then stays open
    pub fn held_event_stream(self, path: &str, body: &str) -> Self {
        self.insert(path, vec![Reply::held_events(body)], true)
    }

    /// Request `n` gets `replies[n]`; connections past the end are reset
    pub fn sequence(self, path: &str, replies: Vec<Reply>) -> Self {
        self.insert(path, replies, false)
    }

    /// Bind on an ephemeral localhost port and start serving on the current runtime
    pub async fn start(self) -> io::Result<AssetServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let hits = Arc::new(AtomicUsize::new(0));
        let closed = CancellationToken::new();

        let mut router = Router::new();
        let mut routes = HashMap::new();
        for (path, route) in self.routes {
            let route = Arc::new(route);
            routes.insert(path.clone(), route.clone());
            let (hits, closed) = (hits.clone(), closed.clone());
            router = router.route(
                &path,
                get(move || respond(route.clone(), hits.clone(), closed.clone())),
            );
        }
        let missed = hits.clone();
        router = router.fallback(move || {
            missed.fetch_add(1, Ordering::AcqRel);
            async { StatusCode::NOT_FOUND }
        });

        let shutdown = closed.clone();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned());
            if let Err(e) = serve.await {
                tracing::warn!(error = %e, "fixture server stopped");
            }
        });

        Ok(AssetServer {
            addr,
            hits,
            routes,
            closed,
            task,
        })
    }
}

async fn respond(route: Arc<Route>, hits: Arc<AtomicUsize>, closed: CancellationToken) -> Response {
    hits.fetch_add(1, Ordering::AcqRel);
    match route.next() {
        Reply::Fixed {
            status,
            content_type,
            body,
        } => (status_code(status), [(header::CONTENT_TYPE, content_type)], body).into_response(),
        Reply::Events { body, end } => (
            [(header::CONTENT_TYPE, "text/event-stream")],
            event_body(body, end, closed),
        )
            .into_response(),
    }
}

fn event_body(body: String, end: BodyEnd, closed: CancellationToken) -> Body {
    let head = stream::iter((!body.is_empty()).then(|| Ok::<_, io::Error>(Bytes::from(body))));
    let tail = stream::once(async move {
        match end {
            BodyEnd::Close => None,
            BodyEnd::Hold => {
                closed.cancelled().await;
                None
            }
            BodyEnd::Reset => Some(Err::<Bytes, _>(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "fixture reset",
            ))),
        }
    })
    .filter_map(futures::future::ready);
    Body::from_stream(head.chain(tail))
}

/// Running fixture server; stops and releases held streams when dropped
pub struct AssetServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    routes: HashMap<String, Arc<Route>>,
    closed: CancellationToken,
    task: JoinHandle<()>,
}

impl AssetServer {
    pub fn builder() -> AssetServerBuilder {
        AssetServerBuilder::default()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests received so far, unknown paths included
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Acquire)
    }

    /// Requests received on one registered path
    pub fn hits_on(&self, path: &str) -> usize {
        self.routes
            .get(path)
            .map_or(0, |route| route.served.load(Ordering::Acquire))
    }
}

impl Drop for AssetServer {
    fn drop(&mut self) {
        self.closed.cancel();
        self.task.abort();
    }
}
