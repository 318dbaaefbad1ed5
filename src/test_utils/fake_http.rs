use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::net::TcpListener;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use warp::http::header::HeaderName;
use warp::http::HeaderMap;
use warp::http::HeaderValue;
use warp::http::Method;
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::reply::Response;
use warp::Filter;

/// A request as seen by a fake server handler.
#[derive(Debug, Clone)]
pub(crate) struct FakeRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: String,
}

impl FakeRequest {
    pub(crate) fn param(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub(crate) fn header(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Decodes an `application/x-www-form-urlencoded` body.
    pub(crate) fn form(&self) -> HashMap<String, String> {
        parse_pairs(&self.body)
    }
}

/// In-process HTTP server bound to `127.0.0.1:0`, stopped on drop.
pub(crate) struct FakeServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<FakeRequest>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FakeServer {
    /// Serves every request with `handler`.
    pub(crate) fn spawn<H>(handler: H) -> Self
    where
        H: Fn(FakeRequest) -> Response + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self::spawn_async(move |req| {
            let handler = handler.clone();
            async move { handler(req) }
        })
    }

    /// Serves every request with an async `handler`, e.g. to hold a long-poll
    /// open.
    pub(crate) fn spawn_async<H, F>(handler: H) -> Self
    where
        H: Fn(FakeRequest) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        let raw_query = warp::query::raw().or(warp::any().map(String::new)).unify();
        let routes = warp::method()
            .and(warp::path::full())
            .and(raw_query)
            .and(warp::header::headers_cloned())
            .and(warp::body::bytes())
            .and_then(
                move |method: Method, path: FullPath, query: String, headers: HeaderMap, body: Bytes| {
                    let request = FakeRequest {
                        method,
                        path: path.as_str().to_string(),
                        query: parse_pairs(&query),
                        headers,
                        body: String::from_utf8_lossy(&body).into_owned(),
                    };
                    recorded.lock().push(request.clone());
                    let response = handler(request);
                    async move { Ok::<_, warp::Rejection>(response.await) }
                },
            );

        let (tx, rx) = oneshot::channel::<()>();
        let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async move {
            let _ = rx.await;
        });
        tokio::spawn(server);

        Self {
            addr,
            requests,
            shutdown: Some(tx),
        }
    }

    pub(crate) fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `host:port`, without scheme.
    pub(crate) fn host(&self) -> String {
        self.addr.to_string()
    }

    pub(crate) fn requests(&self) -> Vec<FakeRequest> {
        self.requests.lock().clone()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Builds a response with `status`, `headers` and `body`.
pub(crate) fn reply(
    status: u16,
    headers: &[(&str, String)],
    body: impl Into<String>,
) -> Response {
    let body: String = body.into();
    let mut response = Response::new(body.into());
    *response.status_mut() = StatusCode::from_u16(status).expect("valid status");
    for (name, value) in headers {
        response.headers_mut().insert(
            HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
            HeaderValue::from_str(value).expect("valid header value"),
        );
    }
    response
}

/// Address nothing listens on.
pub(crate) fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}")
}

fn parse_pairs(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode(k), decode(v)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

/// Minimal percent decoding for test payloads.
fn decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    Ok(b) => {
                        out.push(b);
                        i += 2;
                    }
                    Err(_) => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
