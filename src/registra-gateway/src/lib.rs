//! Registra gateway: holds the routes published by the registry and serves
//! them over HTTP, answering mocks directly and forwarding the rest.

pub mod routes;

pub use routes::{Lookup, PublishedRoute, RouteTable};

use anyhow::Result;
use bytes::Bytes;
use chrono::{Datelike, Utc};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::tokio::TokioIo;
use registra_core::{
    GatewayPublisher, RegistryResult, RouteKey, RouteMetrics, RouteSpec, RouteStatus, RouteTarget,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use url::Url;

// Inject app name & version at compile-time from Cargo.toml
const APP_NAME: &str = env!("APP_NAME");
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_MEDIA_TYPE: &str = "text/plain";

// not forwarded in either direction
const HOP_HEADERS: [HeaderName; 5] = [
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub struct Gateway {
    table: RouteTable,
    client: reqwest::Client,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Use a preconfigured upstream client (timeouts, proxy settings).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            table: RouteTable::new(),
            client,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub async fn serve(self: Arc<Self>, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener).await
    }

    pub async fn serve_listener(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!("{} listening on {}", APP_NAME, listener.local_addr()?);
        loop {
            let (stream, peer) = listener.accept().await?;
            let me = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let conn = http1::Builder::new().serve_connection(
                    io,
                    service_fn(move |req| {
                        let me = me.clone();
                        async move { me.handle(req).await }
                    }),
                );
                if let Err(e) = conn.await {
                    error!(%peer, "conn error: {e}");
                }
            });
        }
    }

    async fn handle(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let start = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let (parts, body) = req.into_parts();
        let body_bytes = body.collect().await?.to_bytes();
        info!("Handling request {}: {} {}", request_id, parts.method, parts.uri);

        let key = match self.table.lookup(parts.method.as_str(), parts.uri.path()) {
            Lookup::Live(key) => key,
            Lookup::Unavailable(key) => {
                debug!(route = %key, "route not started");
                let resp = self.error_page(StatusCode::SERVICE_UNAVAILABLE, "Route unavailable", &request_id);
                return Ok(default_headers(resp, &request_id, start));
            }
            Lookup::Missing => {
                let resp = self.error_page(StatusCode::NOT_FOUND, "Route not found", &request_id);
                return Ok(default_headers(resp, &request_id, start));
            }
        };
        // clone out so no table guard is held across the upstream call
        let Some(target) = self.table.get(&key).map(|r| r.spec.target.clone()) else {
            let resp = self.error_page(StatusCode::NOT_FOUND, "Route not found", &request_id);
            return Ok(default_headers(resp, &request_id, start));
        };

        let resp = match target {
            RouteTarget::Mock { body, media_type } => mock_response(body, &media_type),
            RouteTarget::Proxy { endpoint } => {
                self.forward(&endpoint, parts.method, parts.uri.query(), parts.headers, body_bytes)
                    .await
            }
        };
        let failed = resp.status() == StatusCode::BAD_GATEWAY;
        if let Some(route) = self.table.get(&key) {
            route.record_exchange(failed);
        }
        Ok(default_headers(resp, &request_id, start))
    }

    async fn forward(
        &self,
        endpoint: &str,
        method: http::Method,
        query: Option<&str>,
        mut headers: HeaderMap,
        body: Bytes,
    ) -> Response<Full<Bytes>> {
        let mut url = match Url::parse(endpoint) {
            Ok(url) => url,
            Err(e) => {
                error!(endpoint, "invalid endpoint: {e}");
                return simple(StatusCode::BAD_GATEWAY, Bytes::from_static(b"invalid upstream endpoint"));
            }
        };
        if let Some(q) = query {
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, q),
                _ => q.to_string(),
            };
            url.set_query(Some(&merged));
        }

        if let Some(orig_host) = headers.get(header::HOST).cloned() {
            headers.insert("x-forwarded-host", orig_host);
        }
        for name in &HOP_HEADERS {
            headers.remove(name);
        }
        headers.insert(header::VIA, HeaderValue::from_static(APP_NAME));

        debug!("upstream request: {} {} {:?}", method, url, headers);
        let upstart = Instant::now();
        let resp = match self
            .client
            .request(method, url.as_str())
            .headers(headers)
            .body(body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("upstream error: {e}");
                return simple(StatusCode::BAD_GATEWAY, Bytes::from_static(b"upstream error"));
            }
        };
        info!("upstream Latency: {}ms", upstart.elapsed().as_millis());

        let status = resp.status();
        let mut upstream_headers = resp.headers().clone();
        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                error!("upstream body error: {e}");
                return simple(StatusCode::BAD_GATEWAY, Bytes::from_static(b"upstream error"));
            }
        };
        for name in &HOP_HEADERS {
            upstream_headers.remove(name);
        }
        let mut out = simple(status, bytes);
        out.headers_mut().extend(upstream_headers);
        out
    }

    fn error_page(&self, status: StatusCode, title: &str, request_id: &str) -> Response<Full<Bytes>> {
        let body = format!(
            "<html><head><title>{app_name}: {title}</title></head>\
            <body><h1>{reason}</h1>\
            <h2>{title}</h2>\
            <p><b>Request id:</b> {request_id}</p>\
            <br/><hr/> \
            <center><p>{app_name} Gateway {app_version} &copy; {year}</p></center>\
            </body></html>",
            app_name = APP_NAME,
            title = title,
            reason = status.canonical_reason().unwrap_or("Error"),
            request_id = request_id,
            app_version = APP_VERSION,
            year = Utc::now().year()
        );
        let mut resp = simple(status, Bytes::from(body));
        resp.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        resp
    }
}

impl GatewayPublisher for Gateway {
    fn publish(&self, route: &RouteSpec) -> RegistryResult<()> {
        self.table.publish(route)
    }

    fn remove(&self, key: &RouteKey) -> RegistryResult<()> {
        self.table.remove(key)
    }

    fn suspend(&self, key: &RouteKey) -> RegistryResult<()> {
        self.table.suspend(key)
    }

    fn resume(&self, key: &RouteKey) -> RegistryResult<()> {
        self.table.resume(key)
    }

    fn status(&self, key: &RouteKey) -> RouteStatus {
        self.table.status(key)
    }

    fn metrics(&self, key: &RouteKey) -> Option<RouteMetrics> {
        self.table.metrics(key)
    }
}

fn mock_response(body: String, media_type: &str) -> Response<Full<Bytes>> {
    let media_type = if media_type.trim().is_empty() {
        DEFAULT_MEDIA_TYPE
    } else {
        media_type
    };
    let mut resp = simple(StatusCode::OK, Bytes::from(body));
    match HeaderValue::from_str(media_type) {
        Ok(v) => {
            resp.headers_mut().insert(header::CONTENT_TYPE, v);
        }
        Err(_) => {
            warn!(media_type, "unusable media type, falling back");
            resp.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(DEFAULT_MEDIA_TYPE));
        }
    }
    resp
}

fn default_headers(mut resp: Response<Full<Bytes>>, request_id: &str, start: Instant) -> Response<Full<Bytes>> {
    let latency_us = start.elapsed().as_micros().to_string();
    let latency_ms = start.elapsed().as_millis().to_string();
    let server = format!("{}/{}", APP_NAME, APP_VERSION);

    let headers = resp.headers_mut();
    headers.insert(header::VIA, HeaderValue::from_static(APP_NAME));
    for (name, value) in [
        ("server", server.as_str()),
        ("x-latency-us", latency_us.as_str()),
        ("x-latency", latency_ms.as_str()),
        ("x-request-id", request_id),
    ] {
        if let Ok(v) = HeaderValue::from_str(value) {
            headers.insert(name, v);
        }
    }
    resp
}

fn simple(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp
}
