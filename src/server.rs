//! HTTP binding on top of `tiny_http`
//!
//! A dedicated thread accepts connections and hands them to the tokio
//! runtime, where each request is read, handled by the [`ScreenshotService`]
//! and answered independently of the others.

use crate::async_api::ScreenshotService;
use crate::http::{HttpRequest, HttpResponse};
use crate::{Error, Launcher, Result};
use log::{info, warn};
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Request, Response};
use tokio::sync::mpsc;

/// Stops a running [`Server`] from another task or thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<tiny_http::Server>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.inner.unblock();
    }
}

pub struct Server<L> {
    inner: Arc<tiny_http::Server>,
    service: ScreenshotService<L>,
    max_body_bytes: usize,
}

impl<L: Launcher + 'static> Server<L> {
    /// Bind the listening socket.
    pub fn bind(addr: SocketAddr, service: ScreenshotService<L>, max_body_bytes: usize) -> Result<Self> {
        let inner = tiny_http::Server::http(addr)
            .map_err(|e| Error::NetworkError(format!("Failed to bind {}: {}", addr, e)))?;
        Ok(Self {
            inner: Arc::new(inner),
            service,
            max_body_bytes,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.server_addr().to_ip()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            inner: self.inner.clone(),
        }
    }

    /// Serve until [`ShutdownHandle::shutdown`] is called.
    pub async fn run(self) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
        let listener = self.inner.clone();
        thread::Builder::new()
            .name("htmlshot-accept".into())
            .spawn(move || {
                for request in listener.incoming_requests() {
                    if tx.send(request).is_err() {
                        break;
                    }
                }
            })?;

        if let Some(addr) = self.local_addr() {
            info!("Listening on http://{}{}", addr, self.service.handler().config().route);
        }

        while let Some(request) = rx.recv().await {
            let service = self.service.clone();
            let max_body_bytes = self.max_body_bytes;
            tokio::spawn(async move {
                serve_one(service, request, max_body_bytes).await;
            });
        }

        info!("Server stopped");
        Ok(())
    }
}

async fn serve_one<L: Launcher + 'static>(
    service: ScreenshotService<L>,
    request: Request,
    max_body_bytes: usize,
) {
    let read = tokio::task::spawn_blocking(move || {
        let mut request = request;
        let parsed = read_request(&mut request, max_body_bytes);
        (request, parsed)
    })
    .await;

    let (request, parsed) = match read {
        Ok(pair) => pair,
        Err(e) => {
            warn!("Failed to read request: {}", e);
            return;
        }
    };

    let response = match parsed {
        Ok(req) => service.handle(req).await,
        Err(e) => {
            warn!("Rejected request before handling: {}", e);
            HttpResponse::from_error(&e)
        }
    };

    let written = tokio::task::spawn_blocking(move || request.respond(to_tiny_response(response))).await;
    match written {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to write response: {}", e),
        Err(e) => warn!("Response task failed: {}", e),
    }
}

/// Convert a tiny_http request, reading at most `max_body_bytes` of body.
pub fn read_request(request: &mut Request, max_body_bytes: usize) -> Result<HttpRequest> {
    if request.body_length().is_some_and(|len| len > max_body_bytes) {
        return Err(Error::PayloadTooLarge(max_body_bytes));
    }

    let mut req = HttpRequest::new(&request.method().to_string(), request.url());
    req.headers = request
        .headers()
        .iter()
        .map(|h| (h.field.to_string(), h.value.to_string()))
        .collect();

    let mut body = Vec::new();
    request
        .as_reader()
        .take(max_body_bytes as u64 + 1)
        .read_to_end(&mut body)?;
    if body.len() > max_body_bytes {
        return Err(Error::PayloadTooLarge(max_body_bytes));
    }
    req.body = body;
    Ok(req)
}

pub fn to_tiny_response(resp: HttpResponse) -> Response<Cursor<Vec<u8>>> {
    let mut out = Response::from_data(resp.body).with_status_code(resp.status);
    for (name, value) in &resp.headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => out.add_header(header),
            Err(()) => warn!("Dropping invalid header {}", name),
        }
    }
    out
}
