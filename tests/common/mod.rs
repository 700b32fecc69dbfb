//! Common test utilities and helpers
#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A request as the test server saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Clone)]
struct ServerState {
    status: StatusCode,
    body: Arc<Vec<u8>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// SOAP endpoint stand-in serving a canned response on `POST /ws`
pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, status, body.into())
    }

    /// Like `start`, but the first connection is dropped before any response
    pub async fn start_flaky(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = body.into();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let state = ServerState {
            status: StatusCode::from_u16(status).unwrap(),
            body: Arc::new(body),
            requests: Arc::clone(&requests),
        };
        let handle = tokio::spawn(async move {
            let (first, _) = listener.accept().await.unwrap();
            drop(first);
            axum::serve(listener, router(state)).await.unwrap();
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    /// Answers every request with `200 OK` and a `Content-Length` of
    /// `advertised`, but sends only `body` before closing the connection
    pub async fn start_truncated(advertised: usize, body: impl Into<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = body.into();
        assert!(body.len() < advertised);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_raw_request(&mut stream).await;
                recorded.lock().unwrap().push(request);

                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {advertised}\r\n\r\n"
                );
                stream.write_all(head.as_bytes()).await.unwrap();
                stream.write_all(&body).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    fn serve(listener: TcpListener, status: u16, body: Vec<u8>) -> Self {
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            status: StatusCode::from_u16(status).unwrap(),
            body: Arc::new(body),
            requests: Arc::clone(&requests),
        };
        let handle = tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/ws", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(state: ServerState) -> Router {
    Router::new().route("/ws", post(handle)).with_state(state)
}

async fn handle(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Vec<u8>) {
    state.requests.lock().unwrap().push(RecordedRequest {
        headers,
        body: body.to_vec(),
    });
    (state.status, state.body.as_ref().clone())
}

/// Read one HTTP/1.1 request with a `Content-Length` body off the socket
async fn read_raw_request(stream: &mut TcpStream) -> RecordedRequest {
    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed inside the request head");
        data.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut headers = HeaderMap::new();
    for line in head.lines().skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.trim().as_bytes()).unwrap(),
                value.trim().parse().unwrap(),
            );
        }
    }

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while data.len() < header_end + length {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed inside the request body");
        data.extend_from_slice(&chunk[..n]);
    }

    RecordedRequest {
        headers,
        body: data[header_end..header_end + length].to_vec(),
    }
}

/// `<reportBytes>` envelope around an already base64-encoded payload
pub fn report_envelope(encoded: &str) -> String {
    format!(
        concat!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#,
            "<soap:Body><getReportResponse><reportBytes>{}</reportBytes></getReportResponse>",
            "</soap:Body></soap:Envelope>"
        ),
        encoded
    )
}
