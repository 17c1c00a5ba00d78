//! Shared fixtures for integration tests: a mock authentication service,
//! a mock engine behind a Unix socket, and a running gate.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UnixListener};
use tokio::task::JoinHandle;

use engine_gate::config::ProxyConfig;
use engine_gate::net::connection::ConnectionTracker;
use engine_gate::net::listener::{Listener, ListenerError};
use engine_gate::{ProxyServer, Shutdown};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Credential headers as the mock authentication service saw them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenCredentials {
    pub token: Option<String>,
    pub user_id: Option<String>,
}

struct AuthState {
    body: &'static str,
    calls: AtomicUsize,
    seen: Mutex<Vec<SeenCredentials>>,
}

pub struct MockAuth {
    pub endpoint: String,
    state: Arc<AuthState>,
}

impl MockAuth {
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenCredentials> {
        self.state.seen.lock().unwrap().clone()
    }
}

async fn ping(State(state): State<Arc<AuthState>>, headers: HeaderMap) -> impl IntoResponse {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let value = |name: &str| {
        headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
    };
    state.seen.lock().unwrap().push(SeenCredentials {
        token: value("x-auth-token"),
        user_id: value("x-user-id"),
    });
    ([(header::CONTENT_TYPE, "application/json")], state.body)
}

/// Start an authentication service answering every ping with `body`.
pub async fn start_mock_auth(body: &'static str) -> MockAuth {
    let state = Arc::new(AuthState {
        body,
        calls: AtomicUsize::new(0),
        seen: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/api/ping", get(ping))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockAuth {
        endpoint: format!("http://{}/api/ping", addr),
        state,
    }
}

/// Start an authentication service that promises a longer body than it sends,
/// then hangs up. Returns its endpoint.
pub async fn start_truncating_auth() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_request(&mut socket).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 64\r\n\r\n{\"status\":")
                    .await;
            });
        }
    });
    format!("http://{}/api/ping", addr)
}

/// An engine stand-in listening on a Unix socket in a temp directory.
pub struct MockEngine {
    pub socket_path: PathBuf,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    _dir: tempfile::TempDir,
}

impl MockEngine {
    /// Raw bytes of every request the engine has received.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

/// Start an engine that reads one request per connection, records it,
/// answers with `reply` and closes.
pub async fn start_mock_engine(reply: &'static [u8]) -> MockEngine {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("engine.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&received);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                log.lock().unwrap().push(request);
                let _ = socket.write_all(reply).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockEngine {
        socket_path,
        received,
        _dir: dir,
    }
}

/// A socket path inside a fresh temp directory that nothing listens on.
pub fn missing_socket() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.sock");
    (dir, path)
}

/// Read one HTTP/1.x request: head plus a `Content-Length` body if any.
async fn read_request<S: AsyncRead + Unpin>(io: &mut S) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = find_head_end(&buf) {
            if buf.len() >= end + content_length(&buf[..end]) {
                return buf;
            }
        }
        match io.read(&mut chunk).await {
            Ok(0) | Err(_) => return buf,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// A gate running on an ephemeral loopback port.
pub struct RunningGate {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub tracker: ConnectionTracker,
    task: JoinHandle<Result<(), ListenerError>>,
}

impl RunningGate {
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(IO_TIMEOUT, self.task).await;
    }
}

/// Base configuration pointing at the given auth endpoint and engine socket.
pub fn gate_config(endpoint: &str, socket_path: PathBuf) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.auth.endpoint = endpoint.to_string();
    config.backend.socket_path = socket_path;
    config
}

pub async fn start_gate(config: ProxyConfig) -> RunningGate {
    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ProxyServer::new(&config).unwrap();
    let tracker = server.tracker();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningGate {
        addr,
        shutdown,
        tracker,
        task,
    }
}

/// Write `request` and collect everything until the peer closes.
///
/// A reset after the peer has answered still returns what was read.
pub async fn exchange<S>(io: &mut S, request: &[u8]) -> Vec<u8>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    io.write_all(request).await.unwrap();
    read_until_closed(io).await
}

pub async fn read_until_closed<S: AsyncRead + Unpin>(io: &mut S) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    let read_all = async {
        loop {
            match io.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => out.extend_from_slice(&chunk[..n]),
            }
        }
    };
    tokio::time::timeout(IO_TIMEOUT, read_all)
        .await
        .expect("peer did not close the connection");
    out
}

/// Plain TCP round trip against the gate.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    exchange(&mut stream, request).await
}

/// Split a raw response into its head and body text.
pub fn split_response(raw: &[u8]) -> (String, String) {
    let text = String::from_utf8_lossy(raw).into_owned();
    match text.split_once("\r\n\r\n") {
        Some((head, body)) => (head.to_string(), body.to_string()),
        None => (text, String::new()),
    }
}
