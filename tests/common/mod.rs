//! A minimal hand-rolled HTTP origin, standing in for "the remote server"
//! in end-to-end tests. Reads one request line plus headers, hands the
//! path and any `If-None-Match` value to a caller-supplied closure, and
//! writes back whatever `Reply` the closure returns.
//!
//! Plain request-line-plus-headers parsing over a raw `TcpStream`, no
//! HTTP-mocking crate involved, just enough protocol to drive the
//! client side of a conditional-GET exchange.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub enum Reply {
    /// A 200-equivalent with a body and optional `ETag`.
    Body { etag: Option<String>, body: Vec<u8> },
    /// The "unchanged" outcome: empty body, optionally still carrying an
    /// `ETag`. Only body-present-vs-empty matters here, not the status
    /// line.
    Unchanged,
}

pub struct MockOrigin {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl MockOrigin {
    /// `handler(path, if_none_match, call_index) -> Reply`. `call_index`
    /// starts at 0 and increments per accepted connection, so tests can
    /// script "first request returns body X, second returns Unchanged."
    ///
    /// Each accepted connection is served on its own thread, so tests
    /// that hold a connection open (to observe concurrency bounds on the
    /// client side) don't serialize behind the accept loop.
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, Option<String>, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock origin");
        listener.set_nonblocking(true).expect("set nonblocking");
        let addr = listener.local_addr().expect("local_addr");

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let call_index = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        let handle = std::thread::spawn(move || {
            let mut workers = Vec::new();
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                match listener.accept() {
                    Ok((stream, _)) => {
                        let index = call_index.fetch_add(1, Ordering::SeqCst);
                        let handler = handler.clone();
                        workers.push(std::thread::spawn(move || {
                            serve_one(stream, handler.as_ref(), index);
                        }));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
            for worker in workers {
                let _ = worker.join();
            }
        });

        Self {
            addr,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for MockOrigin {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve_one(stream: TcpStream, handler: &(dyn Fn(&str, Option<String>, usize) -> Reply + Send + Sync), index: usize) {
    let mut reader = BufReader::new(match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    });
    let mut stream = stream;

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
        return;
    }
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    let mut if_none_match = None;
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        if line == "\r\n" || line == "\n" {
            break;
        }
        if let Some(idx) = line.to_ascii_lowercase().find("if-none-match:") {
            let value = line[idx + "if-none-match:".len()..].trim();
            if_none_match = Some(strip_quotes(value).to_string());
        }
    }

    let reply = handler(&path, if_none_match, index);
    let (etag, body) = match reply {
        Reply::Body { etag, body } => (etag, body),
        Reply::Unchanged => (None, Vec::new()),
    };

    let mut response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n", body.len());
    if let Some(etag) = etag {
        // Callers that already include quoting (e.g. a weak validator
        // like `W/"v1"`) are sent verbatim; plain tokens get wrapped.
        if etag.contains('"') {
            response.push_str(&format!("ETag: {etag}\r\n"));
        } else {
            response.push_str(&format!("ETag: \"{etag}\"\r\n"));
        }
    }
    response.push_str("Connection: close\r\n\r\n");
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

fn strip_quotes(s: &str) -> &str {
    s.trim_start_matches('"').trim_end_matches('"')
}

/// Bind then immediately drop a listener, yielding a port nobody is
/// listening on, connecting to it deterministically fails with
/// "connection refused" rather than timing out, for transport-failure
/// test scenarios.
pub fn unreachable_url(path: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind throwaway listener");
    let addr = listener.local_addr().expect("local_addr");
    drop(listener);
    format!("http://{addr}{path}")
}

/// Poll `condition` until it's true or `timeout` elapses, sleeping briefly
/// between checks. Used instead of a fixed sleep to wait for async
/// callback delivery without flaking under load.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
