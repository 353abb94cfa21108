//! Minimal HTTP/1.1 server that accepts order POSTs for integration tests.
//!
//! Replies follow a script, one entry per request, then a fallback reply
//! forever. Records the `Idempotency-Key` header of every request it reads.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Respond with this status code and an empty body.
    Status(u16),
    /// Hold the connection open for this long, then close it without responding.
    Stall(Duration),
}

pub struct OrderServer {
    pub url: String,
    keys: Arc<Mutex<Vec<String>>>,
}

impl OrderServer {
    /// Idempotency keys received so far, in arrival order.
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

/// Starts a server in a background thread. It runs until the process exits.
pub fn start(script: Vec<Reply>, fallback: Reply) -> OrderServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let keys = Arc::new(Mutex::new(Vec::new()));
    let script = Arc::new(Mutex::new(script.into_iter()));
    let seen = Arc::clone(&keys);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let reply = script.lock().unwrap().next().unwrap_or(fallback);
            let seen = Arc::clone(&seen);
            thread::spawn(move || handle(stream, reply, &seen));
        }
    });
    OrderServer {
        url: format!("http://127.0.0.1:{}/orders", port),
        keys,
    }
}

/// A URL nothing is listening on.
pub fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/orders", port)
}

fn handle(mut stream: TcpStream, reply: Reply, seen: &Mutex<Vec<String>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    if let Some(key) = header(&request, "idempotency-key") {
        seen.lock().unwrap().push(key);
    }
    match reply {
        Reply::Status(code) => {
            let response = format!(
                "HTTP/1.1 {} Scripted\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                code
            );
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.flush();
        }
        Reply::Stall(d) => thread::sleep(d),
    }
}

/// Reads headers and the full body so closing the socket does not reset it.
fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let body_len: usize = header(&text, "content-length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + body_len {
                return Some(text);
            }
        }
    }
}

fn header(request: &str, name: &str) -> Option<String> {
    request.lines().skip(1).find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim()
            .eq_ignore_ascii_case(name)
            .then(|| v.trim().to_string())
    })
}
