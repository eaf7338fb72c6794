use crate::error::{Result, ServerError};
use base64::{engine::general_purpose::STANDARD as STD_BASE64, Engine as _};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sha1::{Digest, Sha1};
use std::{
    io::{Read, Write},
    net::{IpAddr, TcpListener},
    path::Path,
    str,
    sync::{Arc, Condvar, Mutex},
    thread,
    time::Duration,
};

pub const RELOAD_PORT: u16 = 8129; /* Arbitrary port */

/// Script appended to HTML pages when reloading is enabled. Connects to [`RELOAD_PORT`].
pub const RELOAD_SCRIPT: &[u8] = include_bytes!("reload.html");

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Wakes every open reload socket when the served tree changes.
#[derive(Default)]
struct Changes {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl Changes {
    fn bump(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation += 1;
        self.changed.notify_all();
    }

    fn current(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the generation moves past `seen`, returning the new value.
    fn wait_past(&self, seen: u64) -> u64 {
        let guard = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        let guard = self
            .changed
            .wait_while(guard, |generation| *generation == seen)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

/// Build the `101 Switching Protocols` reply for a websocket upgrade request.
pub fn parse_websocket_handshake(bytes: &[u8]) -> Option<String> {
    let request_string = str::from_utf8(bytes).ok()?;
    let sec_websocket_key = request_string.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("Sec-WebSocket-Key")
            .then(|| value.trim())
    })?;

    // SHA1 of the key joined with a fixed GUID, base64 encoded.
    let mut hasher = Sha1::new();
    hasher.update(sec_websocket_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let accept = STD_BASE64.encode(hasher.finalize());

    Some(format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept
    ))
}

// An empty text frame: FIN bit plus the text opcode, then a zero payload length.
fn send_websocket_message<T: Write>(mut stream: T) -> std::io::Result<()> {
    stream.write_all(&[0b1000_0001, 0])?;
    stream.flush()
}

fn handle_websocket_handshake<T: Read + Write>(stream: &mut T) -> Result<()> {
    let header = crate::request::read_header(stream)?;
    let response = parse_websocket_handshake(&header)
        .ok_or(ServerError::Malformed("missing Sec-WebSocket-Key"))?;
    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}

/// Watch `path` and tell every connected page to reload when something in it changes.
///
/// Blocks for as long as the websocket listener accepts connections.
pub fn watch_for_reloads(address: IpAddr, path: &Path) -> Result<()> {
    let listener = TcpListener::bind((address, RELOAD_PORT)).map_err(|source| {
        ServerError::Bind {
            addr: (address, RELOAD_PORT).into(),
            source,
        }
    })?;

    let changes = Arc::new(Changes::default());

    let watcher_config = Config::default().with_poll_interval(Duration::from_secs(10));
    let mut watcher: RecommendedWatcher = {
        let changes = changes.clone();
        Watcher::new(
            move |event: notify::Result<Event>| match event {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(..) | EventKind::Modify(..)) {
                        tracing::debug!(paths = ?event.paths, "change detected, reloading pages");
                        changes.bump();
                    }
                }
                Err(e) => tracing::warn!("file watch error: {}", e),
            },
            watcher_config,
        )?
    };
    watcher.watch(path, RecursiveMode::Recursive)?;

    tracing::info!("Automatic reloading is enabled on port {}", RELOAD_PORT);

    // The only incoming message we expect to receive is the initial handshake.
    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!("reload connection failed: {}", e);
                continue;
            }
        };
        let changes = changes.clone();
        thread::spawn(move || {
            if let Err(e) = handle_websocket_handshake(&mut stream) {
                tracing::debug!("reload handshake failed: {}", e);
                return;
            }

            let mut seen = changes.current();
            loop {
                seen = changes.wait_past(seen);
                // A failed send most likely means the page was closed.
                if send_websocket_message(&stream).is_err() {
                    break;
                }
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc_example() {
        let request = b"GET /chat HTTP/1.1\r\nHost: server.example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
        let response = parse_websocket_handshake(request).unwrap();

        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let request = b"GET / HTTP/1.1\r\nsec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        assert!(parse_websocket_handshake(request).is_some());
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(parse_websocket_handshake(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").is_none());
    }

    #[test]
    fn message_is_an_empty_text_frame() {
        let mut out = Vec::new();
        send_websocket_message(&mut out).unwrap();
        assert_eq!(out, [0x81, 0x00]);
    }

    #[test]
    fn script_targets_reload_port() {
        let script = str::from_utf8(RELOAD_SCRIPT).unwrap();
        assert!(script.contains(&format!(":{}/", RELOAD_PORT)));
    }

    #[test]
    fn waiters_wake_on_change() {
        let changes = Arc::new(Changes::default());
        let seen = changes.current();

        let waiter = {
            let changes = changes.clone();
            thread::spawn(move || changes.wait_past(seen))
        };
        changes.bump();

        assert_eq!(waiter.join().unwrap(), seen + 1);
    }
}
