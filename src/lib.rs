//! Serve a directory of static files over HTTP.
//!
//! One thread per connection and one request per connection. `GET` and `HEAD`
//! are supported; directories are answered with `index.html`/`index.htm` or a
//! generated listing.
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub mod config;
pub mod error;
pub mod listing;
pub mod logger;
pub mod mime;
pub mod path;
pub mod reload;
pub mod request;
pub mod response;

pub use config::{Cli, ExtraHeader, ServerConfig, DEFAULT_PORT};
pub use error::{Result, ServerError};

use request::{Method, Request};
use response::{http_date, parse_http_date, Response, StatusCode};

/// Idle clients are dropped after this long without sending a full request head.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

const INDEX_FILES: [&str; 2] = ["index.html", "index.htm"];

/// Read one request from `stream`, answer it and log the exchange.
pub fn handle_client<T: Read + Write>(
    stream: &mut T,
    config: &ServerConfig,
    peer: &str,
) -> Result<()> {
    let request = match request::read_request(stream) {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(ServerError::Malformed(reason)) => {
            tracing::debug!(%peer, "rejecting request: {}", reason);
            let response = Response::error(StatusCode::BadRequest, "Bad request syntax");
            response.write_to(stream, &config.headers, false)?;
            tracing::info!("{} \"-\" {} -", peer, response.status.as_u16());
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let response = respond(&request, config);
    let head_only = request.method == Method::Head;
    response.write_to(stream, &config.headers, head_only)?;

    let size = if head_only || response.body.is_empty() {
        "-".to_string()
    } else {
        response.body.len().to_string()
    };
    tracing::info!(
        "{} \"{}\" {} {}",
        peer,
        request.request_line(),
        response.status.as_u16(),
        size
    );
    Ok(())
}

/// Build the response for a parsed request.
pub fn respond(request: &Request, config: &ServerConfig) -> Response {
    if let Method::Other(method) = &request.method {
        return Response::error(
            StatusCode::NotImplemented,
            &format!("Unsupported method ('{}')", method),
        );
    }

    let url_path = path::url_path(&request.target);
    let fs_path = path::translate(&config.root, &request.target);

    if fs_path.is_dir() {
        if !url_path.ends_with('/') {
            // A leading `//` would make the location protocol-relative.
            let location = format!(
                "/{}/{}",
                url_path.trim_start_matches('/'),
                path::url_query(&request.target)
            );
            return Response::redirect(&location);
        }
        for index in INDEX_FILES {
            let candidate = fs_path.join(index);
            if candidate.is_file() {
                return serve_file(&candidate, request, config);
            }
        }
        return match listing::render(&fs_path, url_path) {
            Ok(body) => Response::ok("text/html; charset=utf-8", body),
            Err(e) => {
                tracing::warn!("could not list {}: {}", fs_path.display(), e);
                Response::error(StatusCode::NotFound, "No permission to list directory")
            }
        };
    }

    if url_path.ends_with('/') {
        return not_found(&fs_path);
    }

    serve_file(&with_html_fallback(fs_path), request, config)
}

// `/blog-post` is served from `blog-post.html` when no extensionless file exists.
fn with_html_fallback(path: PathBuf) -> PathBuf {
    if path.extension().is_some() || path.exists() {
        return path;
    }
    let html = path.with_extension("html");
    if html.is_file() {
        html
    } else {
        path
    }
}

fn not_found(path: &Path) -> Response {
    tracing::debug!("could not find file: {}", path.display());
    Response::error(StatusCode::NotFound, "File not found")
}

fn serve_file(path: &Path, request: &Request, config: &ServerConfig) -> Response {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return not_found(path),
    };
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

    if let Some(modified) = modified {
        if is_not_modified(request, modified) {
            return Response::new(StatusCode::NotModified)
                .with_header("Last-Modified", http_date(modified));
        }
    }

    let mut body = match fs::read(path) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("could not read {}: {}", path.display(), e);
            return not_found(path);
        }
    };

    let extension = path.extension().and_then(OsStr::to_str);
    if extension.is_none() {
        tracing::debug!(
            "serving file without extension: [ {} ] with media type 'application/octet-stream'",
            path.display()
        );
    }

    // Inject code into HTML if reload is enabled.
    let is_html = matches!(
        extension.map(str::to_ascii_lowercase).as_deref(),
        Some("html" | "htm")
    );
    if config.reload && is_html {
        body.extend_from_slice(reload::RELOAD_SCRIPT);
    }

    let mut response = Response::ok(mime::from_extension(extension), body);
    if let Some(modified) = modified {
        response = response.with_header("Last-Modified", http_date(modified));
    }
    response
}

// No entity tags are produced, so any `If-None-Match` disables the date check.
fn is_not_modified(request: &Request, modified: DateTime<Utc>) -> bool {
    if request.header("If-None-Match").is_some() {
        return false;
    }
    request
        .header("If-Modified-Since")
        .and_then(parse_http_date)
        .is_some_and(|since| modified.timestamp() <= since.timestamp())
}

fn handle_connection(mut stream: TcpStream, config: &ServerConfig) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "-".to_string());

    if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        tracing::debug!(%peer, "could not set read timeout: {}", e);
    }
    if let Err(e) = handle_client(&mut stream, config, &peer) {
        tracing::debug!(%peer, "connection error: {}", e);
    }
}

/// A bound, not yet serving, static file server.
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
}

impl Server {
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let addr = SocketAddr::new(config.address, config.port);
        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept connections forever, each on its own thread.
    pub fn serve(self) -> Result<()> {
        if self.config.reload {
            let address = self.config.address;
            let root = self.config.root.clone();
            thread::spawn(move || {
                if let Err(e) = reload::watch_for_reloads(address, &root) {
                    tracing::error!("automatic reloading stopped: {}", e);
                }
            });
        }

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let config = self.config.clone();
                    thread::spawn(move || handle_connection(stream, &config));
                }
                Err(e) => tracing::warn!("failed to accept connection: {}", e),
            }
        }
        Ok(())
    }
}

/// Bind and serve until the process is interrupted.
pub fn run(config: ServerConfig) -> Result<()> {
    let server = Server::bind(config)?;
    let addr = server.local_addr()?;

    tracing::info!("Serving directory [{}]", server.config().root.display());
    tracing::info!(
        "Serving HTTP on {} port {} (http://{}/) ...",
        addr.ip(),
        addr.port(),
        addr
    );
    tracing::info!("Stop with Ctrl+C");

    server.serve()
}
