use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("could not bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path [{}] does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("path [{}] is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid header {header:?}: {reason}")]
    InvalidHeader { header: String, reason: &'static str },

    #[error("malformed request: {0}")]
    Malformed(&'static str),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
