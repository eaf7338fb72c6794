use crate::error::{Result, ServerError};
use clap::Parser;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, Parser)]
#[command(name = "simpleserver", version)]
#[command(about = "Serve a directory over HTTP. Stop with Ctrl+C.")]
pub struct Cli {
    /// Port to listen on.
    #[arg(default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Address to bind to.
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Directory to serve. Defaults to the current directory.
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Additional response header, e.g. `Access-Control-Allow-Origin='*'`. Repeatable.
    #[arg(long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    pub headers: Vec<ExtraHeader>,

    /// Reload open pages when a file in the served directory changes.
    #[arg(long)]
    pub reload: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraHeader {
    pub name: String,
    pub value: String,
}

/// Accepts `Name: value` or `Name=value`.
pub fn parse_header(raw: &str) -> Result<ExtraHeader> {
    let invalid = |reason| ServerError::InvalidHeader {
        header: raw.to_string(),
        reason,
    };

    if raw.contains('\r') || raw.contains('\n') || !raw.is_ascii() {
        return Err(invalid("only ASCII without line breaks is allowed"));
    }

    let (name, value) = raw
        .split_once(':')
        .or_else(|| raw.split_once('='))
        .ok_or_else(|| invalid("expected a ':' or '=' separator"))?;

    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(invalid("header name must be a single non-empty token"));
    }

    Ok(ExtraHeader {
        name: name.to_string(),
        value: value.trim().to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
    pub root: PathBuf,
    pub headers: Vec<ExtraHeader>,
    pub reload: bool,
}

impl ServerConfig {
    /// Resolve the served directory against the current directory and check it.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let root = env::current_dir()?.join(cli.directory.unwrap_or_default());

        if !root.exists() {
            return Err(ServerError::DirectoryNotFound(root));
        }
        if !root.is_dir() {
            return Err(ServerError::NotADirectory(root));
        }

        Ok(Self {
            address: cli.bind,
            port: cli.port,
            root: root.canonicalize()?,
            headers: cli.headers,
            reload: cli.reload,
        })
    }
}
