use crate::error::{Result, ServerError};
use std::io::{BufRead, BufReader, Read};
use std::str;

/// Upper bound on the size of a request head.
pub const MAX_HEAD_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Other(String),
}

impl Method {
    fn parse(raw: &str) -> Self {
        match raw {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn request_line(&self) -> String {
        format!("{} {} {}", self.method.as_str(), self.target, self.version)
    }
}

/// Read bytes until the blank line ending the request head.
///
/// Returns an empty buffer if the peer closed the connection before sending anything.
pub fn read_header<T: Read>(stream: &mut T) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut reader = BufReader::new(stream.take(MAX_HEAD_LEN as u64));
    loop {
        let read = reader.read_until(b'\n', &mut buffer)?;
        if read == 0 {
            if buffer.is_empty() {
                return Ok(buffer);
            }
            return Err(ServerError::Malformed("connection closed mid-header"));
        }
        // Read until end of header.
        if buffer.ends_with(b"\r\n\r\n")
            || buffer.ends_with(b"\n\n")
            || buffer == b"\r\n"
            || buffer == b"\n"
        {
            break;
        }
        if buffer.len() >= MAX_HEAD_LEN {
            return Err(ServerError::Malformed("request head too large"));
        }
    }
    Ok(buffer)
}

/// Parse a raw request head. The request line is always the first line.
pub fn parse_request(head: &[u8]) -> Result<Request> {
    let text = str::from_utf8(head).map_err(|_| ServerError::Malformed("head is not UTF-8"))?;
    let mut lines = text.lines();

    let request_line = lines
        .next()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .ok_or(ServerError::Malformed("empty request line"))?;

    let parts: Vec<&str> = request_line.split(' ').collect();
    let [method, target, version] = parts[..] else {
        return Err(ServerError::Malformed("bad request syntax"));
    };
    if !version.starts_with("HTTP/") || method.is_empty() || target.is_empty() {
        return Err(ServerError::Malformed("bad request syntax"));
    }

    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(ServerError::Malformed("bad header line"))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(Request {
        method: Method::parse(method),
        target: target.to_string(),
        version: version.to_string(),
        headers,
    })
}

/// Read and parse one request. `Ok(None)` means the peer sent nothing or a bare blank line.
pub fn read_request<T: Read>(stream: &mut T) -> Result<Option<Request>> {
    let head = read_header(stream)?;
    if head.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    parse_request(&head).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_request_line_and_headers() {
        let raw = b"GET /docs/index.html?x=1 HTTP/1.1\r\nHost: localhost\r\nIf-Modified-Since: Sun, 06 Nov 1994 08:49:37 GMT\r\n\r\n";
        let request = read_request(&mut Cursor::new(&raw[..])).unwrap().unwrap();

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.target, "/docs/index.html?x=1");
        assert_eq!(request.version, "HTTP/1.1");
        assert_eq!(request.header("host"), Some("localhost"));
        assert_eq!(
            request.header("IF-MODIFIED-SINCE"),
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
        assert_eq!(request.request_line(), "GET /docs/index.html?x=1 HTTP/1.1");
    }

    #[test]
    fn bare_newlines_end_the_head() {
        let raw = b"HEAD / HTTP/1.0\nAccept: */*\n\n";
        let request = read_request(&mut Cursor::new(&raw[..])).unwrap().unwrap();
        assert_eq!(request.method, Method::Head);
        assert_eq!(request.header("accept"), Some("*/*"));
    }

    #[test]
    fn unknown_methods_are_kept() {
        let request = parse_request(b"DELETE /a HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.method, Method::Other("DELETE".into()));
        assert_eq!(request.method.as_str(), "DELETE");
    }

    #[test]
    fn empty_stream_yields_none() {
        assert!(read_request(&mut Cursor::new(&b""[..])).unwrap().is_none());
    }

    #[test]
    fn blank_line_yields_none() {
        assert!(read_request(&mut Cursor::new(&b"\r\n"[..])).unwrap().is_none());
        assert!(read_request(&mut Cursor::new(&b"\n"[..])).unwrap().is_none());
    }

    #[test]
    fn truncated_head_is_malformed() {
        let result = read_request(&mut Cursor::new(&b"GET / HTTP/1.1\r\nHost: x"[..]));
        assert!(matches!(result, Err(ServerError::Malformed(_))));
    }

    #[test]
    fn bad_request_lines_are_rejected() {
        for raw in [
            &b"GET /\r\n\r\n"[..],
            b"GET / HTTP/1.1 extra\r\n\r\n",
            b"GET / FTP/1.0\r\n\r\n",
            b"\r\n",
            b"GET / HTTP/1.1\r\nno-colon-here\r\n\r\n",
        ] {
            assert!(
                matches!(parse_request(raw), Err(ServerError::Malformed(_))),
                "accepted {:?}",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        while raw.len() <= MAX_HEAD_LEN {
            raw.extend_from_slice(b"X-Filler: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
        }
        raw.extend_from_slice(b"\r\n");

        let result = read_request(&mut Cursor::new(raw));
        assert!(matches!(result, Err(ServerError::Malformed(_))));
    }
}
