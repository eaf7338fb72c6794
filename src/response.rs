use crate::config::ExtraHeader;
use chrono::{DateTime, Utc};
use std::io::{self, Write};

pub const SERVER_NAME: &str = concat!("SimpleServer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    MovedPermanently,
    NotModified,
    BadRequest,
    NotFound,
    NotImplemented,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::MovedPermanently => 301,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::NotImplemented => 501,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::NotImplemented => "Not Implemented",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(content_type: &str, body: Vec<u8>) -> Self {
        Self::new(StatusCode::Ok)
            .with_header("Content-Type", content_type)
            .with_body(body)
    }

    /// An HTML error page naming the status and `message`.
    pub fn error(status: StatusCode, message: &str) -> Self {
        let code = status.as_u16();
        let body = format!(
            "<!DOCTYPE HTML>\n<html lang=\"en\">\n    <head>\n        <meta charset=\"utf-8\">\n        <title>Error response</title>\n    </head>\n    <body>\n        <h1>Error response</h1>\n        <p>Error code: {}</p>\n        <p>Message: {}.</p>\n        <p>Error code explanation: {} - {}.</p>\n    </body>\n</html>\n",
            code,
            html_escape(message),
            code,
            status.reason(),
        );
        Self::new(status)
            .with_header("Content-Type", "text/html;charset=utf-8")
            .with_body(body.into_bytes())
    }

    pub fn redirect(location: &str) -> Self {
        Self::new(StatusCode::MovedPermanently).with_header("Location", location)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize onto `stream`. With `head_only` the body is left out, but
    /// `Content-Length` still reports its size.
    pub fn write_to<W: Write>(
        &self,
        stream: &mut W,
        extra: &[ExtraHeader],
        head_only: bool,
    ) -> io::Result<()> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nServer: {}\r\nDate: {}\r\n",
            self.status.as_u16(),
            self.status.reason(),
            SERVER_NAME,
            http_date(Utc::now()),
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        for header in extra {
            head.push_str(&format!("{}: {}\r\n", header.name, header.value));
        }
        if self.status != StatusCode::NotModified {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("Connection: close\r\n\r\n");

        let mut bytes = head.into_bytes();
        if !head_only && self.status != StatusCode::NotModified {
            bytes.extend_from_slice(&self.body);
        }
        stream.write_all(&bytes)?;
        stream.flush()
    }
}

/// Format a timestamp as an RFC 7231 IMF-fixdate.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

pub fn html_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_and_parses_http_dates() {
        let time = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(time));
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn writes_status_line_headers_and_body() {
        let mut out = Vec::new();
        Response::ok("text/plain; charset=utf-8", b"hello".to_vec())
            .write_to(
                &mut out,
                &[ExtraHeader {
                    name: "X-Extra".into(),
                    value: "1".into(),
                }],
                false,
            )
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains(&format!("Server: {}\r\n", SERVER_NAME)));
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.contains("X-Extra: 1\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[test]
    fn head_only_keeps_length_but_drops_body() {
        let mut out = Vec::new();
        Response::ok("text/plain", b"hello".to_vec())
            .write_to(&mut out, &[], true)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn error_page_escapes_message() {
        let response = Response::error(StatusCode::NotImplemented, "Unsupported method ('<X>')");
        let body = String::from_utf8(response.body.clone()).unwrap();

        assert_eq!(response.header("content-type"), Some("text/html;charset=utf-8"));
        assert!(body.contains("Error code: 501"));
        assert!(body.contains("Unsupported method (&#x27;&lt;X&gt;&#x27;)"));
        assert!(body.contains("501 - Not Implemented"));
    }
}
