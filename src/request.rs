use std::{
    fmt::Display,
    io::{BufRead, Read},
};

use crate::error::ParseError;

pub const MAX_LINE_LENGTH: usize = 8 * 1024;
pub const MAX_HEADERS: usize = 100;
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum RequestMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Trace,
    Connect,
    Unknown(String),
}

impl Display for RequestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestMethod::Get => f.write_str("GET"),
            RequestMethod::Head => f.write_str("HEAD"),
            RequestMethod::Post => f.write_str("POST"),
            RequestMethod::Put => f.write_str("PUT"),
            RequestMethod::Delete => f.write_str("DELETE"),
            RequestMethod::Patch => f.write_str("PATCH"),
            RequestMethod::Options => f.write_str("OPTIONS"),
            RequestMethod::Trace => f.write_str("TRACE"),
            RequestMethod::Connect => f.write_str("CONNECT"),
            RequestMethod::Unknown(method) => f.write_str(method),
        }
    }
}

impl From<&str> for RequestMethod {
    fn from(value: &str) -> Self {
        match value {
            "GET" => RequestMethod::Get,
            "HEAD" => RequestMethod::Head,
            "POST" => RequestMethod::Post,
            "PUT" => RequestMethod::Put,
            "DELETE" => RequestMethod::Delete,
            "PATCH" => RequestMethod::Patch,
            "OPTIONS" => RequestMethod::Options,
            "TRACE" => RequestMethod::Trace,
            "CONNECT" => RequestMethod::Connect,
            other => RequestMethod::Unknown(other.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Request {
    pub method: RequestMethod,
    // Request target; url rules may strip a prefix from it.
    pub uri: String,
    // Request target exactly as the client sent it.
    pub complete_uri: String,
    pub path: String,
    pub query_string: String,
    pub fragment: String,
    pub version_major: u8,
    pub version_minor: u8,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Builds a request without touching the wire.
    pub fn new(method: RequestMethod, uri: &str) -> Self {
        let (path, query_string, fragment) = split_uri(uri);
        Self {
            method,
            uri: uri.to_string(),
            complete_uri: uri.to_string(),
            path,
            query_string,
            fragment,
            version_major: 1,
            version_minor: 1,
            headers: vec![],
            body: vec![],
        }
    }

    pub fn with_header(mut self, header_name: &str, header_value: &str) -> Self {
        self.headers
            .push((header_name.to_string(), header_value.to_string()));
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// First value of `header_name`, compared case-insensitively.
    pub fn find_header_value(&self, header_name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(header_name))
            .map(|(_, v)| v.as_str())
    }

    pub fn find_header_values(&self, header_name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(header_name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn has_header(&self, header_name: &str) -> bool {
        self.find_header_value(header_name).is_some()
    }

    pub fn keep_alive(&self) -> bool {
        let connection = self
            .find_header_value("Connection")
            .map(|v| v.to_ascii_lowercase());
        match (self.version_major, self.version_minor) {
            (1, 0) => connection.as_deref() == Some("keep-alive"),
            (1, _) => connection.as_deref() != Some("close"),
            _ => false,
        }
    }

    /// Rewrites the request target after a url rule stripped `prefix` from it.
    pub(crate) fn strip_prefix(&mut self, prefix: &str) {
        let strip = |value: &str| {
            let rest = value.strip_prefix(prefix).unwrap_or(value);
            if rest.starts_with('/') {
                rest.to_string()
            } else {
                format!("/{rest}")
            }
        };
        self.path = strip(&self.path);
        self.uri = strip(&self.uri);
    }

    /// Reads one request off `reader`.
    ///
    /// Returns `Ok(None)` when the peer closed the connection before sending
    /// anything, which is how a keep-alive connection normally ends.
    pub fn parse<R: BufRead>(reader: &mut R) -> Result<Option<Self>, ParseError> {
        let request_line = loop {
            match read_line(reader)? {
                None => return Ok(None),
                // tolerate stray CRLFs between pipelined requests
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };

        let parts = request_line.split_whitespace().collect::<Vec<&str>>();
        let [raw_method, raw_uri, raw_version] = parts[..] else {
            return Err(ParseError::MalformedRequestLine(request_line.clone()));
        };
        let (version_major, version_minor) = parse_version(raw_version)?;

        let mut request = Request::new(RequestMethod::from(raw_method), raw_uri);
        request.version_major = version_major;
        request.version_minor = version_minor;

        loop {
            let line = read_line(reader)?.ok_or(ParseError::UnexpectedEof)?;
            if line.is_empty() {
                break;
            }
            if request.headers.len() == MAX_HEADERS {
                return Err(ParseError::TooManyHeaders(MAX_HEADERS));
            }
            let Some((header_name, header_value)) = line.split_once(':') else {
                return Err(ParseError::MalformedHeader(line));
            };
            request
                .headers
                .push((header_name.trim().to_string(), header_value.trim().to_string()));
        }

        let chunked = request
            .find_header_value("Transfer-Encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
        if chunked {
            request.body = read_chunked_body(reader)?;
        } else if let Some(content_length) = request.find_header_value("Content-Length") {
            let body_length: usize = content_length
                .parse()
                .map_err(|_| ParseError::InvalidContentLength(content_length.to_string()))?;
            if body_length > MAX_BODY_SIZE {
                return Err(ParseError::BodyTooLarge(MAX_BODY_SIZE));
            }
            log::trace!("Request body size={}", body_length);
            let mut body = vec![0; body_length];
            reader.read_exact(&mut body)?;
            request.body = body;
        }
        Ok(Some(request))
    }
}

/// Decodes `%XX` escapes; malformed escapes are kept verbatim.
pub fn url_decode(url: &str) -> String {
    let bytes = url.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or_default();
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn split_uri(uri: &str) -> (String, String, String) {
    let (rest, fragment) = uri.split_once('#').unwrap_or((uri, ""));
    let (path, query_string) = rest.split_once('?').unwrap_or((rest, ""));
    (path.to_string(), query_string.to_string(), fragment.to_string())
}

fn parse_version(raw_version: &str) -> Result<(u8, u8), ParseError> {
    let unsupported = || ParseError::UnsupportedVersion(raw_version.to_string());
    let (major, minor) = raw_version
        .strip_prefix("HTTP/")
        .and_then(|v| v.split_once('.'))
        .ok_or_else(unsupported)?;
    match (major.parse(), minor.parse()) {
        (Ok(1), Ok(minor)) => Ok((1, minor)),
        _ => Err(unsupported()),
    }
}

/// One CRLF (or bare LF) terminated line without its terminator.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>, ParseError> {
    let mut line = Vec::new();
    let bytes_read = reader
        .take(MAX_LINE_LENGTH as u64 + 1)
        .read_until(b'\n', &mut line)?;
    if bytes_read == 0 {
        return Ok(None);
    }
    if !line.ends_with(b"\n") {
        if bytes_read > MAX_LINE_LENGTH {
            return Err(ParseError::LineTooLong(MAX_LINE_LENGTH));
        }
        return Err(ParseError::UnexpectedEof);
    }
    line.pop();
    if line.ends_with(b"\r") {
        line.pop();
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

fn read_chunked_body<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, ParseError> {
    let mut body = Vec::new();
    loop {
        let size_line = read_line(reader)?.ok_or(ParseError::UnexpectedEof)?;
        let size_field = size_line.split(';').next().unwrap_or_default().trim();
        let chunk_size = usize::from_str_radix(size_field, 16)
            .map_err(|_| ParseError::InvalidChunk(size_line.clone()))?;
        if chunk_size == 0 {
            break;
        }
        if chunk_size > MAX_BODY_SIZE - body.len() {
            return Err(ParseError::BodyTooLarge(MAX_BODY_SIZE));
        }
        let start = body.len();
        body.resize(start + chunk_size, 0);
        reader.read_exact(&mut body[start..])?;
        // CRLF closing the chunk data
        read_line(reader)?.ok_or(ParseError::UnexpectedEof)?;
    }
    // trailer section
    while let Some(line) = read_line(reader)? {
        if line.is_empty() {
            break;
        }
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{url_decode, Request, RequestMethod};
    use crate::error::ParseError;

    fn parse(raw: &str) -> Result<Option<Request>, ParseError> {
        Request::parse(&mut Cursor::new(raw.as_bytes().to_vec()))
    }

    #[test]
    fn parses_request_line_and_headers() {
        let request = parse(
            "GET /index?lang=en#top HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-agent\r\n\r\n",
        )
        .unwrap()
        .unwrap();

        assert_eq!(request.method, RequestMethod::Get);
        assert_eq!(request.uri(), "/index?lang=en#top");
        assert_eq!(request.path(), "/index");
        assert_eq!(request.query_string(), "lang=en");
        assert_eq!(request.fragment, "top");
        assert_eq!((request.version_major, request.version_minor), (1, 1));
        assert_eq!(request.find_header_value("User-Agent"), Some("test-agent"));
    }

    #[test]
    fn header_lookup_ignores_case_and_returns_first() {
        let request = Request::new(RequestMethod::Get, "/")
            .with_header("Accept", "text/html")
            .with_header("accept", "text/plain");

        assert_eq!(request.find_header_value("ACCEPT"), Some("text/html"));
        assert_eq!(
            request.find_header_values("accept"),
            vec!["text/html", "text/plain"]
        );
        assert!(request.has_header("Accept"));
        assert_eq!(request.find_header_value("User-Agent"), None);
    }

    #[test]
    fn header_values_may_contain_colons() {
        let request = parse("GET / HTTP/1.1\r\nHost: localhost:8080\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(request.find_header_value("host"), Some("localhost:8080"));
    }

    #[test]
    fn reads_content_length_body() {
        let request = parse("POST /upload HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello")
            .unwrap()
            .unwrap();
        assert_eq!(request.method, RequestMethod::Post);
        assert_eq!(request.body, b"hello");
    }

    #[test]
    fn reads_chunked_body() {
        let request = parse(
            "POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\n\r\n",
        )
        .unwrap()
        .unwrap();
        assert_eq!(request.body, b"Wikipedia");
    }

    #[test]
    fn pipelined_requests_are_read_one_at_a_time() {
        let mut reader = Cursor::new(
            b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n".to_vec(),
        );
        let first = Request::parse(&mut reader).unwrap().unwrap();
        let second = Request::parse(&mut reader).unwrap().unwrap();
        assert_eq!(first.path(), "/a");
        assert_eq!(second.path(), "/b");
        assert!(Request::parse(&mut reader).unwrap().is_none());
    }

    #[test]
    fn empty_stream_is_not_an_error() {
        assert!(parse("").unwrap().is_none());
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            parse("GET /\r\n\r\n"),
            Err(ParseError::MalformedRequestLine(_))
        ));
        assert!(matches!(
            parse("GET / HTTP/2.0\r\n\r\n"),
            Err(ParseError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            parse("GET / HTTP/1.1\r\nno-colon-here\r\n\r\n"),
            Err(ParseError::MalformedHeader(_))
        ));
        assert!(matches!(
            parse("POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n"),
            Err(ParseError::InvalidContentLength(_))
        ));
        assert!(matches!(
            parse("GET / HTTP/1.1\r\nHost: x\r\n"),
            Err(ParseError::UnexpectedEof)
        ));
    }

    #[test]
    fn rejects_overlong_lines() {
        let raw = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(super::MAX_LINE_LENGTH));
        let err = parse(&raw).unwrap_err();
        assert!(matches!(err, ParseError::LineTooLong(_)));
        assert_eq!(err.status().code, 414);
    }

    #[test]
    fn rejects_too_many_headers() {
        let headers = (0..super::MAX_HEADERS)
            .map(|i| format!("X-Header-{i}: {i}\r\n"))
            .collect::<String>();
        assert!(parse(&format!("GET / HTTP/1.1\r\n{headers}\r\n"))
            .unwrap()
            .is_some());

        let raw = format!("GET / HTTP/1.1\r\n{headers}X-One-More: 1\r\n\r\n");
        let err = parse(&raw).unwrap_err();
        assert!(matches!(err, ParseError::TooManyHeaders(100)));
        assert_eq!(err.status().code, 400);
    }

    #[test]
    fn rejects_oversized_bodies() {
        let raw = format!(
            "POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            super::MAX_BODY_SIZE + 1
        );
        let err = parse(&raw).unwrap_err();
        assert!(matches!(err, ParseError::BodyTooLarge(_)));
        assert_eq!(err.status().code, 413);

        let raw = format!(
            "POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n",
            super::MAX_BODY_SIZE + 1
        );
        assert!(matches!(parse(&raw), Err(ParseError::BodyTooLarge(_))));
    }

    #[test]
    fn huge_chunk_after_data_is_too_large() {
        let err = parse(
            "POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\nffffffffffffffff\r\n",
        )
        .unwrap_err();
        // usize cannot hold the size on 32-bit targets
        assert!(matches!(
            err,
            ParseError::BodyTooLarge(_) | ParseError::InvalidChunk(_)
        ));
    }

    #[test]
    fn rejects_invalid_chunk_size() {
        let err = parse("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nxyz\r\nWiki\r\n0\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidChunk(line) if line == "xyz"));
        assert!(matches!(
            parse("POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n-4\r\nWiki\r\n"),
            Err(ParseError::InvalidChunk(_))
        ));
    }

    #[test]
    fn keep_alive_defaults_depend_on_version() {
        let mut request = Request::new(RequestMethod::Get, "/");
        assert!(request.keep_alive());

        request.headers.push(("Connection".into(), "close".into()));
        assert!(!request.keep_alive());

        let mut request = Request::new(RequestMethod::Get, "/");
        request.version_minor = 0;
        assert!(!request.keep_alive());
        request.headers.push(("Connection".into(), "Keep-Alive".into()));
        assert!(request.keep_alive());
    }

    #[test]
    fn strip_prefix_keeps_leading_slash() {
        let mut request = Request::new(RequestMethod::Get, "/static/css/site.css?v=2");
        request.strip_prefix("/static");
        assert_eq!(request.path(), "/css/site.css");
        assert_eq!(request.uri(), "/css/site.css?v=2");
        assert_eq!(request.complete_uri, "/static/css/site.css?v=2");

        let mut request = Request::new(RequestMethod::Get, "/static");
        request.strip_prefix("/static");
        assert_eq!(request.path(), "/");
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(url_decode("/my%20file.txt"), "/my file.txt");
        assert_eq!(url_decode("%e4%bd%a0"), "你");
        assert_eq!(url_decode("100%"), "100%");
        assert_eq!(url_decode("%zz%4"), "%zz%4");
    }
}
