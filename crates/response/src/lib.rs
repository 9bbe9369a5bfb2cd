use std::{borrow::Cow, fmt::Display};

pub const HTTP_VERSION: &str = "HTTP/1.1";
pub const HTTP_NEW_LINE: &str = "\r\n";
pub const HTML_NEW_LINE: &str = "\n";

/// Status code plus reason phrase as it appears on the status line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub reason: Cow<'static, str>,
}

macro_rules! statuses {
    ($($name:ident => ($code:literal, $reason:literal)),* $(,)?) => {
        impl Status {
            $(pub const $name: Status = Status { code: $code, reason: Cow::Borrowed($reason) };)*

            /// Known status for `code`, or one with the reason `Unknown`.
            pub fn from_code(code: u16) -> Status {
                match code {
                    $($code => Status::$name,)*
                    _ => Status { code, reason: Cow::Borrowed("Unknown") },
                }
            }
        }
    };
}

statuses! {
    CONTINUE => (100, "Continue"),
    SWITCHING_PROTOCOLS => (101, "Switching Protocols"),
    OK => (200, "OK"),
    CREATED => (201, "Created"),
    ACCEPTED => (202, "Accepted"),
    NON_AUTHORITATIVE_INFORMATION => (203, "Non-Authoritative Information"),
    NO_CONTENT => (204, "No Content"),
    RESET_CONTENT => (205, "Reset Content"),
    PARTIAL_CONTENT => (206, "Partial Content"),
    MULTIPLE_CHOICES => (300, "Multiple Choices"),
    MOVED_PERMANENTLY => (301, "Moved Permanently"),
    FOUND => (302, "Found"),
    SEE_OTHER => (303, "See Other"),
    NOT_MODIFIED => (304, "Not Modified"),
    USE_PROXY => (305, "Use Proxy"),
    TEMPORARY_REDIRECT => (307, "Temporary Redirect"),
    BAD_REQUEST => (400, "Bad Request"),
    UNAUTHORIZED => (401, "Unauthorized"),
    PAYMENT_REQUIRED => (402, "Payment Required"),
    FORBIDDEN => (403, "Forbidden"),
    NOT_FOUND => (404, "Not Found"),
    METHOD_NOT_ALLOWED => (405, "Method Not Allowed"),
    NOT_ACCEPTABLE => (406, "Not Acceptable"),
    PROXY_AUTHENTICATION_REQUIRED => (407, "Proxy Authentication Required"),
    REQUEST_TIMEOUT => (408, "Request Time-out"),
    CONFLICT => (409, "Conflict"),
    GONE => (410, "Gone"),
    LENGTH_REQUIRED => (411, "Length Required"),
    PRECONDITION_FAILED => (412, "Precondition Failed"),
    REQUEST_ENTITY_TOO_LARGE => (413, "Request Entity Too Large"),
    REQUEST_URI_TOO_LARGE => (414, "Request-URI Too Large"),
    UNSUPPORTED_MEDIA_TYPE => (415, "Unsupported Media Type"),
    REQUESTED_RANGE_NOT_SATISFIABLE => (416, "Requested range not satisfiable"),
    EXPECTATION_FAILED => (417, "Expectation Failed"),
    INTERNAL_SERVER_ERROR => (500, "Internal Server Error"),
    NOT_IMPLEMENTED => (501, "Not Implemented"),
    BAD_GATEWAY => (502, "Bad Gateway"),
    SERVICE_UNAVAILABLE => (503, "Service Unavailable"),
    GATEWAY_TIMEOUT => (504, "Gateway Time-out"),
    HTTP_VERSION_NOT_SUPPORTED => (505, "HTTP Version not supported"),
}

impl Status {
    pub fn new(code: u16, reason: &str) -> Self {
        Self {
            code,
            reason: Cow::Owned(reason.to_owned()),
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// Buffered HTTP response.
///
/// Handlers append body bytes with [`Response::write`] and finalize the
/// status line with [`Response::respond`]. Nothing reaches the wire until the
/// server serializes the response with [`Response::to_bytes`].
#[derive(Debug)]
pub struct Response {
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    content_length: Option<u64>,
    omit_body: bool,
    status: Option<Status>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            headers: vec![],
            body: vec![],
            content_length: None,
            omit_body: false,
            status: None,
        }
    }

    /// `Content-Length` is taken as the explicit content length rather than
    /// stored, so it is never serialized twice.
    pub fn add_header(&mut self, header_name: &str, header_value: &str) {
        if header_name.eq_ignore_ascii_case("content-length") {
            if let Ok(length) = header_value.trim().parse() {
                self.content_length = Some(length);
            }
            return;
        }
        self.headers
            .push((header_name.to_owned(), header_value.to_owned()));
    }

    pub fn find_header(&self, header_name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(header_name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Appends to the body and returns the number of bytes written.
    pub fn write<B: AsRef<[u8]>>(&mut self, body: B) -> usize {
        let body = body.as_ref();
        self.body.extend_from_slice(body);
        body.len()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn set_body_bytes(&mut self, body: Vec<u8>) {
        self.body = body;
        self.content_length = None;
    }

    pub fn set_content_length(&mut self, content_length: u64) {
        self.content_length = Some(content_length);
    }

    pub fn content_length(&self) -> u64 {
        self.content_length.unwrap_or(self.body.len() as u64)
    }

    /// Serialize headers only, e.g. for a `HEAD` request.
    pub fn omit_body(&mut self) {
        self.omit_body = true;
    }

    pub fn respond(&mut self, status_code: u16, reason_phrase: &str) {
        self.status = Some(Status::new(status_code, reason_phrase));
    }

    pub fn respond_status(&mut self, status: &Status) {
        self.status = Some(status.clone());
    }

    /// Replaces whatever was prepared with a minimal HTML page naming the status.
    pub fn respond_with_message(&mut self, status: &Status) {
        let omit_body = self.omit_body;
        self.reset();
        self.omit_body = omit_body;
        self.write(format!(
            "<html><head><title>{0}</title></head><body><h1>{0}</h1></body></html>",
            status.reason
        ));
        self.add_header("Content-Type", "text/html");
        self.respond_status(status);
    }

    pub fn is_responded(&self) -> bool {
        self.status.is_some()
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let status = self
            .status
            .clone()
            .unwrap_or(Status::INTERNAL_SERVER_ERROR);
        let mut head = format!("{HTTP_VERSION} {status}{HTTP_NEW_LINE}");
        for (k, v) in &self.headers {
            head.push_str(&format!("{k}: {v}{HTTP_NEW_LINE}"));
        }
        head.push_str(&format!(
            "Content-Length: {}{HTTP_NEW_LINE}{HTTP_NEW_LINE}",
            self.content_length()
        ));

        if self.omit_body {
            head.into_bytes()
        } else {
            [head.as_bytes(), self.body.as_slice()].concat()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Response, Status};

    #[test]
    fn serializes_status_line_headers_and_body() {
        let mut response = Response::new();
        response.add_header("Content-Type", "text/plain");
        response.write("hi");
        response.respond(200, "OK");

        assert_eq!(
            response.to_bytes(),
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nhi".to_vec()
        );
    }

    #[test]
    fn explicit_content_length_header_is_not_duplicated() {
        let mut response = Response::new();
        response.add_header("content-length", "10");
        response.omit_body();
        response.respond_status(&Status::OK);

        let text = String::from_utf8(response.to_bytes()).unwrap();
        assert_eq!(text.matches("Content-Length").count(), 1);
        assert!(text.ends_with("Content-Length: 10\r\n\r\n"));
        assert!(response.headers().is_empty());
    }

    #[test]
    fn writes_accumulate_in_order() {
        let mut response = Response::new();
        assert_eq!(response.write("foo"), 3);
        assert_eq!(response.write(b"bar".as_slice()), 3);
        assert_eq!(response.body(), b"foobar");
        assert!(!response.is_responded());
    }

    #[test]
    fn respond_with_message_discards_prepared_output() {
        let mut response = Response::new();
        response.add_header("X-Stale", "1");
        response.write("partial");
        response.respond_with_message(&Status::SERVICE_UNAVAILABLE);

        assert_eq!(response.status(), Some(&Status::SERVICE_UNAVAILABLE));
        assert_eq!(response.find_header("x-stale"), None);
        assert_eq!(response.find_header("content-type"), Some("text/html"));
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.contains("<h1>Service Unavailable</h1>"));
    }

    #[test]
    fn status_lookup_by_code() {
        assert_eq!(Status::from_code(404), Status::NOT_FOUND);
        assert_eq!(Status::from_code(299).reason, "Unknown");
        assert_eq!(Status::new(200, "OK"), Status::OK);
    }

    #[test]
    fn unresponded_response_serializes_as_server_error() {
        let response = Response::new();
        assert!(response.to_bytes().starts_with(b"HTTP/1.1 500 Internal Server Error\r\n"));
    }
}
