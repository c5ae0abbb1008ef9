// HTTP request and response types

use crate::Error;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// HTTP methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    /// Raw request path, still percent-encoded.
    pub path: String,
    /// Explicit host; falls back to the `Host` header when unset.
    pub host: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Build a request from a URI that may carry a query string.
    pub fn create(uri: &str, method: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };

        let mut request = Self::new(method, path);
        if let Some(query) = query {
            request.query_params = parse_query(query);
        }
        request
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path trimmed of surrounding slashes and re-prefixed with a single `/`.
    pub fn path_info(&self) -> String {
        format!("/{}", self.path.trim().trim_matches('/'))
    }

    /// Lower-cased host name without port.
    pub fn host(&self) -> Option<String> {
        let raw = self.host.as_deref().or_else(|| self.header("host"))?;
        let name = match raw.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => raw,
        };
        Some(name.trim().to_ascii_lowercase())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    pub fn is_method(&self, method: HttpMethod) -> bool {
        self.method.eq_ignore_ascii_case(method.as_str())
    }

    /// Parse JSON body
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Http(e.to_string()))
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

/// HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = text.into().into_bytes();
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(value).map_err(|e| Error::Internal(e.to_string()))?;
        self.set_header("Content-Type", "application/json");
        Ok(self)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set a header, replacing any existing one with the same name.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.remove_header(&key);
        self.headers.insert(key, value.into());
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED.as_u16()
    }

    pub fn is_empty_status(&self) -> bool {
        self.status_code().is_informational() || matches!(self.status, 204 | 304)
    }

    /// Turn this response into a `304 Not Modified`.
    pub fn set_not_modified(&mut self) {
        self.status = StatusCode::NOT_MODIFIED.as_u16();
        self.body.clear();
        for header in [
            "Allow",
            "Content-Encoding",
            "Content-Language",
            "Content-Length",
            "Content-MD5",
            "Content-Type",
            "Last-Modified",
        ] {
            self.remove_header(header);
        }
    }

    /// Fix up headers and body so the response is consistent with `request`.
    pub fn prepare(mut self, request: &HttpRequest) -> Self {
        if self.is_empty_status() {
            self.body.clear();
            self.remove_header("Content-Type");
            self.remove_header("Content-Length");
            return self;
        }

        if self.header("Content-Type").is_none() && !self.body.is_empty() {
            self.set_header("Content-Type", "text/html; charset=UTF-8");
        }
        self.set_header("Content-Length", self.body.len().to_string());

        if request.is_method(HttpMethod::HEAD) {
            self.body.clear();
        }

        self
    }
}

/// What a controller action returned, before normalization into a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Response(HttpResponse),
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    Empty,
}

impl Reply {
    pub fn is_response(&self) -> bool {
        matches!(self, Reply::Response(_))
    }

    /// Wrap a raw value in a `200` response; responses pass through.
    pub fn into_response(self) -> Result<HttpResponse, Error> {
        match self {
            Reply::Response(response) => Ok(response),
            Reply::Text(text) => Ok(HttpResponse::ok().with_text(text)),
            Reply::Json(value) => HttpResponse::ok().with_json(&value),
            Reply::Bytes(bytes) => Ok(HttpResponse::ok().with_body(bytes)),
            Reply::Empty => Ok(HttpResponse::ok()),
        }
    }
}

impl From<HttpResponse> for Reply {
    fn from(response: HttpResponse) -> Self {
        Reply::Response(response)
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Reply {
    fn from(value: serde_json::Value) -> Self {
        Reply::Json(value)
    }
}

impl From<Vec<u8>> for Reply {
    fn from(bytes: Vec<u8>) -> Self {
        Reply::Bytes(bytes)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_splits_query() {
        let request = HttpRequest::create("/search?q=hello+world&page=2", "get");
        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/search");
        assert_eq!(request.query("q").map(String::as_str), Some("hello world"));
        assert_eq!(request.query("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_path_info_normalization() {
        assert_eq!(HttpRequest::create("foo/bar/", "GET").path_info(), "/foo/bar");
        assert_eq!(HttpRequest::create("", "GET").path_info(), "/");
        assert_eq!(HttpRequest::create("/", "GET").path_info(), "/");
    }

    #[test]
    fn test_host_from_header_strips_port() {
        let request = HttpRequest::new("GET", "/").with_header("Host", "API.Example.com:8080");
        assert_eq!(request.host().as_deref(), Some("api.example.com"));

        let explicit = HttpRequest::new("GET", "/").with_host("admin.example.com");
        assert_eq!(explicit.host().as_deref(), Some("admin.example.com"));

        assert_eq!(HttpRequest::new("GET", "/").host(), None);
    }

    #[test]
    fn test_prepare_sets_length_and_type() {
        let request = HttpRequest::new("GET", "/");
        let response = HttpResponse::ok().with_text("hello").prepare(&request);

        assert_eq!(response.header("content-length"), Some("5"));
        assert_eq!(response.header("content-type"), Some("text/html; charset=UTF-8"));
        assert_eq!(response.text(), "hello");
    }

    #[test]
    fn test_prepare_head_drops_body() {
        let request = HttpRequest::new("HEAD", "/");
        let response = HttpResponse::ok().with_text("hello").prepare(&request);

        assert!(response.body.is_empty());
        assert_eq!(response.header("Content-Length"), Some("5"));
    }

    #[test]
    fn test_set_not_modified() {
        let mut response = HttpResponse::ok()
            .with_text("cached")
            .with_header("Content-Type", "text/plain")
            .with_header("ETag", "\"abc\"");
        response.set_not_modified();

        assert_eq!(response.status, 304);
        assert!(response.body.is_empty());
        assert_eq!(response.header("Content-Type"), None);
        assert_eq!(response.header("ETag"), Some("\"abc\""));
    }

    #[test]
    fn test_reply_into_response() {
        let response = Reply::from("hi").into_response().unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "hi");

        let json = Reply::from(serde_json::json!({"ok": true}))
            .into_response()
            .unwrap();
        assert_eq!(json.header("Content-Type"), Some("application/json"));

        assert!(Reply::from(HttpResponse::not_found()).is_response());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(HttpMethod::from_str("patch"), Some(HttpMethod::PATCH));
        assert_eq!(HttpMethod::from_str("TRACE"), None);
        assert_eq!(HttpMethod::OPTIONS.to_string(), "OPTIONS");
    }
}
