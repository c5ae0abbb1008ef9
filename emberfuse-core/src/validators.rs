//! Request validators run by [`Route::matches`](crate::Route::matches).
//!
//! Each validator checks one aspect of a request against a compiled route.
//! They run in order (method, host, URI) and the first failure rejects the
//! route.

use crate::http::HttpRequest;
use crate::route::Route;
use crate::route_compiler::CompiledRoute;

/// One check a request must pass for a route to match.
pub trait RouteValidator: Send + Sync {
    fn matches(&self, route: &Route, compiled: &CompiledRoute, request: &HttpRequest) -> bool;

    /// Short name used in trace output.
    fn description(&self) -> &str;
}

/// Request method equals the route method.
#[derive(Debug, Clone, Copy)]
pub struct MethodValidator;

impl RouteValidator for MethodValidator {
    fn matches(&self, route: &Route, _compiled: &CompiledRoute, request: &HttpRequest) -> bool {
        request.is_method(route.method())
    }

    fn description(&self) -> &str {
        "method"
    }
}

/// Request host matches the route's host template, if it has one.
#[derive(Debug, Clone, Copy)]
pub struct HostValidator;

impl RouteValidator for HostValidator {
    fn matches(&self, _route: &Route, compiled: &CompiledRoute, request: &HttpRequest) -> bool {
        compiled.matches_host(request.host().as_deref())
    }

    fn description(&self) -> &str {
        "host"
    }
}

/// Percent-decoded request path matches the compiled path pattern.
#[derive(Debug, Clone, Copy)]
pub struct UriValidator;

impl RouteValidator for UriValidator {
    fn matches(&self, _route: &Route, compiled: &CompiledRoute, request: &HttpRequest) -> bool {
        compiled.matches_path(&decoded_path(request))
    }

    fn description(&self) -> &str {
        "uri"
    }
}

/// The validator chain, in evaluation order.
pub fn validators() -> [&'static dyn RouteValidator; 3] {
    [&MethodValidator, &HostValidator, &UriValidator]
}

/// `path_info` with percent-escapes decoded; invalid UTF-8 is replaced.
pub(crate) fn decoded_path(request: &HttpRequest) -> String {
    let path = request.path_info();
    String::from_utf8_lossy(&urlencoding::decode_binary(path.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn route(method: HttpMethod, uri: &str) -> Route {
        Route::new(method, uri, "Controller@index").unwrap()
    }

    #[test]
    fn test_method_validator() {
        let route = route(HttpMethod::POST, "/users");
        let compiled = route.compiled().unwrap();

        assert!(MethodValidator.matches(&route, compiled, &HttpRequest::new("post", "/users")));
        assert!(!MethodValidator.matches(&route, compiled, &HttpRequest::new("GET", "/users")));
    }

    #[test]
    fn test_host_validator() {
        let mut route = route(HttpMethod::GET, "/");
        route.domain("{tenant}.example.com").unwrap();
        let compiled = route.compiled().unwrap();

        let request = HttpRequest::new("GET", "/").with_host("acme.example.com");
        assert!(HostValidator.matches(&route, compiled, &request));

        let request = HttpRequest::new("GET", "/").with_host("example.org");
        assert!(!HostValidator.matches(&route, compiled, &request));
    }

    #[test]
    fn test_uri_validator_decodes_path() {
        let route = route(HttpMethod::GET, "/foo/bar/åαф");
        let compiled = route.compiled().unwrap();
        let request = HttpRequest::new("GET", "/foo/bar/%C3%A5%CE%B1%D1%84");

        assert!(UriValidator.matches(&route, compiled, &request));
    }

    #[test]
    fn test_chain_order() {
        let names: Vec<&str> = validators().iter().map(|v| v.description()).collect();
        assert_eq!(names, vec!["method", "host", "uri"]);
    }

    #[test]
    fn test_decoded_path_with_invalid_utf8() {
        let request = HttpRequest::new("GET", "/%FF");
        assert_eq!(decoded_path(&request), "/\u{FFFD}");
    }
}
