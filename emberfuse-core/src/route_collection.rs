// Route storage and request matching

use crate::http::HttpRequest;
use crate::logging::{debug, trace};
use crate::route::{Route, RouteMatch};
use crate::validators::decoded_path;
use crate::Error;
use std::collections::HashMap;

/// Registered routes, indexed by method and by `method + uri`.
#[derive(Debug, Default)]
pub struct RouteCollection {
    routes: Vec<Route>,
    by_method: HashMap<String, Vec<usize>>,
    all: HashMap<String, usize>,
}

impl RouteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. A route with the same method and URI is replaced in
    /// place, keeping its position in the match order.
    pub fn add(&mut self, route: Route) -> &mut Route {
        let method = route.method().as_str().to_string();
        let key = format!("{method}{}", route.uri());

        let index = match self.all.get(&key) {
            Some(&index) => {
                debug!(route = %route, "Replacing previously registered route");
                self.routes[index] = route;
                index
            }
            None => {
                let index = self.routes.len();
                self.routes.push(route);
                self.by_method.entry(method).or_default().push(index);
                self.all.insert(key, index);
                index
            }
        };

        &mut self.routes[index]
    }

    /// First route registered for the request method whose validators all
    /// pass, bound to the request.
    pub fn match_request(&self, request: &HttpRequest) -> Result<RouteMatch<'_>, Error> {
        let method = request.method().to_uppercase();

        for route in self.get_by_method(&method) {
            if route.matches(request)? {
                trace!(route = %route, "Route matched");
                return route.bind(request);
            }
        }

        Err(Error::RouteNotFound(format!("{method} {}", decoded_path(request))))
    }

    /// Routes registered for `method`, in registration order.
    pub fn get_by_method(&self, method: &str) -> Vec<&Route> {
        self.by_method
            .get(&method.to_uppercase())
            .map(|indices| indices.iter().map(|&i| &self.routes[i]).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, method: &str, uri: &str) -> Option<&Route> {
        let key = format!("{}/{}", method.to_uppercase(), uri.trim().trim_matches('/'));
        self.all.get(&key).map(|&index| &self.routes[index])
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
