// Routing facade: registration and dispatch

use crate::container::Container;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Reply};
use crate::logging::{debug, info};
use crate::route::Route;
use crate::route_collection::RouteCollection;
use crate::Error;

/// Router for registering routes and dispatching requests
///
/// Holds a handle to the container it builds controllers from; the
/// container itself is shared, never owned exclusively.
#[derive(Debug)]
pub struct Router {
    container: Container,
    routes: RouteCollection,
}

impl Router {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            routes: RouteCollection::new(),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn get(&mut self, uri: &str, action: &str) -> Result<&mut Route, Error> {
        self.add_route(HttpMethod::GET, uri, action)
    }

    pub fn post(&mut self, uri: &str, action: &str) -> Result<&mut Route, Error> {
        self.add_route(HttpMethod::POST, uri, action)
    }

    pub fn put(&mut self, uri: &str, action: &str) -> Result<&mut Route, Error> {
        self.add_route(HttpMethod::PUT, uri, action)
    }

    pub fn patch(&mut self, uri: &str, action: &str) -> Result<&mut Route, Error> {
        self.add_route(HttpMethod::PATCH, uri, action)
    }

    pub fn delete(&mut self, uri: &str, action: &str) -> Result<&mut Route, Error> {
        self.add_route(HttpMethod::DELETE, uri, action)
    }

    pub fn options(&mut self, uri: &str, action: &str) -> Result<&mut Route, Error> {
        self.add_route(HttpMethod::OPTIONS, uri, action)
    }

    /// Create, compile and store a route.
    pub fn add_route(
        &mut self,
        method: HttpMethod,
        uri: &str,
        action: &str,
    ) -> Result<&mut Route, Error> {
        let route = Route::new(method, uri, action)?;
        route.compiled()?;
        debug!(route = %route, action, "Route registered");

        Ok(self.routes.add(route))
    }

    /// Register routes from a closure, typically a routes file.
    pub fn load_routes<F>(&mut self, register: F) -> Result<&mut Self, Error>
    where
        F: FnOnce(&mut Router) -> Result<(), Error>,
    {
        register(self)?;
        info!(route_count = self.routes.len(), "Routes loaded");
        Ok(self)
    }

    pub fn route_collection(&self) -> &RouteCollection {
        &self.routes
    }

    /// Match `request`, run its action and normalize the result.
    ///
    /// A request matching no route fails with [`Error::NotFound`].
    pub fn dispatch(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        let matched = self.routes.match_request(request).map_err(|e| match e {
            Error::RouteNotFound(target) => Error::NotFound(target),
            other => other,
        })?;

        debug!(
            route = %matched.route(),
            parameters = matched.parameters().len(),
            "Dispatching request"
        );

        let reply = matched.run(&self.container)?;
        Self::prepare_response(request, reply)
    }

    /// Turn an action's return value into a response for `request`.
    pub fn prepare_response(request: &HttpRequest, reply: Reply) -> Result<HttpResponse, Error> {
        let mut response = reply.into_response()?;
        if response.is_not_modified() {
            response.set_not_modified();
        }
        Ok(response.prepare(request))
    }
}
