// HTTP kernel: bootstrapping, middleware and error rendering

use crate::application::{Application, Bootstrapper};
use crate::http::{HttpRequest, HttpResponse};
use crate::logging::{debug, error, warn};
use crate::pipeline::{Middleware, Pipeline};
use crate::reflection::Value;
use crate::Error;
use serde_json::json;
use std::sync::Arc;

/// Container identifier of the application's `Arc<dyn ExceptionHandler>`.
pub const EXCEPTION_HANDLER_KEY: &str = "exception.handler";

/// Reports and renders errors escaping request handling.
pub trait ExceptionHandler: Send + Sync {
    fn report(&self, error: &Error);

    fn render(&self, request: &HttpRequest, error: &Error) -> HttpResponse;
}

/// Logs through `tracing` and renders a JSON error body.
///
/// Outside debug mode, server errors hide their message behind the
/// canonical status reason.
#[derive(Debug, Clone, Default)]
pub struct DefaultExceptionHandler {
    debug: bool,
}

impl DefaultExceptionHandler {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl ExceptionHandler for DefaultExceptionHandler {
    fn report(&self, err: &Error) {
        if err.is_server_error() {
            error!(error = %err, status = err.status_code(), "Unhandled error");
        } else {
            warn!(error = %err, status = err.status_code(), "Request failed");
        }
    }

    fn render(&self, request: &HttpRequest, err: &Error) -> HttpResponse {
        let status = err.http_status();
        let message = if self.debug || !status.is_server_error() {
            err.to_string()
        } else {
            status.canonical_reason().unwrap_or("Server Error").to_string()
        };

        let body = json!({ "error": message, "status": status.as_u16() });
        HttpResponse::new(status.as_u16())
            .with_json(&body)
            .unwrap_or_else(|_| HttpResponse::new(status.as_u16()).with_text(message))
            .prepare(request)
    }
}

/// Handles requests for an [`Application`].
///
/// Errors go to the handler bound under [`EXCEPTION_HANDLER_KEY`], so a
/// service provider can replace it; without one the kernel falls back to
/// [`DefaultExceptionHandler`].
pub struct Kernel {
    app: Application,
    bootstrappers: Vec<Arc<dyn Bootstrapper>>,
    middleware: Vec<Arc<Middleware>>,
    fallback_handler: Arc<dyn ExceptionHandler>,
}

impl Kernel {
    pub fn new(app: Application) -> Self {
        Self {
            app,
            bootstrappers: Vec::new(),
            middleware: Vec::new(),
            fallback_handler: Arc::new(DefaultExceptionHandler::default()),
        }
    }

    pub fn with_bootstrapper(mut self, bootstrapper: Arc<dyn Bootstrapper>) -> Self {
        self.bootstrappers.push(bootstrapper);
        self
    }

    pub fn with_bootstrappers(mut self, bootstrappers: Vec<Arc<dyn Bootstrapper>>) -> Self {
        self.bootstrappers.extend(bootstrappers);
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Register `handler` in the application container.
    pub fn with_exception_handler(self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.app
            .container()
            .instance(EXCEPTION_HANDLER_KEY, Value::new(handler));
        self
    }

    /// The handler bound in the container, or the default one.
    pub fn exception_handler(&self) -> Arc<dyn ExceptionHandler> {
        let container = self.app.container();
        if !container.has(EXCEPTION_HANDLER_KEY) {
            return self.fallback_handler.clone();
        }

        match container.make_as::<Arc<dyn ExceptionHandler>>(EXCEPTION_HANDLER_KEY) {
            Ok(handler) => handler.as_ref().clone(),
            Err(err) => {
                warn!(error = %err, "Exception handler binding unusable, using default");
                self.fallback_handler.clone()
            }
        }
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut Application {
        &mut self.app
    }

    /// Run the bootstrappers unless that already happened.
    pub fn bootstrap(&self) -> Result<(), Error> {
        self.app.bootstrap_once(&self.bootstrappers)
    }

    /// Handle a request; errors become rendered responses.
    pub fn handle(&self, request: HttpRequest) -> HttpResponse {
        match self.send_request_through_router(&request) {
            Ok(response) => response,
            Err(err) => {
                let handler = self.exception_handler();
                handler.report(&err);
                handler.render(&request, &err)
            }
        }
    }

    /// Handle a request, reporting and returning any error instead of
    /// rendering it.
    pub fn handle_uncaught(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.send_request_through_router(&request).inspect_err(|err| {
            self.exception_handler().report(err);
        })
    }

    fn send_request_through_router(&self, request: &HttpRequest) -> Result<HttpResponse, Error> {
        self.bootstrap()?;
        self.app.boot()?;

        debug!(
            method = %request.method,
            path = %request.path,
            middleware_count = self.middleware.len(),
            "Handling request"
        );

        Pipeline::send(request.clone())
            .through(self.middleware.clone())
            .then(|request| self.app.router().dispatch(&request))
    }
}
