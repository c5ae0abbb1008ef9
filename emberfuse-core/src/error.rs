// Error types for the Emberfuse framework

use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A bound or implied concrete could not be instantiated.
    #[error("{message}")]
    BindingResolution {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Strict lookup of an identifier that was never bound.
    #[error("No entry was found for [{id}] identifier")]
    EntryNotFound {
        id: String,
        #[source]
        source: Box<Error>,
    },

    /// A single parameter could not be supplied during resolution.
    #[error("Unresolvable dependency resolving [{parameter}] in class {class}")]
    DependencyResolution { parameter: String, class: String },

    #[error("Circular dependency detected while resolving [{id}]: {}", .path.join(" -> "))]
    CircularDependency { id: String, path: Vec<String> },

    #[error("Invalid route action [{0}]: expected `Controller@method`")]
    InvalidActionFormat(String),

    #[error("Method named [{method}] does not exist on controller [{controller}]")]
    ActionMethodNotFound { controller: String, method: String },

    #[error("Invalid route template [{template}]: {reason}")]
    InvalidRouteTemplate { template: String, reason: String },

    #[error("Argument [{parameter}] is not a {expected}")]
    ArgumentType { parameter: String, expected: String },

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bootstrap error: {0}")]
    Bootstrap(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn binding(message: impl Into<String>) -> Self {
        Error::BindingResolution {
            message: message.into(),
            source: None,
        }
    }

    /// Fold a parameter failure into the container's error family.
    ///
    /// Callers of `make` only ever see `BindingResolution` (or a cycle),
    /// whatever went wrong further down the graph.
    pub(crate) fn into_binding_resolution(self) -> Self {
        match self {
            Error::DependencyResolution { .. } | Error::ArgumentType { .. } => {
                Error::BindingResolution {
                    message: self.to_string(),
                    source: Some(Box::new(self)),
                }
            }
            other => other,
        }
    }

    /// True for errors raised while satisfying a dependency graph.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::BindingResolution { .. }
                | Error::DependencyResolution { .. }
                | Error::EntryNotFound { .. }
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.http_status().as_u16()
    }

    /// Get the HTTP status for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            Error::RouteNotFound(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ArgumentType { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.http_status().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.http_status().is_server_error()
    }
}
