// Core library for the Emberfuse micro web-framework
// Dependency injection container, reflection registry, route compilation
// and dispatch, and the application kernel that ties them together.

pub mod application;
pub mod container;
pub mod error;
pub mod http;
pub mod kernel;
pub mod logging;
pub mod pipeline;
pub mod reflection;
pub mod resolver;
pub mod route;
pub mod route_collection;
pub mod route_compiler;
pub mod routing;
pub mod validators;

// Re-export commonly used types
pub use application::*;
pub use container::*;
pub use error::*;
pub use self::http::*;
pub use kernel::*;
pub use pipeline::{Middleware, Pipe, Pipeline};
pub use reflection::*;
pub use resolver::ParameterResolver;
pub use route::{Route, RouteAction, RouteMatch, RouteParameters};
pub use route_collection::RouteCollection;
pub use route_compiler::{CompiledPattern, CompiledRoute, RouteCompiler};
pub use routing::Router;
pub use validators::{HostValidator, MethodValidator, RouteValidator, UriValidator};

pub use ::http::StatusCode;
