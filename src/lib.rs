// Emberfuse - a micro web-framework for Rust
//
// A dependency injection container that builds controllers from declared
// class descriptors, a route compiler and matcher, and an HTTP kernel that
// bootstraps the application and dispatches requests.

// Re-export core functionality
pub use emberfuse_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use emberfuse_config;

/// A kernel for `app` running the environment, configuration, logging and
/// service bootstrappers.
#[cfg(feature = "config")]
pub fn http_kernel(app: Application) -> Kernel {
    Kernel::new(app).with_bootstrappers(emberfuse_config::default_bootstrappers())
}

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Application,
        Bootstrapper,
        ClassBuilder,
        ExceptionHandler,
        Container,
        Error,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        Injectable,
        Kernel,
        Middleware,
        ParameterDescriptor,
        Parameters,
        Reply,
        Route,
        Router,
        ServiceProvider,
        Value,
        identifier,
    };

    #[cfg(feature = "config")]
    pub use crate::http_kernel;

    #[cfg(feature = "config")]
    pub use emberfuse_config::Repository;
}
