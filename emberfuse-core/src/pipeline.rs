//! Linear processing pipeline.
//!
//! A value is handed to each pipe in order, every pipe returning the
//! (possibly replaced) value for the next one, and the final value goes to
//! a destination closure. There is no branching: a pipe either passes the
//! value on or fails the whole pipeline.
//!
//! ```
//! use emberfuse_core::pipeline::Pipeline;
//!
//! let total = Pipeline::send(1)
//!     .pipe(|n: i32| Ok(n + 1))
//!     .pipe(|n: i32| Ok(n * 10))
//!     .then_return()
//!     .unwrap();
//!
//! assert_eq!(total, 20);
//! ```

use crate::http::HttpRequest;
use crate::logging::trace;
use crate::Error;
use std::sync::Arc;

/// One stage of a [`Pipeline`].
pub trait Pipe<T>: Send + Sync {
    fn handle(&self, package: T) -> Result<T, Error>;
}

impl<T, F> Pipe<T> for F
where
    F: Fn(T) -> Result<T, Error> + Send + Sync,
{
    fn handle(&self, package: T) -> Result<T, Error> {
        self(package)
    }
}

/// Request middleware: a pipe over the incoming request.
pub type Middleware = dyn Pipe<HttpRequest>;

pub struct Pipeline<T> {
    package: T,
    pipes: Vec<Arc<dyn Pipe<T>>>,
}

impl<T: 'static> Pipeline<T> {
    /// Start a pipeline carrying `package`.
    pub fn send(package: T) -> Self {
        Self {
            package,
            pipes: Vec::new(),
        }
    }

    /// Replace the pipes.
    pub fn through(mut self, pipes: Vec<Arc<dyn Pipe<T>>>) -> Self {
        self.pipes = pipes;
        self
    }

    /// Append a closure stage.
    pub fn pipe<F>(mut self, stage: F) -> Self
    where
        F: Fn(T) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.pipes.push(Arc::new(stage));
        self
    }

    /// Run every pipe in order, then hand the result to `destination`.
    pub fn then<R, F>(self, destination: F) -> Result<R, Error>
    where
        F: FnOnce(T) -> Result<R, Error>,
    {
        let mut package = self.package;
        for (index, pipe) in self.pipes.iter().enumerate() {
            trace!(pipe_index = index, "Sending package through pipe");
            package = pipe.handle(package)?;
        }
        destination(package)
    }

    /// Run the pipes and return the processed value.
    pub fn then_return(self) -> Result<T, Error> {
        self.then(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Uppercase;

    impl Pipe<HashMap<String, String>> for Uppercase {
        fn handle(
            &self,
            mut package: HashMap<String, String>,
        ) -> Result<HashMap<String, String>, Error> {
            for value in package.values_mut() {
                *value = value.to_uppercase();
            }
            Ok(package)
        }
    }

    fn data() -> HashMap<String, String> {
        HashMap::from([
            ("foo".to_string(), "bar".to_string()),
            ("bar".to_string(), "baz".to_string()),
        ])
    }

    #[test]
    fn test_basic_piping() {
        let pipes: Vec<Arc<dyn Pipe<HashMap<String, String>>>> = vec![Arc::new(Uppercase)];
        let result = Pipeline::send(data())
            .through(pipes)
            .pipe(|mut d: HashMap<String, String>| {
                d.insert("piped".into(), "yes".into());
                Ok(d)
            })
            .then_return()
            .unwrap();

        assert_ne!(result, data());
        assert_eq!(result["foo"], "BAR");
        assert_eq!(result["piped"], "yes");
    }

    #[test]
    fn test_empty_pipes_pass_through() {
        let result = Pipeline::send(data()).through(Vec::new()).then(Ok).unwrap();
        assert_eq!(result, data());
    }

    #[test]
    fn test_failing_pipe_stops_pipeline() {
        let result = Pipeline::send(1)
            .pipe(|_: i32| Err(Error::Internal("halt".into())))
            .pipe(|_: i32| panic!("must not run"))
            .then_return();

        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[test]
    fn test_request_middleware() {
        let tag: Arc<Middleware> =
            Arc::new(|request: HttpRequest| -> Result<HttpRequest, Error> {
                Ok(request.with_header("X-Seen", "1"))
            });

        let request = Pipeline::send(HttpRequest::new("GET", "/"))
            .through(vec![tag])
            .then_return()
            .unwrap();

        assert_eq!(request.header("x-seen"), Some("1"));
    }
}
