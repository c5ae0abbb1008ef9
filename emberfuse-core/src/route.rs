// A single registered route and its per-dispatch match

use crate::container::Container;
use crate::http::{HttpMethod, HttpRequest, Reply};
use crate::logging::{debug, trace};
use crate::reflection::{Parameters, Value};
use crate::route_compiler::{CompiledRoute, RouteCompiler};
use crate::validators::{decoded_path, validators};
use crate::Error;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;

/// The `Controller@method` target of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAction {
    pub controller: String,
    pub method: String,
}

impl RouteAction {
    pub fn parse(action: &str) -> Result<Self, Error> {
        match action.split_once('@') {
            Some((controller, method)) if !controller.is_empty() && !method.is_empty() => {
                Ok(Self {
                    controller: controller.to_string(),
                    method: method.to_string(),
                })
            }
            _ => Err(Error::InvalidActionFormat(action.to_string())),
        }
    }
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.controller, self.method)
    }
}

/// Route definition
///
/// The compiled pattern is built on first use and dropped whenever a
/// requirement or host constraint changes.
pub struct Route {
    method: HttpMethod,
    uri: String,
    action: RouteAction,
    host: Option<String>,
    wheres: HashMap<String, String>,
    compiled: OnceCell<CompiledRoute>,
}

impl Route {
    pub fn new(method: HttpMethod, uri: &str, action: &str) -> Result<Self, Error> {
        Ok(Self {
            method,
            uri: normalize_uri(uri),
            action: RouteAction::parse(action)?,
            host: None,
            wheres: HashMap::new(),
            compiled: OnceCell::new(),
        })
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn action(&self) -> &RouteAction {
        &self.action
    }

    pub fn host_template(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn wheres(&self) -> &HashMap<String, String> {
        &self.wheres
    }

    /// Constrain a placeholder with a regular expression.
    ///
    /// The route is recompiled right away; an invalid requirement is
    /// rejected and leaves the route unchanged.
    pub fn where_param(&mut self, name: &str, requirement: &str) -> Result<&mut Self, Error> {
        let previous = self
            .wheres
            .insert(name.to_string(), requirement.to_string());

        if let Err(err) = self.recompile() {
            match previous {
                Some(previous) => self.wheres.insert(name.to_string(), previous),
                None => self.wheres.remove(name),
            };
            self.compiled = OnceCell::new();
            return Err(err);
        }
        Ok(self)
    }

    /// Restrict the route to hosts matching `host`, which may contain
    /// placeholders of its own.
    ///
    /// Like [`where_param`](Self::where_param), a template that does not
    /// compile leaves the route unchanged.
    pub fn domain(&mut self, host: &str) -> Result<&mut Self, Error> {
        let previous = self.host.replace(host.to_string());

        if let Err(err) = self.recompile() {
            self.host = previous;
            self.compiled = OnceCell::new();
            return Err(err);
        }
        Ok(self)
    }

    fn recompile(&mut self) -> Result<(), Error> {
        self.compiled = OnceCell::new();
        self.compiled().map(|_| ())
    }

    /// The compiled pattern, compiling on first call.
    pub fn compiled(&self) -> Result<&CompiledRoute, Error> {
        self.compiled.get_or_try_init(|| RouteCompiler::compile(self))
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Run the validator chain against `request`.
    pub fn matches(&self, request: &HttpRequest) -> Result<bool, Error> {
        let compiled = self.compiled()?;

        for validator in validators() {
            if !validator.matches(self, compiled, request) {
                trace!(
                    route = %self,
                    validator = validator.description(),
                    "Route rejected request"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Extract parameters for a request this route matched.
    pub fn bind(&self, request: &HttpRequest) -> Result<RouteMatch<'_>, Error> {
        let compiled = self.compiled()?;
        let mut parameters = RouteParameters::default();

        if let (Some(pattern), Some(host)) = (compiled.host(), request.host()) {
            parameters.extend(pattern.captures(&host).unwrap_or_default());
        }

        let path = decoded_path(request);
        match compiled.path().captures(&path) {
            Some(captures) => parameters.extend(captures),
            None => return Err(Error::RouteNotFound(format!("{} {}", request.method(), path))),
        }

        Ok(RouteMatch {
            route: self,
            parameters,
        })
    }

    /// Bind `request` and execute the action.
    pub fn run(&self, request: &HttpRequest, container: &Container) -> Result<Reply, Error> {
        self.bind(request)?.run(container)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("action", &self.action.to_string())
            .field("host", &self.host)
            .field("wheres", &self.wheres)
            .finish()
    }
}

fn normalize_uri(uri: &str) -> String {
    format!("/{}", uri.trim().trim_matches('/'))
}

/// Path and host parameters captured for one request, in declared order.
///
/// Optional segments that were absent (or empty) are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParameters {
    values: Vec<(String, Option<String>)>,
}

impl RouteParameters {
    fn extend(&mut self, captures: Vec<(String, Option<String>)>) {
        self.values.extend(
            captures
                .into_iter()
                .map(|(name, value)| (name, value.filter(|v| !v.is_empty()))),
        );
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn all(&self) -> &[(String, Option<String>)] {
        &self.values
    }

    /// Captured values as an override frame, absent segments left out so
    /// the action's own defaults apply.
    pub fn without_nulls(&self) -> Parameters {
        self.values
            .iter()
            .filter_map(|(name, value)| {
                value
                    .as_ref()
                    .map(|value| (name.clone(), Value::new(value.clone())))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A route bound to one request.
///
/// Lives for a single dispatch, so concurrent requests on the same route
/// never share captured parameters.
#[derive(Debug)]
pub struct RouteMatch<'r> {
    route: &'r Route,
    parameters: RouteParameters,
}

impl<'r> RouteMatch<'r> {
    pub fn route(&self) -> &'r Route {
        self.route
    }

    pub fn parameters(&self) -> &RouteParameters {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name)
    }

    /// Build the controller and invoke the action method.
    ///
    /// Action parameters are resolved like constructor parameters, with the
    /// captured route parameters as named overrides.
    pub fn run(&self, container: &Container) -> Result<Reply, Error> {
        let action = self.route.action();
        let controller = container.make(&action.controller)?;

        let class = container
            .class_of(&controller)
            .or_else(|| container.class(&action.controller));
        let not_found = || Error::ActionMethodNotFound {
            controller: action.controller.clone(),
            method: action.method.clone(),
        };
        let class = class.ok_or_else(not_found)?;
        let method = class.method(&action.method).ok_or_else(not_found)?;

        let args = container.resolve_dependencies(
            method.parameters(),
            &self.parameters.without_nulls(),
            class.name(),
        )?;

        debug!(
            route = %self.route,
            action = %action,
            argument_count = args.len(),
            "Invoking route action"
        );
        method.invoke(&controller, &args)
    }
}
