// Constructor and method parameter resolution

use crate::container::{Container, ResolutionChain};
use crate::logging::trace;
use crate::reflection::{Arguments, ParameterDescriptor, Parameters, Value};
use crate::Error;

/// Produces argument lists for constructors and action methods.
///
/// Precedence per parameter: an override with the same name, then (for
/// primitives) the declared default, then (for services) a nested
/// container resolution falling back to the default when the parameter is
/// optional.
pub struct ParameterResolver<'a> {
    container: &'a Container,
    chain: Option<&'a ResolutionChain<'a>>,
}

impl<'a> ParameterResolver<'a> {
    pub fn new(container: &'a Container, chain: Option<&'a ResolutionChain<'a>>) -> Self {
        Self { container, chain }
    }

    /// Resolve `parameters` in declared order.
    pub fn resolve(
        &self,
        parameters: &[ParameterDescriptor],
        overrides: &Parameters,
        declaring_class: &str,
    ) -> Result<Arguments, Error> {
        let mut args = Arguments::new();

        for parameter in parameters {
            let value = match overrides.get(parameter.name()) {
                Some(value) => value.clone(),
                None => match parameter.declared_type() {
                    None => self.resolve_primitive(parameter, declaring_class)?,
                    Some(class) => self.resolve_class(parameter, class)?,
                },
            };
            args.push(parameter.name(), value);
        }

        Ok(args)
    }

    fn resolve_primitive(
        &self,
        parameter: &ParameterDescriptor,
        declaring_class: &str,
    ) -> Result<Value, Error> {
        parameter
            .default_value()
            .cloned()
            .ok_or_else(|| Error::DependencyResolution {
                parameter: parameter.name().to_string(),
                class: declaring_class.to_string(),
            })
    }

    fn resolve_class(&self, parameter: &ParameterDescriptor, class: &str) -> Result<Value, Error> {
        trace!(parameter = parameter.name(), class, "Resolving class-typed parameter");

        match self.container.resolve_in(class, &Parameters::new(), self.chain) {
            Ok(value) => Ok(value),
            Err(e @ Error::CircularDependency { .. }) => Err(e),
            Err(e) => match parameter.default_value() {
                Some(default) if parameter.is_optional() => {
                    trace!(parameter = parameter.name(), error = %e, "Falling back to default");
                    Ok(default.clone())
                }
                _ => Err(e),
            },
        }
    }
}
