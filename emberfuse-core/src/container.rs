// Dependency injection container

use crate::logging::{debug, trace};
use crate::reflection::{
    Arguments, Class, ClassRegistry, Injectable, ParameterDescriptor, Parameters, Value, identifier,
};
use crate::resolver::ParameterResolver;
use crate::Error;
use parking_lot::RwLock;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A factory producing the value for a binding.
///
/// Receives the active [`ResolutionScope`] and the override frame of the
/// `make` call that triggered it.
pub type Factory =
    Arc<dyn Fn(&ResolutionScope<'_>, &Parameters) -> Result<Value, Error> + Send + Sync>;

/// What an abstract identifier is bound to.
#[derive(Clone)]
pub enum Concrete {
    /// A producer closure.
    Factory(Factory),
    /// A class name; either the abstract itself or an alias target.
    Class(String),
}

impl Concrete {
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&ResolutionScope<'_>, &Parameters) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Concrete::Factory(Arc::new(factory))
    }
}

impl From<&str> for Concrete {
    fn from(class: &str) -> Self {
        Concrete::Class(class.to_string())
    }
}

impl From<String> for Concrete {
    fn from(class: String) -> Self {
        Concrete::Class(class)
    }
}

impl fmt::Debug for Concrete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concrete::Factory(_) => f.write_str("Factory(..)"),
            Concrete::Class(name) => f.debug_tuple("Class").field(name).finish(),
        }
    }
}

/// A registered binding.
#[derive(Clone, Debug)]
pub struct Binding {
    pub concrete: Concrete,
    pub shared: bool,
}

/// Container behaviour switches.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub enable_circular_dependency_detection: bool,
    pub max_resolution_depth: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enable_circular_dependency_detection: true,
            max_resolution_depth: 100,
        }
    }
}

/// The identifiers currently being resolved, innermost first.
///
/// Lives on the call stack: every nested resolution links a new node to its
/// parent, so concurrent resolutions never share it.
#[derive(Debug)]
pub struct ResolutionChain<'a> {
    id: &'a str,
    parent: Option<&'a ResolutionChain<'a>>,
    depth: usize,
}

impl<'a> ResolutionChain<'a> {
    fn push(parent: Option<&'a ResolutionChain<'a>>, id: &'a str) -> Self {
        Self {
            id,
            parent,
            depth: parent.map_or(1, |p| p.depth + 1),
        }
    }

    pub fn id(&self) -> &str {
        self.id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn contains(&self, id: &str) -> bool {
        self.iter().any(|node| node.id == id)
    }

    /// Outermost identifier first.
    pub fn path(&self) -> Vec<String> {
        let mut path: Vec<String> = self.iter().map(|node| node.id.to_string()).collect();
        path.reverse();
        path
    }

    fn iter(&self) -> impl Iterator<Item = &ResolutionChain<'a>> {
        std::iter::successors(Some(self), |node| node.parent)
    }
}

thread_local! {
    /// Resolutions in flight on this thread, keyed by container.
    ///
    /// Catches cycles that re-enter through a fresh `make` on the container
    /// itself instead of through the [`ResolutionScope`].
    static ACTIVE: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks one resolution as in flight until dropped.
struct ActiveResolution;

impl ActiveResolution {
    fn enter(container: usize, abstract_id: &str) -> Self {
        ACTIVE.with(|active| active.borrow_mut().push((container, abstract_id.to_string())));
        ActiveResolution
    }
}

impl Drop for ActiveResolution {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            active.borrow_mut().pop();
        });
    }
}

/// Handle passed to factories.
///
/// Nested resolutions started through the scope stay on the same chain and
/// take part in cycle detection.
pub struct ResolutionScope<'a> {
    container: &'a Container,
    chain: &'a ResolutionChain<'a>,
}

impl<'a> ResolutionScope<'a> {
    pub fn container(&self) -> &Container {
        self.container
    }

    /// Identifier this scope is resolving.
    pub fn abstract_id(&self) -> &str {
        self.chain.id()
    }

    pub fn chain(&self) -> &ResolutionChain<'a> {
        self.chain
    }

    pub fn make(&self, abstract_id: &str) -> Result<Value, Error> {
        self.make_with(abstract_id, &Parameters::new())
    }

    pub fn make_with(&self, abstract_id: &str, parameters: &Parameters) -> Result<Value, Error> {
        self.container
            .resolve_in(abstract_id, parameters, Some(self.chain))
    }

    pub fn make_as<T: Any + Send + Sync>(&self, abstract_id: &str) -> Result<Arc<T>, Error> {
        let value = self.make(abstract_id)?;
        downcast_resolved(abstract_id, value)
    }

    /// Build a concrete class directly, bypassing its binding.
    pub fn build(&self, class: &str, parameters: &Parameters) -> Result<Value, Error> {
        self.container.build_class(class, parameters, self.chain)
    }
}

struct ContainerInner {
    bindings: RwLock<HashMap<String, Binding>>,
    instances: RwLock<HashMap<String, Value>>,
    classes: RwLock<ClassRegistry>,
    config: ContainerConfig,
}

/// The dependency injection container
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        debug!(
            max_depth = config.max_resolution_depth,
            "Creating new DI container"
        );
        Self {
            inner: Arc::new(ContainerInner {
                bindings: RwLock::new(HashMap::new()),
                instances: RwLock::new(HashMap::new()),
                classes: RwLock::new(ClassRegistry::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Class descriptions
    // ------------------------------------------------------------------

    /// Describe a class so it can be built by name.
    pub fn register_class(&self, class: Class) {
        let name = class.name().to_string();
        self.inner.classes.write().register(class);
        trace!(class = %name, "Class registered");
    }

    /// Describe a self-describing type.
    pub fn register<T: Injectable>(&self) {
        self.register_class(T::class());
    }

    pub fn class(&self, name: &str) -> Option<Arc<Class>> {
        self.inner.classes.read().get(name)
    }

    /// The class describing the concrete type of a resolved value.
    pub fn class_of(&self, value: &Value) -> Option<Arc<Class>> {
        self.inner.classes.read().for_type(value.value_type_id())
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// Register a binding.
    ///
    /// With no concrete the abstract resolves to itself. Rebinding drops any
    /// instance cached for the abstract.
    pub fn bind_concrete(&self, abstract_id: &str, concrete: Option<Concrete>, shared: bool) {
        if self.has(abstract_id) {
            self.drop_stale_instances(abstract_id);
        }

        let concrete = concrete.unwrap_or_else(|| Concrete::Class(abstract_id.to_string()));
        debug!(abstract_id, ?concrete, shared, "Binding registered in DI container");

        self.inner
            .bindings
            .write()
            .insert(abstract_id.to_string(), Binding { concrete, shared });
    }

    pub fn bind(&self, abstract_id: &str, concrete: impl Into<Concrete>) {
        self.bind_concrete(abstract_id, Some(concrete.into()), false);
    }

    pub fn bind_self(&self, abstract_id: &str) {
        self.bind_concrete(abstract_id, None, false);
    }

    pub fn bind_factory<F>(&self, abstract_id: &str, factory: F)
    where
        F: Fn(&ResolutionScope<'_>, &Parameters) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.bind_concrete(abstract_id, Some(Concrete::factory(factory)), false);
    }

    /// Bind a plain value, returned as-is on every resolution.
    pub fn bind_value(&self, abstract_id: &str, value: Value) {
        self.bind_factory(abstract_id, move |_, _| Ok(value.clone()));
    }

    pub fn singleton(&self, abstract_id: &str, concrete: impl Into<Concrete>) {
        self.bind_concrete(abstract_id, Some(concrete.into()), true);
    }

    pub fn singleton_self(&self, abstract_id: &str) {
        self.bind_concrete(abstract_id, None, true);
    }

    pub fn singleton_factory<F>(&self, abstract_id: &str, factory: F)
    where
        F: Fn(&ResolutionScope<'_>, &Parameters) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.bind_concrete(abstract_id, Some(Concrete::factory(factory)), true);
    }

    /// Register an existing value as a shared instance.
    pub fn instance(&self, abstract_id: &str, value: Value) -> Value {
        self.inner
            .instances
            .write()
            .insert(abstract_id.to_string(), value.clone());
        debug!(abstract_id, value_type = value.type_name(), "Instance registered");
        value
    }

    /// Remove a binding and its cached instance.
    pub fn unbind(&self, abstract_id: &str) {
        self.inner.bindings.write().remove(abstract_id);
        self.inner.instances.write().remove(abstract_id);
        trace!(abstract_id, "Binding removed");
    }

    pub fn has(&self, abstract_id: &str) -> bool {
        let exists = self.inner.bindings.read().contains_key(abstract_id)
            || self.inner.instances.read().contains_key(abstract_id);
        trace!(abstract_id, exists, "Checked binding existence");
        exists
    }

    pub fn is_shared(&self, abstract_id: &str) -> bool {
        self.inner.instances.read().contains_key(abstract_id)
            || self
                .inner
                .bindings
                .read()
                .get(abstract_id)
                .is_some_and(|binding| binding.shared)
    }

    pub fn binding(&self, abstract_id: &str) -> Option<Binding> {
        self.inner.bindings.read().get(abstract_id).cloned()
    }

    /// Identifiers of every registered binding.
    pub fn bound(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.bindings.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn forget_instance(&self, abstract_id: &str) {
        self.inner.instances.write().remove(abstract_id);
    }

    pub fn forget_instances(&self) {
        let mut instances = self.inner.instances.write();
        let count = instances.len();
        instances.clear();
        debug!(instance_count = count, "Cleared resolved instances");
    }

    /// Drop every binding and resolved instance. Class descriptions stay.
    pub fn flush(&self) {
        self.inner.bindings.write().clear();
        self.inner.instances.write().clear();
        debug!("Flushed container bindings and instances");
    }

    fn drop_stale_instances(&self, abstract_id: &str) {
        if self.inner.instances.write().remove(abstract_id).is_some() {
            trace!(abstract_id, "Dropped stale shared instance");
        }
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    pub fn make(&self, abstract_id: &str) -> Result<Value, Error> {
        self.make_with(abstract_id, &Parameters::new())
    }

    /// Resolve `abstract_id`, letting `parameters` override constructor
    /// parameters by name.
    pub fn make_with(&self, abstract_id: &str, parameters: &Parameters) -> Result<Value, Error> {
        trace!(abstract_id, overrides = parameters.len(), "Attempting to resolve binding");

        let result = self
            .resolve_in(abstract_id, parameters, None)
            .map_err(Error::into_binding_resolution);

        match &result {
            Ok(value) => debug!(abstract_id, value_type = value.type_name(), "Binding resolved"),
            Err(e) => debug!(abstract_id, error = %e, "Binding resolution failed"),
        }

        result
    }

    /// Resolve and downcast.
    pub fn make_as<T: Any + Send + Sync>(&self, abstract_id: &str) -> Result<Arc<T>, Error> {
        let value = self.make(abstract_id)?;
        downcast_resolved(abstract_id, value)
    }

    /// Resolve a type bound under its own type name.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>, Error> {
        self.make_as::<T>(identifier::<T>())
    }

    /// Strict lookup: an identifier that was never bound and cannot be
    /// built fails with [`Error::EntryNotFound`].
    pub fn get(&self, id: &str) -> Result<Value, Error> {
        match self.make(id) {
            Ok(value) => Ok(value),
            Err(e) if self.has(id) || !e.is_resolution_error() => Err(e),
            Err(e) => Err(Error::EntryNotFound {
                id: id.to_string(),
                source: Box::new(e),
            }),
        }
    }

    /// Resolve a parameter list with the container's algorithm.
    pub fn resolve_dependencies(
        &self,
        parameters: &[ParameterDescriptor],
        overrides: &Parameters,
        declaring_class: &str,
    ) -> Result<Arguments, Error> {
        ParameterResolver::new(self, None).resolve(parameters, overrides, declaring_class)
    }

    /// Build a registered class directly, ignoring any binding for it.
    pub fn build(&self, class: &str, parameters: &Parameters) -> Result<Value, Error> {
        let chain = ResolutionChain::push(None, class);
        self.build_class(class, parameters, &chain)
            .map_err(Error::into_binding_resolution)
    }

    pub(crate) fn resolve_in(
        &self,
        abstract_id: &str,
        parameters: &Parameters,
        parent: Option<&ResolutionChain<'_>>,
    ) -> Result<Value, Error> {
        if parameters.is_empty() {
            if let Some(instance) = self.inner.instances.read().get(abstract_id) {
                trace!(abstract_id, "Shared instance cache hit");
                return Ok(instance.clone());
            }
        }

        match parent {
            Some(_) => self.guard_recursion(abstract_id, parent)?,
            None => self.guard_reentry(abstract_id)?,
        }
        let _active = ActiveResolution::enter(self.key(), abstract_id);
        let chain = ResolutionChain::push(parent, abstract_id);

        let concrete = self
            .binding(abstract_id)
            .map(|binding| binding.concrete)
            .unwrap_or_else(|| Concrete::Class(abstract_id.to_string()));

        let object = match concrete {
            Concrete::Factory(factory) => {
                let scope = ResolutionScope {
                    container: self,
                    chain: &chain,
                };
                factory(&scope, parameters)?
            }
            Concrete::Class(class) if class == abstract_id => {
                self.build_class(&class, parameters, &chain)?
            }
            Concrete::Class(alias) => self.resolve_in(&alias, parameters, Some(&chain))?,
        };

        if parameters.is_empty() && self.is_shared(abstract_id) {
            let mut instances = self.inner.instances.write();
            let cached = instances
                .entry(abstract_id.to_string())
                .or_insert(object)
                .clone();
            debug!(abstract_id, "Shared instance cached");
            return Ok(cached);
        }

        Ok(object)
    }

    fn guard_recursion(
        &self,
        abstract_id: &str,
        parent: Option<&ResolutionChain<'_>>,
    ) -> Result<(), Error> {
        let Some(parent) = parent else {
            return Ok(());
        };

        let config = &self.inner.config;
        let cyclic = config.enable_circular_dependency_detection && parent.contains(abstract_id);

        if cyclic || parent.depth() >= config.max_resolution_depth {
            let mut path = parent.path();
            path.push(abstract_id.to_string());
            return Err(Error::CircularDependency {
                id: abstract_id.to_string(),
                path,
            });
        }

        Ok(())
    }

    /// Cycle and depth check for a resolution started without a chain while
    /// others are already in flight on this thread.
    fn guard_reentry(&self, abstract_id: &str) -> Result<(), Error> {
        let key = self.key();
        let config = &self.inner.config;

        ACTIVE.with(|active| {
            let active = active.borrow();
            let mut in_flight = active.iter().filter(|(c, _)| *c == key).map(|(_, id)| id);

            let depth = in_flight.clone().count();
            let cyclic =
                config.enable_circular_dependency_detection && in_flight.any(|id| id == abstract_id);

            if cyclic || (depth > 0 && depth >= config.max_resolution_depth) {
                let mut path: Vec<String> = active
                    .iter()
                    .filter(|(c, _)| *c == key)
                    .map(|(_, id)| id.clone())
                    .collect();
                path.push(abstract_id.to_string());
                return Err(Error::CircularDependency {
                    id: abstract_id.to_string(),
                    path,
                });
            }
            Ok(())
        })
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Instantiate a described class, resolving its constructor parameters.
    pub(crate) fn build_class(
        &self,
        name: &str,
        parameters: &Parameters,
        chain: &ResolutionChain<'_>,
    ) -> Result<Value, Error> {
        let class = self.class(name).ok_or_else(|| {
            Error::binding(format!("Target class [{name}] does not exist."))
        })?;

        if !class.is_instantiable() {
            let message = match chain.parent {
                Some(parent) => format!(
                    "Target [{name}] is not instantiable while building [{}].",
                    parent.path().join(", ")
                ),
                None => format!("Target [{name}] is not instantiable."),
            };
            return Err(Error::binding(message));
        }

        if let Some(built) = class.instantiate_direct() {
            trace!(class = name, "Instantiating class without constructor");
            return built;
        }

        let Some(constructor) = class.constructor() else {
            return Err(Error::binding(format!("Target [{name}] is not instantiable.")));
        };

        trace!(
            class = name,
            parameter_count = constructor.parameters().len(),
            "Resolving constructor parameters"
        );
        let args = ParameterResolver::new(self, Some(chain)).resolve(
            constructor.parameters(),
            parameters,
            name,
        )?;

        constructor.construct(&args)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.inner.bindings.read().len())
            .field("instances", &self.inner.instances.read().len())
            .field("classes", &self.inner.classes.read().len())
            .finish()
    }
}

fn downcast_resolved<T: Any + Send + Sync>(abstract_id: &str, value: Value) -> Result<Arc<T>, Error> {
    value.downcast::<T>().ok_or_else(|| {
        Error::binding(format!(
            "Resolved [{abstract_id}] is a {}, not a {}",
            value.type_name(),
            std::any::type_name::<T>()
        ))
    })
}
