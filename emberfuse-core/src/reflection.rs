//! Queryable class and parameter descriptors.
//!
//! The container never inspects Rust types at runtime. Instead every
//! buildable type is described once at startup by a [`Class`]: which
//! parameters its constructor declares, how to construct it from resolved
//! [`Arguments`], and which named methods can be invoked on an instance.
//!
//! # Examples
//!
//! ```
//! use emberfuse_core::reflection::*;
//!
//! struct Mailer {
//!     from: String,
//! }
//!
//! let class = ClassBuilder::<Mailer>::new()
//!     .constructor(
//!         vec![ParameterDescriptor::primitive("from").with_default("noreply@example.com".to_string())],
//!         |args| Ok(Mailer { from: args.string(0)? }),
//!     )
//!     .build();
//!
//! assert_eq!(class.name(), std::any::type_name::<Mailer>());
//! assert!(class.is_instantiable());
//! ```

use crate::{Error, Reply};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Identifier under which a Rust type is bound by default.
pub fn identifier<T: ?Sized + 'static>() -> &'static str {
    std::any::type_name::<T>()
}

// ============================================================================
// Values
// ============================================================================

/// A type-erased, shared value produced by the container.
///
/// Cloning a `Value` clones the handle, never the underlying object, so two
/// clones are always [`Value::ptr_eq`].
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Value {
    /// Wrap an owned value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap an already shared value without re-allocating it.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The unit value, used for "unset" defaults.
    pub fn null() -> Self {
        Self::new(())
    }

    pub fn is_null(&self) -> bool {
        self.is::<()>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Get a typed handle to the underlying object.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// `TypeId` of the wrapped object.
    pub fn value_type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Reference identity: both handles point at the same object.
    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Render scalar values as text.
    ///
    /// Path parameters arrive as `String`s while defaults are often declared
    /// as numbers, so actions reading "a string" accept both.
    pub fn to_text(&self) -> Option<String> {
        macro_rules! display {
            ($($ty:ty),*) => {
                $(
                    if let Some(v) = self.downcast_ref::<$ty>() {
                        return Some(v.to_string());
                    }
                )*
            };
        }

        display!(String, &'static str, i64, i32, u64, u32, usize, f64, bool, char);
        None
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &self.type_name)
            .finish()
    }
}

// ============================================================================
// Override frames
// ============================================================================

/// Named values supplied to one resolution call.
///
/// An entry whose key matches a parameter name is used verbatim for that
/// parameter, ahead of any automatic resolution.
#[derive(Clone, Debug, Default)]
pub struct Parameters {
    values: HashMap<String, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.values.insert(name.into(), Value::new(value));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Parameter descriptors
// ============================================================================

/// Description of one constructor or method parameter.
#[derive(Clone, Debug)]
pub struct ParameterDescriptor {
    name: String,
    declared_type: Option<String>,
    default: Option<Value>,
    optional: bool,
}

impl ParameterDescriptor {
    /// A parameter with no class type: it can only be filled by an
    /// override or its default.
    pub fn primitive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: None,
            default: None,
            optional: false,
        }
    }

    /// A parameter resolved by making `identifier` from the container.
    pub fn service(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: Some(identifier.into()),
            default: None,
            optional: false,
        }
    }

    /// A service parameter identified by a Rust type.
    pub fn typed<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::service(name, identifier::<T>())
    }

    /// Declare a default value; the parameter becomes optional.
    pub fn with_default<T: Any + Send + Sync>(self, value: T) -> Self {
        self.with_default_value(Value::new(value))
    }

    pub fn with_default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self.optional = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

// ============================================================================
// Resolved arguments
// ============================================================================

/// Resolved argument list, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Arguments {
    names: Vec<String>,
    values: Vec<Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, name: &str, value: Value) {
        self.names.push(name.to_string());
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Typed positional access.
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, Error> {
        self.values
            .get(index)
            .and_then(Value::downcast::<T>)
            .ok_or_else(|| self.type_error(index, std::any::type_name::<T>()))
    }

    /// Typed access by parameter name.
    pub fn named<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, Error> {
        match self.names.iter().position(|n| n == name) {
            Some(index) => self.get(index),
            None => Err(Error::ArgumentType {
                parameter: name.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            }),
        }
    }

    /// Positional access for scalar values rendered as text.
    pub fn string(&self, index: usize) -> Result<String, Error> {
        self.values
            .get(index)
            .and_then(Value::to_text)
            .ok_or_else(|| self.type_error(index, "string"))
    }

    fn type_error(&self, index: usize, expected: &str) -> Error {
        Error::ArgumentType {
            parameter: self
                .names
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("#{index}")),
            expected: expected.to_string(),
        }
    }
}

// ============================================================================
// Classes
// ============================================================================

type ConstructFn = Arc<dyn Fn(&Arguments) -> Result<Value, Error> + Send + Sync>;
type InvokeFn = Arc<dyn Fn(&Value, &Arguments) -> Result<Reply, Error> + Send + Sync>;

/// A declared constructor.
#[derive(Clone)]
pub struct Constructor {
    parameters: Vec<ParameterDescriptor>,
    construct: ConstructFn,
}

impl Constructor {
    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn construct(&self, args: &Arguments) -> Result<Value, Error> {
        (self.construct)(args)
    }
}

/// An invocable method.
#[derive(Clone)]
pub struct Method {
    name: String,
    parameters: Vec<ParameterDescriptor>,
    invoke: InvokeFn,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn invoke(&self, instance: &Value, args: &Arguments) -> Result<Reply, Error> {
        (self.invoke)(instance, args)
    }
}

enum Instantiation {
    /// Declared constructor with parameters.
    Constructor(Constructor),
    /// No constructor: built without arguments.
    Direct(ConstructFn),
    /// Interfaces and other abstracts.
    None,
}

/// Descriptor of one buildable (or abstract) type.
pub struct Class {
    name: String,
    type_id: Option<TypeId>,
    instantiation: Instantiation,
    methods: HashMap<String, Method>,
}

impl Class {
    /// An abstract that can only be satisfied through a binding.
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: None,
            instantiation: Instantiation::None,
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn is_instantiable(&self) -> bool {
        !matches!(self.instantiation, Instantiation::None)
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        match &self.instantiation {
            Instantiation::Constructor(ctor) => Some(ctor),
            _ => None,
        }
    }

    /// Instantiate without arguments; only valid for classes with no
    /// declared constructor.
    pub(crate) fn instantiate_direct(&self) -> Option<Result<Value, Error>> {
        match &self.instantiation {
            Instantiation::Direct(construct) => Some(construct(&Arguments::new())),
            _ => None,
        }
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        methods.sort_unstable();

        f.debug_struct("Class")
            .field("name", &self.name)
            .field("instantiable", &self.is_instantiable())
            .field("methods", &methods)
            .finish()
    }
}

/// Typed builder for [`Class`].
pub struct ClassBuilder<T> {
    name: String,
    instantiation: Instantiation,
    methods: HashMap<String, Method>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ClassBuilder<T> {
    pub fn new() -> Self {
        Self {
            name: identifier::<T>().to_string(),
            instantiation: Instantiation::None,
            methods: HashMap::new(),
            _marker: PhantomData,
        }
    }

    /// Register the class under a custom identifier instead of the type name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declare the constructor.
    pub fn constructor<F>(mut self, parameters: Vec<ParameterDescriptor>, build: F) -> Self
    where
        F: Fn(&Arguments) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.instantiation = Instantiation::Constructor(Constructor {
            parameters,
            construct: Arc::new(move |args: &Arguments| build(args).map(Value::new)),
        });
        self
    }

    /// Declare an action method.
    pub fn method<F, R>(mut self, name: &str, parameters: Vec<ParameterDescriptor>, call: F) -> Self
    where
        F: Fn(&T, &Arguments) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<Reply>,
    {
        let class_name = self.name.clone();
        let method_name = name.to_string();
        let invoke: InvokeFn = Arc::new(move |instance: &Value, args: &Arguments| {
            let this = instance.downcast_ref::<T>().ok_or_else(|| Error::ArgumentType {
                parameter: format!("{class_name}@{method_name}"),
                expected: std::any::type_name::<T>().to_string(),
            })?;
            call(this, args).map(Into::into)
        });

        self.methods.insert(
            name.to_string(),
            Method {
                name: name.to_string(),
                parameters,
                invoke,
            },
        );
        self
    }

    pub fn build(self) -> Class {
        Class {
            name: self.name,
            type_id: Some(TypeId::of::<T>()),
            instantiation: self.instantiation,
            methods: self.methods,
        }
    }
}

impl<T: Any + Send + Sync + Default> ClassBuilder<T> {
    /// The class has no constructor; instances are built with `Default`.
    pub fn default_constructor(mut self) -> Self {
        self.instantiation =
            Instantiation::Direct(Arc::new(|_: &Arguments| Ok(Value::new(T::default()))));
        self
    }
}

impl<T: Any + Send + Sync> Default for ClassBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Types that describe their own [`Class`].
pub trait Injectable: Any + Send + Sync + Sized {
    fn class() -> Class;
}

// ============================================================================
// Registry
// ============================================================================

/// Lookup table of every described class.
#[derive(Default)]
pub struct ClassRegistry {
    classes: HashMap<String, Arc<Class>>,
    by_type: HashMap<TypeId, Arc<Class>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a class description.
    pub fn register(&mut self, class: Class) -> Arc<Class> {
        let class = Arc::new(class);
        if let Some(type_id) = class.type_id {
            self.by_type.insert(type_id, class.clone());
        }
        self.classes.insert(class.name.clone(), class.clone());
        class
    }

    pub fn get(&self, name: &str) -> Option<Arc<Class>> {
        self.classes.get(name).cloned()
    }

    pub fn for_type(&self, type_id: TypeId) -> Option<Arc<Class>> {
        self.by_type.get(&type_id).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn clear(&mut self) {
        self.classes.clear();
        self.by_type.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Plain;

    struct Greeter {
        greeting: String,
    }

    #[test]
    fn test_value_identity() {
        let value = Value::new(String::from("hello"));
        let clone = value.clone();

        assert!(Value::ptr_eq(&value, &clone));
        assert!(!Value::ptr_eq(&value, &Value::new(String::from("hello"))));
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("hello"));
        assert!(value.downcast::<i64>().is_none());
    }

    #[test]
    fn test_value_from_arc_preserves_identity() {
        let shared = Arc::new(Plain);
        let value = Value::from_arc(shared.clone());

        let back = value.downcast::<Plain>().unwrap();
        assert!(Arc::ptr_eq(&shared, &back));
        assert_eq!(value.value_type_id(), TypeId::of::<Plain>());
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(Value::new(25i64).to_text(), Some("25".to_string()));
        assert_eq!(Value::new("SL").to_text(), Some("SL".to_string()));
        assert_eq!(Value::null().to_text(), None);
        assert!(Value::null().is_null());
    }

    #[test]
    fn test_descriptor_defaults() {
        let name = ParameterDescriptor::primitive("name");
        assert!(!name.is_optional());
        assert!(name.declared_type().is_none());

        let age = ParameterDescriptor::primitive("age").with_default(25i64);
        assert!(age.is_optional());
        assert!(age.has_default());

        let service = ParameterDescriptor::typed::<Greeter>("greeter");
        assert_eq!(service.declared_type(), Some(identifier::<Greeter>()));
    }

    #[test]
    fn test_arguments_typed_access() {
        let mut args = Arguments::new();
        args.push("name", Value::new("navin".to_string()));
        args.push("age", Value::new(30i64));

        assert_eq!(args.string(0).unwrap(), "navin");
        assert_eq!(args.string(1).unwrap(), "30");
        assert_eq!(*args.named::<i64>("age").unwrap(), 30);
        assert!(matches!(
            args.get::<bool>(0),
            Err(Error::ArgumentType { parameter, .. }) if parameter == "name"
        ));
        assert!(args.string(5).is_err());
    }

    #[test]
    fn test_class_builder() {
        let class = ClassBuilder::<Greeter>::new()
            .named("Greeter")
            .constructor(
                vec![ParameterDescriptor::primitive("greeting").with_default("hi".to_string())],
                |args| {
                    Ok(Greeter {
                        greeting: args.string(0)?,
                    })
                },
            )
            .method("greet", vec![ParameterDescriptor::primitive("name")], |this, args| {
                Ok(format!("{} {}", this.greeting, args.string(0)?))
            })
            .build();

        assert_eq!(class.name(), "Greeter");
        assert!(class.is_instantiable());
        assert!(class.has_method("greet"));
        assert!(!class.has_method("wave"));
        assert_eq!(class.constructor().unwrap().parameters().len(), 1);

        let mut args = Arguments::new();
        args.push("greeting", Value::new("hello".to_string()));
        let instance = class.constructor().unwrap().construct(&args).unwrap();

        let mut call = Arguments::new();
        call.push("name", Value::new("world".to_string()));
        let reply = class.method("greet").unwrap().invoke(&instance, &call).unwrap();
        assert_eq!(reply, Reply::Text("hello world".to_string()));
    }

    #[test]
    fn test_method_rejects_foreign_instance() {
        let class = ClassBuilder::<Greeter>::new()
            .method("greet", vec![], |this, _| Ok(this.greeting.clone()))
            .build();

        let result = class
            .method("greet")
            .unwrap()
            .invoke(&Value::new(Plain), &Arguments::new());
        assert!(matches!(result, Err(Error::ArgumentType { .. })));
    }

    #[test]
    fn test_interface_is_not_instantiable() {
        let class = Class::interface("Contract");
        assert!(!class.is_instantiable());
        assert!(class.type_id().is_none());
        assert!(class.instantiate_direct().is_none());
    }

    #[test]
    fn test_registry_lookup_by_type() {
        let mut registry = ClassRegistry::new();
        registry.register(ClassBuilder::<Plain>::new().named("Plain").default_constructor().build());

        assert!(registry.contains("Plain"));
        assert_eq!(registry.for_type(TypeId::of::<Plain>()).unwrap().name(), "Plain");
        assert!(registry.for_type(TypeId::of::<Greeter>()).is_none());

        let built = registry.get("Plain").unwrap().instantiate_direct().unwrap().unwrap();
        assert!(built.is::<Plain>());
    }
}
