//! Naming environment and injection resolution.
//!
//! Each deployment owns an [`Environment`]: a map of names (`comp/EJBContext`,
//! `env/greeting`, ...) to [`EnvValue`]s, optionally backed by a parent lookup.
//! Injection is driven by an explicit table of [`Injection`] entries rather
//! than reflection: each entry names a property, the environment name to
//! resolve, and a setter that assigns the resolved value.

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use thiserror::Error;

use crate::error::{BoxError, ContainerError, ContainerResult};

/// A resolved environment entry: raw text or an arbitrary typed object.
#[derive(Clone)]
pub enum EnvValue {
    Text(String),
    Typed(Arc<dyn Any + Send + Sync>),
}

impl EnvValue {
    pub fn text(value: impl Into<String>) -> Self {
        EnvValue::Text(value.into())
    }

    pub fn typed<T: Any + Send + Sync>(value: T) -> Self {
        EnvValue::Typed(Arc::new(value))
    }

    pub fn shared<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        EnvValue::Typed(value)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            EnvValue::Text(s) => Some(s),
            EnvValue::Typed(_) => None,
        }
    }

    /// Returns the typed object when it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            EnvValue::Typed(value) => value.clone().downcast::<T>().ok(),
            EnvValue::Text(_) => None,
        }
    }

    /// Resolves the entry to a `T`.
    ///
    /// A typed object is used as-is when it is a `T`; text is parsed.
    ///
    /// ```rust
    /// use ferrous_singleton::EnvValue;
    ///
    /// assert_eq!(EnvValue::text("42").resolve::<u32>().unwrap(), 42);
    /// assert_eq!(EnvValue::typed(7u32).resolve::<u32>().unwrap(), 7);
    /// assert!(EnvValue::typed(7u64).resolve::<u32>().is_err());
    /// ```
    pub fn resolve<T>(&self) -> Result<T, BoxError>
    where
        T: FromStr + Clone + Any + Send + Sync,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self {
            EnvValue::Typed(value) => value.downcast_ref::<T>().cloned().ok_or_else(|| {
                format!("environment value is not a {}", std::any::type_name::<T>()).into()
            }),
            EnvValue::Text(text) => text.parse::<T>().map_err(Into::into),
        }
    }
}

impl fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            EnvValue::Typed(_) => f.write_str("Typed(..)"),
        }
    }
}

/// Pluggable lookup capability used to resolve injection entries.
pub trait EnvironmentLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<EnvValue>;
}

impl<F> EnvironmentLookup for F
where
    F: Fn(&str) -> Option<EnvValue> + Send + Sync,
{
    fn lookup(&self, name: &str) -> Option<EnvValue> {
        (self)(name)
    }
}

/// A deployment's naming environment.
#[derive(Default)]
pub struct Environment {
    entries: RwLock<AHashMap<String, EnvValue>>,
    parent: Option<Arc<dyn EnvironmentLookup>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries not bound locally fall through to `parent`.
    pub fn with_parent(parent: Arc<dyn EnvironmentLookup>) -> Self {
        Self {
            entries: RwLock::new(AHashMap::new()),
            parent: Some(parent),
        }
    }

    /// Binds a name; fails when the name is already bound locally.
    pub fn bind(&self, name: impl Into<String>, value: EnvValue) -> ContainerResult<()> {
        let name = name.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(ContainerError::Config(format!("name already bound: {}", name)));
        }
        entries.insert(name, value);
        Ok(())
    }

    /// Binds a name, replacing any existing local binding.
    pub fn rebind(&self, name: impl Into<String>, value: EnvValue) {
        self.entries.write().insert(name.into(), value);
    }

    pub fn unbind(&self, name: &str) -> Option<EnvValue> {
        self.entries.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }
}

impl EnvironmentLookup for Environment {
    fn lookup(&self, name: &str) -> Option<EnvValue> {
        if let Some(value) = self.entries.read().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        let mut names: Vec<_> = entries.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("names", &names)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// The metadata half of an injection entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionDescriptor {
    /// Type receiving the value (bean or interceptor)
    pub target: &'static str,
    pub property: String,
    /// Environment name resolved for the value
    pub env_name: String,
}

type Setter<T> = Box<dyn Fn(&mut T, &EnvValue) -> Result<(), BoxError> + Send + Sync>;

/// An injection entry: descriptor plus the setter that assigns the value.
pub struct Injection<T> {
    pub(crate) descriptor: InjectionDescriptor,
    setter: Setter<T>,
}

impl<T: 'static> Injection<T> {
    /// Injects a value that is either typed as `V` or parseable from text.
    pub fn value<V, F>(property: impl Into<String>, env_name: impl Into<String>, assign: F) -> Self
    where
        V: FromStr + Clone + Any + Send + Sync,
        V::Err: std::error::Error + Send + Sync + 'static,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        Self::raw(property, env_name, move |target, value| {
            assign(target, value.resolve::<V>()?);
            Ok(())
        })
    }

    /// Injects a shared typed object.
    pub fn shared<V, F>(property: impl Into<String>, env_name: impl Into<String>, assign: F) -> Self
    where
        V: Any + Send + Sync,
        F: Fn(&mut T, Arc<V>) + Send + Sync + 'static,
    {
        Self::raw(property, env_name, move |target, value| {
            let typed = value
                .downcast::<V>()
                .ok_or_else(|| format!("environment value is not a {}", std::any::type_name::<V>()))?;
            assign(target, typed);
            Ok(())
        })
    }

    /// Injects with a setter that sees the raw [`EnvValue`].
    pub fn raw<F>(property: impl Into<String>, env_name: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut T, &EnvValue) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self {
            descriptor: InjectionDescriptor {
                target: std::any::type_name::<T>(),
                property: property.into(),
                env_name: env_name.into(),
            },
            setter: Box::new(setter),
        }
    }

    pub fn descriptor(&self) -> &InjectionDescriptor {
        &self.descriptor
    }
}

/// Injection of one property failed.
#[derive(Debug, Error)]
#[error("cannot inject {target}.{property} from '{env_name}': {source}")]
pub struct InjectionError {
    pub target: &'static str,
    pub property: String,
    pub env_name: String,
    pub source: BoxError,
}

/// Applies every injection entry to `target`.
///
/// Names missing from the environment are skipped with a warning, leaving the
/// property at its constructed value.
pub(crate) fn inject_all<T>(
    target: &mut T,
    injections: &[Injection<T>],
    env: &dyn EnvironmentLookup,
    deployment_id: &str,
) -> Result<(), BoxError> {
    for injection in injections {
        let descriptor = &injection.descriptor;
        let Some(value) = env.lookup(&descriptor.env_name) else {
            tracing::warn!(
                deployment_id,
                property = %descriptor.property,
                env_name = %descriptor.env_name,
                "injection data not found in environment"
            );
            continue;
        };
        (injection.setter)(target, &value).map_err(|source| InjectionError {
            target: descriptor.target,
            property: descriptor.property.clone(),
            env_name: descriptor.env_name.clone(),
            source,
        })?;
    }
    Ok(())
}
