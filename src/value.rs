//! Type-erased call arguments and results.

use std::any::Any;
use std::fmt;

use crate::error::BoxError;

/// A type-erased argument or return value.
pub type Value = Box<dyn Any + Send>;

/// Result of a business method or interceptor: `None` stands for "no value".
pub type BeanResult = Result<Option<Value>, BoxError>;

/// Positional call arguments.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::Args;
///
/// let args = Args::new().with(7u32).with("seven".to_string());
/// assert_eq!(*args.get::<u32>(0).unwrap(), 7);
/// assert_eq!(args.get::<String>(1).unwrap(), "seven");
/// assert!(args.get::<u64>(0).is_err());
/// assert!(args.get::<u32>(2).is_err());
/// ```
#[derive(Default)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new() -> Self {
        Args(Vec::new())
    }

    /// Appends an argument, builder style.
    pub fn with<T: Any + Send>(mut self, value: T) -> Self {
        self.0.push(Box::new(value));
        self
    }

    pub fn push<T: Any + Send>(&mut self, value: T) {
        self.0.push(Box::new(value));
    }

    pub fn push_value(&mut self, value: Value) {
        self.0.push(value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows argument `index` as a `T`.
    pub fn get<T: Any>(&self, index: usize) -> Result<&T, BoxError> {
        let value = self
            .0
            .get(index)
            .ok_or_else(|| format!("argument {} is missing", index))?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| format!("argument {} is not a {}", index, std::any::type_name::<T>()).into())
    }

    /// Removes and returns the raw argument at `index`.
    pub(crate) fn take_raw(&mut self, index: usize) -> Option<Value> {
        if index < self.0.len() {
            Some(self.0.remove(index))
        } else {
            None
        }
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Args(values)
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Args({} values)", self.0.len())
    }
}

/// Boxes a business return value, mapping `()` to "no value".
pub(crate) fn into_value<R: Any + Send>(result: R) -> Option<Value> {
    let boxed: Value = Box::new(result);
    if boxed.is::<()>() {
        None
    } else {
        Some(boxed)
    }
}
