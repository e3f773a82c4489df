//! Validation contracts for dispatched values.

use std::any::Any;
use std::marker::PhantomData;

/// Validates a dispatched value before any handler runs.
///
/// Returns failure messages; an empty vector means the value is valid. All
/// registered validators run and all failures are collected, so the caller
/// sees every problem at once rather than just the first.
pub trait Validator<T: Send + Sync + 'static>: Send + Sync {
    fn validate(&self, subject: &T) -> Vec<String>;
}

/// Object-safe adapter over a typed validator.
pub(crate) trait ErasedValidator: Send + Sync {
    fn validate_erased(&self, subject: &(dyn Any + Send + Sync)) -> Vec<String>;
}

pub(crate) struct TypedValidator<T, V> {
    validator: V,
    _marker: PhantomData<fn(T)>,
}

impl<T, V> TypedValidator<T, V> {
    pub(crate) fn new(validator: V) -> Self {
        Self {
            validator,
            _marker: PhantomData,
        }
    }
}

impl<T, V> ErasedValidator for TypedValidator<T, V>
where
    T: Send + Sync + 'static,
    V: Validator<T>,
{
    fn validate_erased(&self, subject: &(dyn Any + Send + Sync)) -> Vec<String> {
        match subject.downcast_ref::<T>() {
            Some(subject) => self.validator.validate(subject),
            // Type mismatch cannot occur through the typed registration API;
            // report nothing rather than inventing a failure.
            None => Vec::new(),
        }
    }
}
