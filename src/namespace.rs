//! Attribute storage for modules.
//!
//! Values are shared, type-erased handles. Two values are the *same* when they
//! point at the same allocation; equal contents in different allocations are
//! different values. Promotion relies on this to tell caller writes apart from
//! whatever the initializer stored.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

/// A type-erased attribute value.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wraps `value` into a fresh [`Value`] allocation.
#[inline]
pub fn value<T: Any + Send + Sync>(value: T) -> Value {
   Arc::new(value)
}

/// Returns `true` if both handles refer to the same allocation.
#[inline]
pub fn same_value(a: &Value, b: &Value) -> bool {
   Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Ordered mapping from attribute name to value.
#[derive(Clone, Default)]
pub struct Namespace {
   attrs: IndexMap<String, Value>,
}

impl Namespace {
   /// Creates an empty namespace.
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   /// Value stored under `name`.
   pub fn get(&self, name: &str) -> Option<&Value> {
      self.attrs.get(name)
   }

   /// Stores `value` under `name`, returning the value it replaced.
   pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
      self.attrs.insert(name.into(), value)
   }

   /// Removes `name`, keeping the insertion order of the remaining attributes.
   pub fn remove(&mut self, name: &str) -> Option<Value> {
      self.attrs.shift_remove(name)
   }

   /// Returns `true` if `name` is set.
   pub fn contains(&self, name: &str) -> bool {
      self.attrs.contains_key(name)
   }

   /// Number of attributes.
   pub fn len(&self) -> usize {
      self.attrs.len()
   }

   pub fn is_empty(&self) -> bool {
      self.attrs.is_empty()
   }

   /// Attribute names in insertion order.
   pub fn names(&self) -> impl Iterator<Item = &str> {
      self.attrs.keys().map(String::as_str)
   }

   /// Attributes in insertion order.
   pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
      self.attrs.iter().map(|(k, v)| (k.as_str(), v))
   }

   /// Entries of `self` that are new relative to `baseline`, or whose value is
   /// a different allocation than the baseline's.
   pub(crate) fn authored_since(&self, baseline: &Namespace) -> Namespace {
      let attrs = self
         .attrs
         .iter()
         .filter(|(key, value)| match baseline.get(key) {
            Some(before) => !same_value(before, value),
            None => true,
         })
         .map(|(key, value)| (key.clone(), Arc::clone(value)))
         .collect();
      Namespace { attrs }
   }

   /// Writes every entry of `other` over `self`.
   pub(crate) fn apply(&mut self, other: Namespace) {
      self.attrs.extend(other.attrs);
   }
}

impl fmt::Debug for Namespace {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_set().entries(self.attrs.keys()).finish()
   }
}
