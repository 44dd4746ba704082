//! Name resolution seam used by the [`Importer`](crate::Importer).

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::initializer::Initializer;
use crate::module::ModuleSpec;

/// A resolved name: the spec of the module and the initializer that builds it.
#[derive(Clone)]
pub struct Resolved {
   pub spec: ModuleSpec,
   pub initializer: Arc<dyn Initializer>,
}

/// Finds the initializer for a module name.
pub trait Resolver: Send + Sync {
   /// Returns `None` when nothing provides `name`.
   fn resolve(&self, name: &str) -> Option<Resolved>;
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
   fn resolve(&self, name: &str) -> Option<Resolved> {
      (**self).resolve(name)
   }
}

/// Resolver backed by a table filled in by the caller.
#[derive(Default)]
pub struct StaticResolver {
   entries: RwLock<IndexMap<String, Resolved>>,
}

impl StaticResolver {
   /// Creates a resolver that knows no names.
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   /// Makes `name` resolvable, replacing any previous entry.
   pub fn insert(&self, name: impl Into<String>, initializer: Arc<dyn Initializer>) {
      self.insert_spec(ModuleSpec::new(name), initializer);
   }

   /// Like [`insert`](Self::insert) with a caller-built spec.
   pub fn insert_spec(&self, spec: ModuleSpec, initializer: Arc<dyn Initializer>) {
      self
         .entries
         .write()
         .insert(spec.name().to_owned(), Resolved { spec, initializer });
   }

   /// Builder-style [`insert`](Self::insert).
   #[must_use]
   pub fn with(self, name: impl Into<String>, initializer: Arc<dyn Initializer>) -> Self {
      self.insert(name, initializer);
      self
   }

   /// Forgets `name`. Returns `true` if it was known.
   pub fn remove(&self, name: &str) -> bool {
      self.entries.write().shift_remove(name).is_some()
   }
}

impl Resolver for StaticResolver {
   fn resolve(&self, name: &str) -> Option<Resolved> {
      self.entries.read().get(name).cloned()
   }
}
