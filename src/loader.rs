//! Deferred wrapper around an eager [`Initializer`].

use core::fmt;
use std::sync::{Arc, Weak};

use crate::error::{Error, Result};
use crate::initializer::Initializer;
use crate::module::{Module, ModuleSpec};
use crate::namespace::Namespace;
use crate::registry::Registry;

/// Turns an eager initializer into one that runs on first use.
///
/// The loader neither locks nor diffs: it builds the deferred module and runs
/// the wrapped executor when promotion asks it to.
#[derive(Clone)]
pub struct LazyLoader {
   initializer: Arc<dyn Initializer>,
   registry: Weak<Registry>,
}

impl LazyLoader {
   /// Wraps `initializer`. Without [`with_registry`](Self::with_registry) no
   /// identity check is made on promotion.
   pub fn new(initializer: Arc<dyn Initializer>) -> Self {
      Self {
         initializer,
         registry: Weak::new(),
      }
   }

   /// Checks promotions against `registry`.
   ///
   /// The loader keeps a weak handle; once the registry is dropped the identity
   /// check is skipped.
   #[must_use]
   pub fn with_registry(mut self, registry: &Arc<Registry>) -> Self {
      self.registry = Arc::downgrade(registry);
      self
   }

   /// The wrapped initializer.
   pub fn initializer(&self) -> &Arc<dyn Initializer> {
      &self.initializer
   }

   pub(crate) fn registry(&self) -> Option<Arc<Registry>> {
      self.registry.upgrade()
   }

   /// Creates a deferred module for `spec`.
   ///
   /// Fails with [`Error::UnsupportedInitializer`] if the initializer has no
   /// executor, and with the error of its `create` hook if that fails (see
   /// [`Error::Initializer`] for how it is wrapped).
   pub fn create(&self, spec: ModuleSpec) -> Result<Arc<Module>> {
      if self.initializer.executor().is_none() {
         return Err(Error::UnsupportedInitializer {
            name: spec.name().to_owned(),
         });
      }

      let mut namespace = Namespace::new();
      self
         .initializer
         .create(&spec, &mut namespace)
         .map_err(|source| Error::from_initializer(spec.name(), source))?;

      tracing::debug!(module = spec.name(), "created deferred module");
      Ok(Arc::new(Module::deferred(spec, namespace, self.clone())))
   }

   /// Runs the wrapped executor against `module`.
   ///
   /// Does not lock or diff anything; promotion takes care of that.
   pub fn execute(&self, module: &Module) -> Result<()> {
      let executor = self
         .initializer
         .executor()
         .ok_or_else(|| Error::UnsupportedInitializer {
            name: module.name().to_owned(),
         })?;
      executor
         .execute(module)
         .map_err(|source| Error::from_initializer(module.name(), source))
   }
}

impl fmt::Debug for LazyLoader {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("LazyLoader")
         .field("registry", &(self.registry.strong_count() > 0))
         .finish_non_exhaustive()
   }
}
