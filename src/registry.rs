//! Canonical name to module mapping.
//!
//! Promotion consults the registry after running the initializer to make sure
//! the name still refers to the module that was being loaded.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::module::Module;

/// Mapping from canonical name to the module currently considered canonical.
#[derive(Default)]
pub struct Registry {
   modules: RwLock<IndexMap<String, Arc<Module>>>,
}

impl Registry {
   /// Creates an empty registry.
   #[must_use]
   pub fn new() -> Self {
      Self::default()
   }

   /// Binds `name` to `module`, returning the previously bound module.
   pub fn register(&self, name: impl Into<String>, module: Arc<Module>) -> Option<Arc<Module>> {
      let name = name.into();
      tracing::trace!(module = %name, "registering module");
      self.modules.write().insert(name, module)
   }

   /// Binds `name` to `module` unless it is already bound, and returns the
   /// module that ends up canonical.
   pub fn insert_if_absent(&self, name: impl Into<String>, module: Arc<Module>) -> Arc<Module> {
      let mut modules = self.modules.write();
      Arc::clone(modules.entry(name.into()).or_insert(module))
   }

   /// Module currently bound to `name`, if any.
   pub fn lookup(&self, name: &str) -> Option<Arc<Module>> {
      self.modules.read().get(name).cloned()
   }

   /// Returns `true` if `name` is bound to exactly this module instance.
   pub fn is_current(&self, name: &str, module: &Module) -> bool {
      self
         .modules
         .read()
         .get(name)
         .is_some_and(|current| core::ptr::eq(Arc::as_ptr(current), module))
   }

   /// Returns `true` if `name` is bound to a module other than `module`.
   ///
   /// An unbound name is not a rebinding: a module may be loaded outside of
   /// any registry, or unregistered while it loads.
   pub fn is_rebound(&self, name: &str, module: &Module) -> bool {
      self
         .modules
         .read()
         .get(name)
         .is_some_and(|current| !core::ptr::eq(Arc::as_ptr(current), module))
   }

   /// Unbinds `name`, returning the module it was bound to.
   pub fn remove(&self, name: &str) -> Option<Arc<Module>> {
      self.modules.write().shift_remove(name)
   }

   /// Unbinds `name` only if it is still bound to `module`.
   pub fn remove_current(&self, name: &str, module: &Module) -> bool {
      let mut modules = self.modules.write();
      let current = modules
         .get(name)
         .is_some_and(|current| core::ptr::eq(Arc::as_ptr(current), module));
      if current {
         modules.shift_remove(name);
      }
      current
   }

   /// Returns `true` if anything is bound to `name`.
   pub fn contains(&self, name: &str) -> bool {
      self.modules.read().contains_key(name)
   }

   /// Number of bound names.
   pub fn len(&self) -> usize {
      self.modules.read().len()
   }

   pub fn is_empty(&self) -> bool {
      self.modules.read().is_empty()
   }

   /// Names in registration order.
   pub fn names(&self) -> Vec<String> {
      self.modules.read().keys().cloned().collect()
   }
}

impl core::fmt::Debug for Registry {
   fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
      f.debug_struct("Registry")
         .field("modules", &self.names())
         .finish()
   }
}
