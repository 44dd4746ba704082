//! Name-based entry point tying a resolver, a registry and the lazy loader together.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::initializer::Initializer;
use crate::loader::LazyLoader;
use crate::module::{Module, ModuleSpec};
use crate::namespace::{Namespace, Value};
use crate::registry::Registry;
use crate::resolver::{Resolved, Resolver};

/// Imports modules by name, eagerly or deferred.
///
/// Imports are eager by default. While a [`LazyScope`] from [`Importer::lazy`]
/// is alive, newly imported modules are created deferred and only load when
/// first used.
///
/// ```rust
/// use std::sync::Arc;
/// use poly_lazy::{initializer, value, Importer, StaticResolver, Status};
///
/// let resolver = StaticResolver::new().with(
///    "config",
///    Arc::new(initializer::from_fn(|module| {
///       module.set("mode", value(String::from("production")))?;
///       Ok(())
///    })),
/// );
/// let importer = Importer::new(resolver);
///
/// let config = {
///    let _scope = importer.lazy()?;
///    importer.import("config")?
/// };
/// assert_eq!(config.status(), Status::NotStarted);
/// assert_eq!(config.get_as::<String>("mode")?.as_str(), "production");
/// # Ok::<(), poly_lazy::Error>(())
/// ```
pub struct Importer<R> {
   resolver: R,
   registry: Arc<Registry>,
   lazy: AtomicBool,
}

impl<R: Resolver> Importer<R> {
   /// Creates an importer with a fresh, empty registry.
   pub fn new(resolver: R) -> Self {
      Self::with_registry(resolver, Arc::new(Registry::new()))
   }

   /// Creates an importer that shares `registry`, for instance with modules
   /// registered up front.
   pub fn with_registry(resolver: R, registry: Arc<Registry>) -> Self {
      Self {
         resolver,
         registry,
         lazy: AtomicBool::new(false),
      }
   }

   /// Registry holding every module this importer handed out.
   pub fn registry(&self) -> &Arc<Registry> {
      &self.registry
   }

   /// The resolver consulted on registry misses.
   pub fn resolver(&self) -> &R {
      &self.resolver
   }

   /// Returns `true` while a lazy scope is active.
   pub fn is_lazy(&self) -> bool {
      self.lazy.load(Ordering::Acquire)
   }

   /// Switches the importer to deferred mode until the returned guard drops.
   ///
   /// Fails with [`Error::ScopeActive`] if a scope is already active.
   pub fn lazy(&self) -> Result<LazyScope<'_>> {
      self
         .lazy
         .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
         .map_err(|_| Error::ScopeActive)?;
      tracing::trace!("lazy import scope entered");
      Ok(LazyScope { flag: &self.lazy })
   }

   /// Returns the module registered under `name`, importing it if needed.
   ///
   /// For a dotted name the parent is imported first and the new module is
   /// bound on it under its last name component. Binding onto a deferred
   /// parent does not load the parent.
   pub fn import(&self, name: &str) -> Result<Arc<Module>> {
      if let Some(module) = self.registry.lookup(name) {
         return Ok(module);
      }

      let parent = match name.rsplit_once('.') {
         Some((parent, child)) => Some((self.import(parent)?, child)),
         None => None,
      };
      // Loading the parent may have imported us already.
      if let Some(module) = self.registry.lookup(name) {
         return Ok(module);
      }

      let Resolved { spec, initializer } = self.resolver.resolve(name).ok_or_else(|| Error::NotFound {
         name: name.to_owned(),
      })?;

      let module = if self.is_lazy() {
         self.import_deferred(spec, initializer)?
      } else {
         self.import_eager(spec, initializer)?
      };

      if let Some((parent, child)) = parent {
         let binding: Value = module.clone();
         parent.set(child, binding)?;
      }
      Ok(module)
   }

   fn import_deferred(&self, spec: ModuleSpec, initializer: Arc<dyn Initializer>) -> Result<Arc<Module>> {
      let name = spec.name().to_owned();
      let module = LazyLoader::new(initializer)
         .with_registry(&self.registry)
         .create(spec)?;
      Ok(self.registry.insert_if_absent(name, module))
   }

   /// Creates and registers the module, then loads it before returning.
   ///
   /// The module goes through the same promotion as a deferred one, so an
   /// importer that finds it in the registry mid-load gets a module that
   /// blocks on first use instead of a half-populated one. Registering before
   /// loading lets circular imports see the module.
   fn import_eager(&self, spec: ModuleSpec, initializer: Arc<dyn Initializer>) -> Result<Arc<Module>> {
      if initializer.executor().is_none() {
         return self.import_prebuilt(spec, initializer.as_ref());
      }

      let name = spec.name().to_owned();
      let module = self.import_deferred(spec, initializer)?;
      if let Err(err) = module.load() {
         // Poisoned for good; let the next import start over.
         if self.registry.remove_current(&name, &module) {
            tracing::debug!(module = %name, "unregistered module after failed eager load");
         }
         return Err(err);
      }
      tracing::debug!(module = %name, "module loaded eagerly");
      Ok(module)
   }

   /// Imports a module whose initializer does all of its work in `create`.
   fn import_prebuilt(&self, spec: ModuleSpec, initializer: &dyn Initializer) -> Result<Arc<Module>> {
      let name = spec.name().to_owned();
      let mut namespace = Namespace::new();
      initializer
         .create(&spec, &mut namespace)
         .map_err(|source| Error::from_initializer(&name, source))?;
      Ok(self
         .registry
         .insert_if_absent(name, Arc::new(Module::loaded(spec, namespace))))
   }
}

impl<R> fmt::Debug for Importer<R> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Importer")
         .field("registry", &self.registry)
         .field("lazy", &self.lazy.load(Ordering::Relaxed))
         .finish_non_exhaustive()
   }
}

/// Keeps an [`Importer`] in deferred mode; restores eager mode on drop.
#[must_use = "the importer leaves deferred mode as soon as the scope is dropped"]
pub struct LazyScope<'a> {
   flag: &'a AtomicBool,
}

impl fmt::Debug for LazyScope<'_> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("LazyScope")
   }
}

impl Drop for LazyScope<'_> {
   fn drop(&mut self) {
      self.flag.store(false, Ordering::Release);
      tracing::trace!("lazy import scope exited");
   }
}
