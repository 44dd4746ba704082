//! The eager initialization interface wrapped by [`LazyLoader`](crate::LazyLoader).

use core::fmt;

use crate::error::BoxError;
use crate::module::{Module, ModuleSpec};
use crate::namespace::Namespace;

/// The real, potentially expensive initialization work of a module.
pub trait Execute: Send + Sync {
   /// Populates `module` in place.
   ///
   /// Runs at most once per module. Reads and writes on `module` from inside
   /// this call go straight to its namespace.
   fn execute(&self, module: &Module) -> Result<(), BoxError>;
}

impl<F> Execute for F
where
   F: Fn(&Module) -> Result<(), BoxError> + Send + Sync,
{
   #[inline]
   fn execute(&self, module: &Module) -> Result<(), BoxError> {
      self(module)
   }
}

/// Something that knows how to build a module.
///
/// `create` seeds the namespace when the module object is made. `executor`
/// exposes the entry point that does the rest; an initializer without one does
/// all of its work in `create` and can only be imported eagerly.
pub trait Initializer: Send + Sync {
   /// Seeds the namespace of a freshly created module.
   fn create(&self, spec: &ModuleSpec, namespace: &mut Namespace) -> Result<(), BoxError> {
      let _ = (spec, namespace);
      Ok(())
   }

   /// Entry point that finishes the module, or `None` for a create-only
   /// initializer.
   fn executor(&self) -> Option<&dyn Execute>;
}

/// Initializer built from a closure. See [`from_fn`].
pub struct FnInitializer<F> {
   exec: F,
}

/// Builds an [`Initializer`] from `f`, letting the compiler infer the closure signature.
///
/// ```rust
/// use poly_lazy::{initializer, value};
///
/// let init = initializer::from_fn(|module| {
///    module.set("answer", value(42u32))?;
///    Ok(())
/// });
/// # let _ = init;
/// ```
pub fn from_fn<F>(f: F) -> FnInitializer<F>
where
   F: Fn(&Module) -> Result<(), BoxError> + Send + Sync,
{
   FnInitializer { exec: f }
}

impl<F> Initializer for FnInitializer<F>
where
   F: Fn(&Module) -> Result<(), BoxError> + Send + Sync,
{
   fn executor(&self) -> Option<&dyn Execute> {
      Some(&self.exec)
   }
}

impl<F> fmt::Debug for FnInitializer<F> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("FnInitializer")
   }
}
