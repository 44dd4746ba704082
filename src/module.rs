//! The module object handed out to callers.
//!
//! A [`Module`] starts either deferred (created by a [`LazyLoader`]) or loaded
//! (created eagerly). A deferred module intercepts attribute access and
//! promotes itself on first use; once promoted it is indistinguishable from an
//! eagerly loaded one, and every access is a plain read of its namespace
//! behind a single atomic check.

use core::any::Any;
use core::cell::UnsafeCell;
use core::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::loader::LazyLoader;
use crate::namespace::{Namespace, Value};
use crate::promotion;
use crate::state::{PromotionLock, Status};

/// Identity of a module: its canonical name and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleSpec {
   name: String,
   origin: Option<String>,
}

impl ModuleSpec {
   /// Spec for the canonical name `name`, with no origin.
   pub fn new(name: impl Into<String>) -> Self {
      Self {
         name: name.into(),
         origin: None,
      }
   }

   /// Records where the module comes from, for diagnostics only.
   #[must_use]
   pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
      self.origin = Some(origin.into());
      self
   }

   /// Canonical name, used as the registry key.
   pub fn name(&self) -> &str {
      &self.name
   }

   /// Where the module comes from, if known.
   pub fn origin(&self) -> Option<&str> {
      self.origin.as_deref()
   }

   /// Name of the enclosing package, if the name is dotted.
   pub fn parent(&self) -> Option<&str> {
      self.name.rsplit_once('.').map(|(parent, _)| parent)
   }
}

/// What a deferred module needs to promote itself.
pub(crate) struct Deferred {
   pub(crate) loader: LazyLoader,
   /// Namespace as it was when the module was created.
   pub(crate) baseline: Namespace,
}

/// Which side of promotion a module is on.
pub(crate) enum Phase {
   Deferred(Deferred),
   Loaded,
}

/// A named resource, possibly not loaded yet.
pub struct Module {
   spec: ModuleSpec,
   namespace: RwLock<Namespace>,
   lock: PromotionLock,
   phase: UnsafeCell<Phase>,
}

impl Module {
   pub(crate) fn deferred(spec: ModuleSpec, namespace: Namespace, loader: LazyLoader) -> Self {
      let baseline = namespace.clone();
      Self {
         spec,
         namespace: RwLock::new(namespace),
         lock: PromotionLock::new(),
         phase: UnsafeCell::new(Phase::Deferred(Deferred { loader, baseline })),
      }
   }

   /// Creates a module that is already loaded.
   pub fn loaded(spec: ModuleSpec, namespace: Namespace) -> Self {
      Self {
         spec,
         namespace: RwLock::new(namespace),
         lock: PromotionLock::done(),
         phase: UnsafeCell::new(Phase::Loaded),
      }
   }

   /// Canonical name. Readable at any time without loading.
   pub fn name(&self) -> &str {
      self.spec.name()
   }

   /// Spec the module was created from. Readable at any time without loading.
   pub fn spec(&self) -> &ModuleSpec {
      &self.spec
   }

   /// Current promotion status. Never blocks and never triggers loading.
   pub fn status(&self) -> Status {
      self.lock.status()
   }

   /// Returns `true` once promotion has completed (or the module was created loaded).
   pub fn is_loaded(&self) -> bool {
      self.lock.is_done(core::sync::atomic::Ordering::Acquire)
   }

   /// Reads an attribute without loading the module.
   ///
   /// Before promotion this sees only the seeded namespace and caller writes.
   pub fn peek(&self, name: &str) -> Option<Value> {
      self.namespace.read().get(name).cloned()
   }

   /// Loads the module if it is not loaded yet.
   ///
   /// Blocks while another thread is loading it. Returns the initializer's
   /// error if this call ran a failing initializer, and [`Error::Poisoned`] if
   /// an earlier attempt failed.
   ///
   /// Errors of this crate raised inside the initializer come back unchanged;
   /// anything else is wrapped in [`Error::Initializer`]. The module is
   /// poisoned either way.
   #[inline]
   pub fn load(&self) -> Result<()> {
      promotion::promote(self)
   }

   /// Loads the module, then returns the attribute `name`.
   ///
   /// Fails with [`Error::AttributeMissing`] if the loaded module has no such
   /// attribute, and with any error [`load`](Self::load) reports.
   pub fn get(&self, name: &str) -> Result<Value> {
      self.load()?;
      self.read(name)
   }

   /// Like [`get`](Self::get), downcast to `T`.
   pub fn get_as<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
      self.get(name)?
         .downcast::<T>()
         .map_err(|_| Error::TypeMismatch {
            module: self.name().to_owned(),
            attribute: name.to_owned(),
            expected: core::any::type_name::<T>(),
         })
   }

   /// Sets an attribute.
   ///
   /// Writes made before promotion do not load the module; they are kept
   /// through promotion and win over whatever the initializer stores under the
   /// same name. A write racing with another thread's promotion waits for it.
   pub fn set(&self, name: impl Into<String>, value: Value) -> Result<()> {
      if self.lock.status() == Status::InProgress && !promotion::is_promoting(self) {
         self.load()?;
      }
      self.namespace.write().insert(name, value);
      Ok(())
   }

   /// Loads the module, then removes and returns the attribute `name`.
   pub fn delete(&self, name: &str) -> Result<Value> {
      self.load()?;
      self
         .namespace
         .write()
         .remove(name)
         .ok_or_else(|| Error::missing(self.name(), name))
   }

   /// Loads the module, then reports whether `name` is set.
   pub fn contains(&self, name: &str) -> Result<bool> {
      self.load()?;
      Ok(self.namespace.read().contains(name))
   }

   /// Loads the module, then lists its attribute names in insertion order.
   pub fn attribute_names(&self) -> Result<Vec<String>> {
      self.load()?;
      Ok(self.namespace.read().names().map(str::to_owned).collect())
   }

   /// Async version of [`load`](Self::load).
   ///
   /// Waiting on another task's promotion yields to the runtime; with the
   /// `async-tokio-mt` feature a long wait falls back to `block_in_place`.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn load_async(&self) -> Result<()> {
      promotion::promote_async(self).await
   }

   /// Async version of [`get`](Self::get).
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn get_async(&self, name: &str) -> Result<Value> {
      self.load_async().await?;
      self.read(name)
   }

   fn read(&self, name: &str) -> Result<Value> {
      self
         .namespace
         .read()
         .get(name)
         .cloned()
         .ok_or_else(|| Error::missing(self.name(), name))
   }

   pub(crate) fn namespace(&self) -> &RwLock<Namespace> {
      &self.namespace
   }

   pub(crate) fn promotion_lock(&self) -> &PromotionLock {
      &self.lock
   }

   /// Swaps the phase to `Loaded`, returning what was there.
   ///
   /// # Safety
   ///
   /// The caller must hold the promotion guard of this module.
   pub(crate) unsafe fn take_phase(&self) -> Phase {
      // SAFETY: The guard holder is the only one touching the phase.
      unsafe { core::mem::replace(&mut *self.phase.get(), Phase::Loaded) }
   }
}

// SAFETY:
// `phase` is only accessed by the thread holding the promotion guard, which
// the lock hands out to one thread at a time. Everything else is behind the
// `RwLock` or atomics.
unsafe impl Sync for Module {}

impl fmt::Debug for Module {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Module")
         .field("name", &self.spec.name)
         .field("origin", &self.spec.origin)
         .field("status", &self.status())
         .finish_non_exhaustive()
   }
}
