//! One-time promotion of a deferred module to a loaded one.
//!
//! Under the module's promotion lock:
//! 1. snapshot the namespace and pick out what callers wrote since creation,
//! 2. run the initializer,
//! 3. check the registry still maps the name to this module,
//! 4. write the caller values back over the initializer's and mark it done.
//!
//! The promoting thread is recorded in a thread-local list so that accesses it
//! makes from inside the initializer go straight to the namespace.

use core::cell::RefCell;
use core::sync::atomic::Ordering;

use crate::error::{Error, Result};
use crate::module::{Module, Phase};
use crate::state::{Acquire, PromotionGuard};

thread_local! {
   static PROMOTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

#[inline]
fn address(module: &Module) -> usize {
   module as *const Module as usize
}

/// Returns `true` if the current thread is running the initializer of `module`.
pub(crate) fn is_promoting(module: &Module) -> bool {
   let addr = address(module);
   PROMOTING.with(|promoting| promoting.borrow().contains(&addr))
}

/// Marks the current thread as promoting a module until dropped.
struct Marker(usize);

impl Marker {
   fn enter(module: &Module) -> Self {
      let addr = address(module);
      PROMOTING.with(|promoting| promoting.borrow_mut().push(addr));
      Self(addr)
   }
}

impl Drop for Marker {
   fn drop(&mut self) {
      PROMOTING.with(|promoting| {
         let mut promoting = promoting.borrow_mut();
         if let Some(pos) = promoting.iter().rposition(|&addr| addr == self.0) {
            promoting.remove(pos);
         }
      });
   }
}

/// Ensures `module` is loaded.
pub(crate) fn promote(module: &Module) -> Result<()> {
   if let Some(result) = fast_path(module) {
      return result;
   }
   match module.promotion_lock().lock() {
      Acquire::Done => Ok(()),
      Acquire::Poisoned => Err(poisoned(module)),
      Acquire::Locked(guard) => run(module, guard),
   }
}

#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
pub(crate) async fn promote_async(module: &Module) -> Result<()> {
   if let Some(result) = fast_path(module) {
      return result;
   }
   match module.promotion_lock().lock_async().await {
      Acquire::Done => Ok(()),
      Acquire::Poisoned => Err(poisoned(module)),
      Acquire::Locked(guard) => run(module, guard),
   }
}

#[inline]
fn fast_path(module: &Module) -> Option<Result<()>> {
   if module.promotion_lock().is_done(Ordering::Acquire) {
      return Some(Ok(()));
   }
   if is_promoting(module) {
      tracing::trace!(module = module.name(), "access from inside initializer");
      return Some(Ok(()));
   }
   None
}

fn poisoned(module: &Module) -> Error {
   Error::Poisoned {
      name: module.name().to_owned(),
   }
}

#[cold]
fn run(module: &Module, guard: PromotionGuard<'_>) -> Result<()> {
   let _marker = Marker::enter(module);

   // SAFETY: We hold the promotion guard.
   let deferred = match unsafe { module.take_phase() } {
      Phase::Deferred(deferred) => deferred,
      Phase::Loaded => {
         guard.commit();
         return Ok(());
      }
   };

   let snapshot = module.namespace().read().clone();
   let authored = snapshot.authored_since(&deferred.baseline);
   tracing::debug!(
      module = module.name(),
      caller_writes = authored.len(),
      "promoting deferred module"
   );

   if let Err(err) = deferred.loader.execute(module) {
      tracing::warn!(module = module.name(), error = %err, "initializer failed, module poisoned");
      return Err(err);
   }

   if let Some(registry) = deferred.loader.registry() {
      if registry.is_rebound(module.name(), module) {
         tracing::warn!(module = module.name(), "registry entry substituted during load");
         return Err(Error::IdentitySubstitution {
            name: module.name().to_owned(),
         });
      }
   }

   module.namespace().write().apply(authored);
   guard.commit();
   tracing::debug!(module = module.name(), "module loaded");
   Ok(())
}
