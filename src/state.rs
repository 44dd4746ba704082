//! Promotion state word shared by every deferred module.
//!
//! The state is packed into a single `AtomicU8` with the following layout:
//! - Bit 0: DONE - Module is promoted
//! - Bit 1: LOCKED - A thread owns the promotion
//! - Bit 2: WAITING - At least one thread is parked on the word
//! - Bit 3: POISONED - Promotion failed; the module never leaves `InProgress`
//! - Bits 4-7: EPOCH - Generation counter bumped on every terminal transition
//!
//! Reads of a promoted module only need a single atomic load. Threads that lose
//! the race for the lock park on the address of the word through
//! `parking_lot_core` and are woken when the owner commits or poisons.

use core::fmt;
use core::mem;
use core::sync::atomic::{AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// Observable promotion status of a module.
///
/// Transitions are monotonic: `NotStarted -> InProgress -> Done`. A failed
/// promotion stays `InProgress` forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
   /// Nothing has touched the module in a way that requires loading it.
   NotStarted,
   /// A thread is running the initializer, or a previous attempt failed.
   InProgress,
   /// The module is fully loaded.
   Done,
}

impl fmt::Display for Status {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Status::NotStarted => "not started",
         Status::InProgress => "in progress",
         Status::Done => "done",
      })
   }
}

/// Outcome of a lock attempt.
pub(crate) enum Acquire<'a> {
   /// Already promoted; nothing to do.
   Done,
   /// A previous promotion failed.
   Poisoned,
   /// The caller owns the promotion and must commit or drop the guard.
   Locked(PromotionGuard<'a>),
}

/// Atomic promotion state of a single module.
#[repr(transparent)]
pub(crate) struct PromotionLock(AtomicU8);

impl PromotionLock {
   /// Bit flag: Module is promoted.
   const DONE: u8 = 1;
   /// Bit flag: A thread owns the promotion (kept set once poisoned).
   const LOCKED: u8 = 2;
   /// Bit flag: At least one thread is parked on the word.
   const WAITING: u8 = 4;
   /// Bit flag: The promotion failed.
   const POISONED: u8 = 8;
   /// Start of epoch bits, bumped on commit and on poisoning so parked threads see a change.
   const EPOCH_1: u8 = 16;
   /// Mask for epoch bits.
   const EPOCH_MASK: u8 = !(Self::DONE | Self::LOCKED | Self::WAITING | Self::POISONED);

   /// Calculates the next epoch value based on the current state.
   #[inline(always)]
   const fn next_epoch(current_state: u8) -> u8 {
      (current_state & Self::EPOCH_MASK).wrapping_add(Self::EPOCH_1) & Self::EPOCH_MASK
   }

   /// State of a module that still has to be promoted.
   #[inline]
   pub(crate) const fn new() -> Self {
      Self(AtomicU8::new(0))
   }

   /// State of a module that was loaded eagerly.
   #[inline]
   pub(crate) const fn done() -> Self {
      Self(AtomicU8::new(Self::DONE))
   }

   /// Wakes every thread parked on the word.
   #[inline]
   fn notify_all(&self) {
      // SAFETY: park and unpark both key on the address of the atomic.
      unsafe {
         parking_lot_core::unpark_all(self.0.as_ptr() as usize, DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Parks the current thread while the word still equals `expected_state`.
   #[inline]
   fn wait(&self, expected_state: u8) {
      // SAFETY: See `notify_all`.
      unsafe {
         // Spurious wake-ups are fine, callers loop on `lock_step`.
         let _ = parking_lot_core::park(
            self.0.as_ptr() as usize,
            || self.0.load(Ordering::Acquire) == expected_state,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// Moves to DONE and wakes waiters. Returns `true` if the state was not DONE before.
   ///
   /// Only the owner of the guard may call this.
   #[inline]
   fn set_done(&self) -> bool {
      let current_state = self.0.load(Ordering::Relaxed);
      let new_state = Self::DONE | Self::next_epoch(current_state);

      // Release: the namespace merge and the phase swap happen-before any
      // Acquire load that observes DONE.
      let prev_state = self.0.swap(new_state, Ordering::Release);
      if prev_state & Self::WAITING != 0 {
         self.notify_all();
      }
      prev_state & Self::DONE == 0
   }

   /// Moves to POISONED, keeping LOCKED so the module reads as in progress.
   #[inline]
   fn set_poisoned(&self) {
      let current_state = self.0.load(Ordering::Relaxed);
      let new_state = Self::POISONED | Self::LOCKED | Self::next_epoch(current_state);

      // Release pairs with the Acquire in `lock_step`, which reports Poisoned.
      let prev_state = self.0.swap(new_state, Ordering::Release);
      if prev_state & Self::WAITING != 0 {
         self.notify_all();
      }
   }

   /// Checks the DONE bit. The fast path of every access.
   #[inline]
   pub(crate) fn is_done(&self, ordering: Ordering) -> bool {
      self.0.load(ordering) & Self::DONE != 0
   }

   /// Maps the raw word to a [`Status`].
   pub(crate) fn status(&self) -> Status {
      let state = self.0.load(Ordering::Acquire);
      if state & Self::DONE != 0 {
         Status::Done
      } else if state & (Self::LOCKED | Self::POISONED) != 0 {
         Status::InProgress
      } else {
         Status::NotStarted
      }
   }

   /// One attempt at taking the lock.
   ///
   /// Returns `Err(state)` when another thread owns the promotion; the returned
   /// state has WAITING set and is the value to park on.
   #[inline]
   fn lock_step(&self) -> Result<Acquire<'_>, u8> {
      loop {
         let current_state = self.0.load(Ordering::Acquire);
         if current_state & Self::DONE != 0 {
            return Ok(Acquire::Done);
         }
         if current_state & Self::POISONED != 0 {
            return Ok(Acquire::Poisoned);
         }

         // Free: try to take it.
         if current_state & Self::LOCKED == 0 {
            match self.0.compare_exchange_weak(
               current_state,
               current_state | Self::LOCKED,
               Ordering::Acquire,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Ok(Acquire::Locked(PromotionGuard::new(self))),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }

         // Owned by someone else: announce that we are going to park.
         if current_state & Self::WAITING == 0 {
            let new_state = current_state | Self::WAITING;
            match self.0.compare_exchange_weak(
               current_state,
               new_state,
               Ordering::Relaxed,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Err(new_state),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }
         return Err(current_state);
      }
   }

   /// Takes the promotion lock, parking while another thread owns it.
   pub(crate) fn lock(&self) -> Acquire<'_> {
      match self.lock_step() {
         Ok(acquire) => acquire,
         Err(mut state_when_failed) => loop {
            self.wait(state_when_failed);
            match self.lock_step() {
               Ok(acquire) => return acquire,
               Err(new_state) => state_when_failed = new_state,
            }
         },
      }
   }

   /// Takes the promotion lock from async code.
   ///
   /// Yields to the runtime first and only falls back to `block_in_place`
   /// when the owner keeps the lock for a long time.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) async fn lock_async(&self) -> Acquire<'_> {
      #[allow(clippy::never_loop)]
      loop {
         for _ in 0..16 {
            match self.lock_step() {
               Ok(acquire) => return acquire,
               Err(state) => {
                  for _ in 0..32 {
                     tokio::task::yield_now().await;
                     if self.0.load(Ordering::Relaxed) != state {
                        break;
                     }
                  }
               }
            }
         }

         #[cfg(feature = "async-tokio-mt")]
         {
            return match self.lock_step() {
               Ok(acquire) => acquire,
               Err(state) => tokio::task::block_in_place(|| {
                  self.wait(state);
                  self.lock()
               }),
            };
         }
      }
   }
}

/// Ownership of an in-flight promotion.
///
/// Must be `commit()`ed to mark the module as loaded. Dropping it (error or
/// panic in the initializer) poisons the module and wakes every waiter.
pub(crate) struct PromotionGuard<'a> {
   state: &'a PromotionLock,
}

impl<'a> PromotionGuard<'a> {
   /// Creates a new guard for the given state.
   #[inline(always)]
   const fn new(state: &'a PromotionLock) -> Self {
      Self { state }
   }

   /// Marks the module as loaded and notifies waiters.
   #[inline(always)]
   pub(crate) fn commit(self) -> bool {
      let success = self.state.set_done();
      mem::forget(self);
      success
   }
}

impl Drop for PromotionGuard<'_> {
   #[inline(always)]
   fn drop(&mut self) {
      self.state.set_poisoned();
   }
}
