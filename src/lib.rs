//! Thread-safe deferred modules.
//!
//! A [`Module`] is a named bag of attributes produced by an [`Initializer`].
//! Wrapping the initializer in a [`LazyLoader`] hands out the module right
//! away and postpones the initializer until the first attribute access. The
//! first access promotes the module exactly once, even when many threads hit
//! it at the same time; every later access is a single atomic check followed
//! by a namespace read.
//!
//! Promotion guarantees:
//!
//! - **At most once**: the initializer runs on one thread; the others park
//!   until it finishes.
//! - **Caller writes survive**: attributes set before promotion are written
//!   back over whatever the initializer stored under the same name.
//! - **Identity**: if the registry entry for the name is rebound to another
//!   module while the initializer runs, promotion fails with
//!   [`Error::IdentitySubstitution`].
//! - **No retries**: a failed promotion poisons the module for good.
//! - **Re-entrancy**: the initializer may freely read and write the module it
//!   is initializing.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use poly_lazy::{initializer, value, LazyLoader, ModuleSpec, Registry, Status};
//!
//! let registry = Arc::new(Registry::new());
//! let loader = LazyLoader::new(Arc::new(initializer::from_fn(|module| {
//!    module.set("greeting", value(String::from("hello")))?;
//!    module.set("retries", value(3u32))?;
//!    Ok(())
//! })))
//! .with_registry(&registry);
//!
//! let module = loader.create(ModuleSpec::new("net"))?;
//! registry.register("net", module.clone());
//!
//! // Writes before first use do not load the module, and take precedence.
//! module.set("retries", value(5u32))?;
//! assert_eq!(module.status(), Status::NotStarted);
//!
//! assert_eq!(*module.get_as::<u32>("retries")?, 5);
//! assert_eq!(module.get_as::<String>("greeting")?.as_str(), "hello");
//! assert_eq!(module.status(), Status::Done);
//! # Ok::<(), poly_lazy::Error>(())
//! ```

/// Error type.
mod error;

/// Importer and lazy scope.
mod importer;

/// Initializer traits.
pub mod initializer;

/// Lazy loader adapter.
mod loader;

/// Module object.
mod module;

/// Attribute storage.
mod namespace;

/// Promotion critical section.
mod promotion;

/// Module registry.
mod registry;

/// Resolver seam.
mod resolver;

/// Internal synchronization state management.
mod state;

pub use error::{BoxError, Error, Result};
pub use importer::{Importer, LazyScope};
pub use initializer::{Execute, Initializer};
pub use loader::LazyLoader;
pub use module::{Module, ModuleSpec};
pub use namespace::{same_value, value, Namespace, Value};
pub use registry::Registry;
pub use resolver::{Resolved, Resolver, StaticResolver};
pub use state::Status;
