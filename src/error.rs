//! Error type shared by every fallible operation in the crate.

/// Boxed error produced by initializers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias with [`Error`] as the default error type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// The resolver has no entry for the requested name.
   #[error("no module named {name:?}")]
   NotFound { name: String },

   /// The initializer exposes no executor, so it can only be run eagerly.
   #[error("initializer for {name:?} does not support deferred execution")]
   UnsupportedInitializer { name: String },

   /// The registry entry for the name was rebound while the module was loading.
   #[error("module object for {name:?} substituted in the registry during a lazy load")]
   IdentitySubstitution { name: String },

   #[error("module {module:?} has no attribute {attribute:?}")]
   AttributeMissing { module: String, attribute: String },

   #[error("attribute {attribute:?} of module {module:?} is not a {expected}")]
   TypeMismatch {
      module: String,
      attribute: String,
      expected: &'static str,
   },

   /// Error raised by the initializer itself, from `create` or `execute`.
   ///
   /// Only foreign errors are wrapped; an initializer that fails with one of
   /// this crate's errors (say, a `get` on another module) surfaces that error
   /// as is.
   #[error("initializer for {name:?} failed")]
   Initializer {
      name: String,
      #[source]
      source: BoxError,
   },

   /// A previous promotion of this module failed; it will never load.
   #[error("module {name:?} failed to load and cannot be used")]
   Poisoned { name: String },

   /// `Importer::lazy` was called while a lazy scope is already active.
   #[error("a lazy import scope is already active")]
   ScopeActive,
}

impl Error {
   /// Lifts an initializer error, unboxing it if it already is an [`Error`].
   pub(crate) fn from_initializer(name: &str, source: BoxError) -> Self {
      match source.downcast::<Error>() {
         Ok(err) => *err,
         Err(source) => Self::Initializer {
            name: name.to_owned(),
            source,
         },
      }
   }

   pub(crate) fn missing(module: &str, attribute: &str) -> Self {
      Self::AttributeMissing {
         module: module.to_owned(),
         attribute: attribute.to_owned(),
      }
   }

   /// Returns `true` for the recoverable missing-attribute case.
   pub fn is_attribute_missing(&self) -> bool {
      matches!(self, Self::AttributeMissing { .. })
   }
}
