//! Relay Registry - the live-plus-fallback catalog of providers and models.
//!
//! Two data sources feed one read-mostly snapshot:
//!
//! - a **live** fetcher pulling a catalog document from a configurable
//!   endpoint, refreshed in the background with capped exponential backoff
//! - a **frozen** fallback bundled into the binary, served whenever live
//!   data has not (yet) been obtained
//!
//! Readers always see a consistent snapshot: the current [`CatalogSnapshot`]
//! sits behind an `RwLock<Arc<_>>` and is swapped whole. Pricing overrides
//! apply strictly above whichever source is active.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod builtin;
pub mod catalog;
pub mod error;
pub mod refresh;
pub mod registry;

pub use builtin::{BUILTIN_PROVIDERS, BuiltinProvider, builtin_provider};
pub use catalog::{
    CatalogDocument, CatalogSource, ModelCapability, ModelInfo, PricingOverride, ProviderCatalog,
};
pub use error::{RegistryError, RegistryResult};
pub use refresh::spawn_refresher;
pub use registry::{
    CatalogSnapshot, ConfiguredProvider, ProviderEntry, Registry, RegistryHealth, RegistrySettings,
};
