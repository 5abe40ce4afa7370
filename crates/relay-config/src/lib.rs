//! Relay Config - gateway configuration schema, loader, and validation.
//!
//! All types are self-contained; domain crates convert at the boundary.
//! Every section implements [`Default`] with production-ready values so a
//! bare `[section]` header in TOML produces a working configuration.
//!
//! Provider entries accept both shorthand and full forms and are normalized
//! at load time into one tagged record (see [`normalize`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod loader;
pub mod normalize;
pub mod types;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{from_str, load};
pub use normalize::{KeySource, ModelRestrictions, ProviderEntry, ProviderSelection};
pub use types::{
    AuthSection, GatewayConfig, LedgerSection, LimitsSection, RateLimitsSection, RawProviderEntry,
    RegistrySection, ServerSection, WorkspaceSection,
};
