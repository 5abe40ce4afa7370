//! Relay Core - Foundation types for the Relay AI request gateway.
//!
//! This crate provides:
//! - The user-visible error taxonomy shared by every wire protocol
//! - Caller identity and per-request context
//! - User, tier, and preference types
//! - [`SecretString`], a zeroize-on-drop wrapper for credential material

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod context;
pub mod error;
pub mod secret;
pub mod types;

pub use context::{Caller, RequestContext};
pub use error::{GatewayError, GatewayResult, UpstreamErrorKind};
pub use secret::SecretString;
pub use types::{BalancePool, SubscriptionTier, UserId, UserPreferences, UserProfile};
