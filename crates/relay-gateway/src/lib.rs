//! Relay Gateway - the daemon tying the components into one procedure
//! surface.
//!
//! The gateway owns:
//!
//! - assembly of the component stack from configuration ([`state`])
//! - the credential resolver (inline → BYOK → server → reject)
//! - the `generateText` pipeline state machine ([`pipeline`])
//! - the abstract procedure registry ([`procedures`]) and the three wire
//!   shells generated from it ([`wire`]): JSON-RPC at `/rpc`, typed-RPC at
//!   `/trpc/{proc}`, MCP at `/mcp`
//! - bearer-token authentication, token-bucket rate limiting, and the
//!   error translation shared by every wire
//! - the background sweeper and catalog refresher, with explicit shutdown

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod auth;
pub mod error;
pub mod pipeline;
pub mod procedures;
pub mod ratelimit;
pub mod resolver;
pub mod server;
pub mod state;
pub mod wire;

pub use auth::Authenticator;
pub use procedures::ProcedureRegistry;
pub use ratelimit::{RateClass, RateLimiter};
pub use state::Gateway;
