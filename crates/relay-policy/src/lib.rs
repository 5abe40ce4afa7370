//! Relay Policy - admission control for `(provider, model, caller)`.
//!
//! A pure function of configuration: no storage, no network, no clock.
//! Policy answers "may the caller even ask for this?"; whether a usable
//! credential exists is the resolver's question, asked strictly afterwards.
//! A request rejected here is never unlocked, reserved, or executed.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod admission;

pub use admission::{
    AdmissionError, AdmissionRequest, CallerKind, CompiledRestrictions, PolicyConfig,
};
