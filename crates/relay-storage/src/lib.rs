//! Relay Storage - persistence boundary for the gateway.
//!
//! The core never talks to a database directly; it speaks through five
//! narrow async traits:
//!
//! - [`ByokStore`] - keyed BYOK ciphertext table
//! - [`BalanceStore`] - one balance row per user
//! - [`UsageStore`] - append-only usage-event stream
//! - [`ReservationStore`] - reservation table with status transitions
//! - [`UserStore`] - user profiles and preferences
//!
//! Schemas, durability, and soft-delete policy are the adapter's concern.
//! [`MemoryStore`] implements all five for development and tests; the
//! [`StorageAdapter`] bundle is what the rest of the workspace holds.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use traits::{BalanceStore, ByokStore, ReservationStore, StorageAdapter, UsageStore, UserStore};
pub use types::{
    BalanceRow, ByokRecord, KdfParams, ReservationRow, ReservationStatus, UsageEvent, UsageKind,
};
