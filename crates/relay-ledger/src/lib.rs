//! Relay Ledger - token metering with pre-flight reservation and
//! post-flight reconciliation.
//!
//! The three-phase machine per request is **reserve → execute → settle**:
//!
//! - *Reserve* holds an upper-bound token estimate against the balance
//!   (or no-ops for BYOK traffic, which is logged but never charged).
//! - *Execute* is opaque to the ledger; it happens in a provider adapter.
//! - *Settle* converts the hold into a committed [`UsageEvent`] at actual
//!   token counts. Overage is deducted (a single call may finish slightly
//!   below zero; the next reservation sees the truth), shortfall is
//!   returned by construction - holds are never deducted up front, so
//!   releasing one restores availability exactly.
//!
//! Per-user operations serialize through a sharded lock map. Settlement is
//! idempotent on the reservation id; settling an expired reservation is
//! rejected, which is what makes the charge at-most-once.
//!
//! [`UsageEvent`]: relay_storage::UsageEvent

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod analytics;
pub mod error;
pub mod ledger;
pub mod sweeper;

pub use analytics::{ProviderUsage, UsageAnalytics};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{
    BalanceSummary, LedgerSettings, PlanOutcome, ReserveOutcome, SettleInput, Settlement,
    TokenLedger,
};
pub use sweeper::spawn_sweeper;
