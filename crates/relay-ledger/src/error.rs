//! Ledger error types.

use relay_storage::ReservationStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reservation denied; the deficit travels with the error.
    #[error("insufficient balance: required {required} tokens, available {available}")]
    InsufficientBalance {
        /// Tokens the reservation needed.
        required: u64,
        /// Tokens actually available.
        available: u64,
    },

    /// No reservation with that id.
    #[error("unknown reservation: {0}")]
    UnknownReservation(Uuid),

    /// The sweeper reclaimed the reservation before settlement arrived.
    /// The spend happened; callers log a compensating `lost` event.
    #[error("reservation expired: {0}")]
    ReservationExpired(Uuid),

    /// The reservation is in a state that cannot settle (e.g. refunded).
    #[error("reservation {id} is {status:?}, not held")]
    ReservationNotHeld {
        /// The reservation.
        id: Uuid,
        /// Its current status.
        status: ReservationStatus,
    },

    /// Backing store failure.
    #[error(transparent)]
    Storage(#[from] relay_storage::StorageError),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
