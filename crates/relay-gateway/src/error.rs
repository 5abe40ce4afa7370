//! Error translation from component crates into the wire taxonomy.

use relay_core::{GatewayError, UpstreamErrorKind};
use relay_ledger::LedgerError;
use relay_llm::ProviderError;
use relay_policy::AdmissionError;
use relay_registry::RegistryError;
use relay_storage::StorageError;
use relay_vault::VaultError;
use relay_workspace::WorkspaceError;

/// Convert an admission denial into a `Forbidden`.
pub(crate) fn from_admission(err: AdmissionError) -> GatewayError {
    GatewayError::Forbidden {
        reason: err.to_string(),
    }
}

/// Convert a registry failure. Unknown providers on an admitted request
/// are a `Forbidden` (policy and registry disagree only when the operator
/// listed a provider the catalog cannot serve); the rest are internal.
pub(crate) fn from_registry(err: RegistryError) -> GatewayError {
    match err {
        RegistryError::UnknownProvider(provider) => GatewayError::Forbidden {
            reason: format!("provider not configured: {provider}"),
        },
        RegistryError::NoModel { provider } => {
            GatewayError::InvalidArgument(format!("no model resolvable for provider {provider}"))
        },
        RegistryError::Fetch(msg) | RegistryError::InvalidDocument(msg) => {
            GatewayError::Internal(msg)
        },
    }
}

pub(crate) fn from_vault(err: VaultError) -> GatewayError {
    match err {
        VaultError::DecryptFailed => GatewayError::DecryptAuthFailed,
        VaultError::Kdf(msg) => GatewayError::Internal(msg),
        VaultError::Encrypt => GatewayError::Internal("encryption failed".to_string()),
        VaultError::Storage(e) => from_storage(e),
    }
}

pub(crate) fn from_ledger(err: LedgerError) -> GatewayError {
    match err {
        LedgerError::InsufficientBalance {
            required,
            available,
        } => GatewayError::InsufficientBalance {
            required,
            available,
        },
        LedgerError::UnknownReservation(id) => {
            GatewayError::Internal(format!("unknown reservation {id}"))
        },
        LedgerError::ReservationExpired(id) => {
            GatewayError::Internal(format!("reservation {id} expired before settlement"))
        },
        LedgerError::ReservationNotHeld { id, status } => {
            GatewayError::Internal(format!("reservation {id} is {status:?}"))
        },
        LedgerError::Storage(e) => from_storage(e),
    }
}

pub(crate) fn from_workspace(err: WorkspaceError) -> GatewayError {
    match err {
        WorkspaceError::InvalidPath(msg) => GatewayError::InvalidPath(msg),
        WorkspaceError::UnknownWorkspace(id) => {
            GatewayError::InvalidArgument(format!("unknown workspace: {id}"))
        },
        WorkspaceError::ReadOnly(id) => GatewayError::Forbidden {
            reason: format!("workspace {id} is read-only"),
        },
        WorkspaceError::TooLarge { size, max } => {
            GatewayError::InvalidPath(format!("file too large: {size} > {max}"))
        },
        WorkspaceError::Conflict(msg) => GatewayError::Conflict(msg),
        WorkspaceError::Encoding(msg) => GatewayError::InvalidArgument(msg),
        WorkspaceError::Io(e) => GatewayError::Internal(e.to_string()),
    }
}

pub(crate) fn from_provider(err: ProviderError) -> GatewayError {
    GatewayError::Upstream {
        kind: err.kind,
        message: err.message,
    }
}

pub(crate) fn from_storage(err: StorageError) -> GatewayError {
    match err {
        StorageError::Conflict(msg) => GatewayError::Conflict(msg),
        other => GatewayError::Internal(other.to_string()),
    }
}

/// The cancellation terminal used by the pipeline.
pub(crate) fn cancelled() -> GatewayError {
    GatewayError::Upstream {
        kind: UpstreamErrorKind::Cancelled,
        message: "request cancelled".to_string(),
    }
}
