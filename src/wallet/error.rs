use uuid::Uuid;

use crate::core::{
    connection::ConnectionError, query::QueryError,
    response::SigningError, selection::InvalidSelectionError,
};

/// Mediation failure.
///
/// Only the precondition variants are returned to callers; everything that happens after a
/// selection is accepted is delivered to the relying party as an error response instead.
#[derive(Debug, thiserror::Error)]
pub enum MediationError {
    #[error("invalid selection: {0}")]
    InvalidSelection(#[from] InvalidSelectionError),

    /// The mediation was never started, or has already been answered.
    #[error("mediation {0} is not awaiting an answer")]
    NotInFlight(Uuid),

    #[error("mediation {0} is already being resolved")]
    AlreadyResolving(Uuid),

    #[error("user cancelled")]
    UserCancelled,

    /// Every handle was dropped before the mediation was resolved or cancelled.
    #[error("mediation abandoned")]
    Abandoned,

    #[error("credential query failed: {0}")]
    Query(#[from] QueryError),

    #[error("presentation signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("DID connection failed: {0}")]
    Connection(#[from] ConnectionError),
}
