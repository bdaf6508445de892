//! Error taxonomy for the CRDT surface and the manager that drives it.
//!
//! Each kind corresponds to a distinct failure mode; callers are expected
//! to match on `CrdtError` rather than inspect a message.

use thiserror::Error;

/// Errors surfaced by CRDT variants, the state-store contract, and the
/// manager.
#[derive(Debug, Error)]
pub enum CrdtError {
    /// An `apply_op`/`create_op` named an operation the variant doesn't know.
    #[error("unknown operation `{operation}` for crdt `{crdt_id}`")]
    UnknownOperation { crdt_id: String, operation: String },

    /// An operation's payload was missing a required field or had the wrong
    /// shape (e.g. a negative counter amount).
    #[error("invalid payload for operation `{operation}` on crdt `{crdt_id}`: {reason}")]
    InvalidPayload {
        crdt_id: String,
        operation: String,
        reason: String,
    },

    /// `merge` was called with a snapshot whose `type` or `id` didn't match.
    #[error(
        "state type mismatch merging into `{expected_id}` ({expected_type}): got `{actual_id}` ({actual_type})"
    )]
    StateTypeMismatch {
        expected_id: String,
        expected_type: String,
        actual_id: String,
        actual_type: String,
    },

    /// `validate()` found a broken invariant.
    #[error("invariant violated for crdt `{crdt_id}`: {reason}")]
    InvariantViolated { crdt_id: String, reason: String },

    /// `Manager::register` was called with an id already registered.
    #[error("crdt `{0}` is already registered")]
    DuplicateId(String),

    /// A lookup by crdt id found nothing.
    #[error("crdt `{0}` not found")]
    NotFound(String),

    /// A manager call was made before `Manager::start`.
    #[error("manager has not been initialised")]
    NotInitialised,

    /// A manager call was made after `Manager::close`.
    #[error("manager is already closed")]
    AlreadyClosed,

    /// OR-Map `add` with no crdt factory configured.
    #[error("no crdt factory configured for key `{0}`")]
    FactoryMissing(String),

    /// RGA index out of the visible range.
    #[error("index {index} out of range (visible length {len})")]
    OutOfRange { index: usize, len: usize },

    /// The state store failed.
    #[error("state store error: {0}")]
    StoreError(#[source] eyre::Report),

    /// Wraps any of the above when raised from `Manager::perform_operation`.
    #[error("operation failed: {0}")]
    OperationFailed(#[source] Box<CrdtError>),
}

impl CrdtError {
    /// Wrap `self` as the cause of an `OperationFailed`, preserving the
    /// original error for inspection by callers that need the root cause.
    pub fn into_operation_failed(self) -> CrdtError {
        CrdtError::OperationFailed(Box::new(self))
    }
}

pub type CrdtResult<T> = Result<T, CrdtError>;
