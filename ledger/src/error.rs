//! # Error Taxonomy
//!
//! Every failure the ledger can report, in one enum. All variants are
//! synchronous and leave no partial effects: argument validation happens
//! before any state mutation, state-precondition failures are detected
//! before anything is written, and a failed custodian transfer unwinds
//! whatever the operation had tentatively committed. Nothing is retried
//! automatically; the caller decides whether to re-invoke.

use thiserror::Error;

use crate::custodian::TransferError;

/// Errors returned by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A caller-correctable argument problem: zero amount, zero duration,
    /// cliff longer than the duration, empty beneficiary, and the like.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the call.
        reason: String,
    },

    /// The beneficiary already has a lock. One lock per beneficiary,
    /// no top-ups, no merges.
    #[error("beneficiary {beneficiary} already has a lock")]
    DuplicateLock {
        /// The beneficiary that was targeted.
        beneficiary: String,
    },

    /// No lock exists for the beneficiary.
    #[error("no lock exists for beneficiary {beneficiary}")]
    NoLock {
        /// The beneficiary that was queried.
        beneficiary: String,
    },

    /// The lock has already been revoked; revoke is one-shot.
    #[error("lock for {beneficiary} has already been revoked")]
    AlreadyRevoked {
        /// The beneficiary whose lock was targeted.
        beneficiary: String,
    },

    /// The lock was created non-revocable.
    #[error("lock for {beneficiary} is not revocable")]
    NotRevocable {
        /// The beneficiary whose lock was targeted.
        beneficiary: String,
    },

    /// The lock is revoked and its residual claim has been fully paid
    /// out; nothing further will ever be releasable.
    #[error("lock for {beneficiary} is revoked and fully settled")]
    LockRevoked {
        /// The beneficiary whose lock was targeted.
        beneficiary: String,
    },

    /// The lock is live but nothing is claimable yet (cliff not passed,
    /// or everything vested so far has already been released).
    #[error("nothing to release for {beneficiary}")]
    NothingToRelease {
        /// The beneficiary whose lock was targeted.
        beneficiary: String,
    },

    /// The caller is not the ledger administrator.
    #[error("unauthorized: {caller} is not the ledger administrator")]
    Unauthorized {
        /// Who made the call.
        caller: String,
    },

    /// The custodian refused a transfer. The enclosing operation has been
    /// rolled back; no lock fields or counters were left adjusted.
    #[error("asset transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// A guarded operation was entered while an external transfer was
    /// still in flight.
    #[error("reentrant call rejected: a transfer is already in progress")]
    ReentrantCall,

    /// An amount computation would leave the u64 range.
    #[error("amount overflow: operation would exceed u64 range")]
    AmountOverflow,
}
