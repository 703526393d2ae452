//! # Lock Store
//!
//! Keyed storage for [`Lock`] records: exactly one per beneficiary,
//! inserted once, never deleted. The store owns the existence and
//! uniqueness rules; schedule arithmetic lives in [`crate::lock`] and
//! orchestration in [`crate::ledger`].
//!
//! All mutation goes through `&mut self`, so a store update and the
//! ledger-wide counter update that belongs to the same operation cannot
//! interleave with anything else.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::LedgerError;
use crate::lock::Lock;

/// One lock record per beneficiary key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockStore {
    locks: HashMap<String, Lock>,
}

impl LockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `beneficiary`, if one exists.
    pub fn get(&self, beneficiary: &str) -> Option<&Lock> {
        self.locks.get(beneficiary)
    }

    /// Mutable access for the ledger's release/revoke transitions.
    pub(crate) fn get_mut(&mut self, beneficiary: &str) -> Option<&mut Lock> {
        self.locks.get_mut(beneficiary)
    }

    /// Whether a lock exists for `beneficiary`.
    pub fn contains(&self, beneficiary: &str) -> bool {
        self.locks.contains_key(beneficiary)
    }

    /// Inserts a new lock, enforcing the creation rules.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidArgument`] if the beneficiary is
    /// empty, the amount is zero, the duration is zero, or the cliff
    /// exceeds the duration. Returns [`LedgerError::DuplicateLock`] if
    /// the beneficiary already has a lock; the existing record is left
    /// untouched.
    pub fn insert(&mut self, lock: Lock) -> Result<(), LedgerError> {
        if lock.beneficiary.trim().is_empty() {
            return Err(LedgerError::InvalidArgument {
                reason: "beneficiary must not be empty".to_string(),
            });
        }
        if lock.total_amount == 0 {
            return Err(LedgerError::InvalidArgument {
                reason: "lock amount must be positive".to_string(),
            });
        }
        if lock.duration_secs == 0 {
            return Err(LedgerError::InvalidArgument {
                reason: "vesting duration must be positive".to_string(),
            });
        }
        if lock.cliff_secs > lock.duration_secs {
            return Err(LedgerError::InvalidArgument {
                reason: "cliff cannot exceed the vesting duration".to_string(),
            });
        }
        if self.locks.contains_key(&lock.beneficiary) {
            return Err(LedgerError::DuplicateLock {
                beneficiary: lock.beneficiary,
            });
        }

        self.locks.insert(lock.beneficiary.clone(), lock);
        Ok(())
    }

    /// Iterates over all lock records, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Lock> {
        self.locks.values()
    }

    /// Number of locks ever created in this store.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the store holds no locks.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Audit helper: the sum of `total_amount - released_amount` over all
    /// locks. The ledger's running `total_locked` counter must equal this
    /// after every operation.
    pub fn outstanding_total(&self) -> u64 {
        self.locks
            .values()
            .map(|lock| lock.total_amount - lock.released_amount)
            .sum()
    }
}
